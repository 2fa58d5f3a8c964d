// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Provider-agnostic report content.
//!
//! [`ReportModel`] is the only input of the publisher. It holds plain rows
//! and numbers and keeps no reference to collected issues.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{MetricKind, Status};

/// Fully computed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportModel {
    /// Page title.
    pub title:         String,
    /// Sprint facts.
    pub sprint:        SprintInfo,
    /// Headline numbers.
    pub overview:      Overview,
    /// Completed SP per person, bots excluded.
    pub per_person:    Vec<PersonAverage>,
    /// Distinct non-bot assignees sorted by name.
    pub team_members:  Vec<String>,
    /// Largest completed issues.
    pub top_completed: Vec<IssueRow>,
    /// Completed issues under the tech-debt epic.
    pub tech_debt:     Vec<IssueRow>,
    /// Hygiene lists.
    pub quality:       QualityChecks,
    /// Previous retro action items.
    pub action_items:  ActionItems,
    /// Chart series.
    pub charts:        Vec<ChartDataset>,
    /// Navigation targets.
    pub links:         Links
}

/// Identity and calendar of the sprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintInfo {
    /// Tracker identifier.
    pub id:                   u64,
    /// Display name.
    pub name:                 String,
    /// Board name.
    pub board:                String,
    /// Planned first day.
    pub planned_start:        Option<NaiveDate>,
    /// Planned last day.
    pub planned_end:          Option<NaiveDate>,
    /// Actual first day.
    pub actual_start:         Option<NaiveDate>,
    /// Actual last day.
    pub actual_end:           Option<NaiveDate>,
    /// Weekdays in the planned window.
    pub planned_working_days: u32,
    /// Weekdays in the actual window.
    pub actual_working_days:  u32
}

/// Headline numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    /// SP on issues present at sprint start.
    pub committed:            f64,
    /// SP on done issues.
    pub completed:            f64,
    /// `completed / committed * 100`, zero when nothing was committed.
    pub percent_complete:     f64,
    /// Weekdays between start and end inclusive.
    pub working_days:         u32,
    /// Issues added after the sprint started.
    pub scope_change:         usize,
    /// Issues that did not reach done (Not Needed excluded).
    pub not_completed:        usize,
    /// Issues carried over from earlier sprints.
    pub carry_over:           usize,
    /// Committed SP per team member.
    pub committed_per_member: f64,
    /// Completed SP per team member.
    pub completed_per_member: f64
}

/// Average completed SP of one person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonAverage {
    /// Display name.
    pub name:             String,
    /// Completed issues.
    pub completed_issues: usize,
    /// Completed SP.
    pub completed_points: f64,
    /// SP per completed issue.
    pub average:          f64
}

/// One issue line of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRow {
    /// Issue key.
    pub key:         String,
    /// Full summary.
    pub summary:     String,
    /// Status.
    pub status:      Status,
    /// Provider status name.
    pub status_name: String,
    /// Assignee name.
    pub assignee:    Option<String>,
    /// Estimate.
    pub points:      Option<f64>
}

/// Independent hygiene lists; each may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityChecks {
    /// Issues that were in an earlier sprint.
    pub carry_over:     Vec<IssueRow>,
    /// Issues without an epic.
    pub without_epic:   Vec<IssueRow>,
    /// Issues without an estimate.
    pub without_points: Vec<IssueRow>
}

/// Retro action item with its age.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    /// Issue key.
    pub key:         String,
    /// Summary.
    pub summary:     String,
    /// Assignee name.
    pub assignee:    Option<String>,
    /// Status.
    pub status:      Status,
    /// Provider status name.
    pub status_name: String,
    /// Whole days since creation.
    pub age_days:    i64
}

/// Action items split by completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionItems {
    /// Not done, oldest first.
    pub open: Vec<ActionRow>,
    /// Done, by status, assignee and key.
    pub done: Vec<ActionRow>
}

/// Addresses used for links in the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Links {
    /// Tracker base address.
    pub tracker_base:   String,
    /// Board identifier.
    pub board_id:       u64,
    /// Tech-debt epic key.
    pub tech_debt_epic: String,
    /// Retro epic key.
    pub retro_epic:     String
}

/// What a chart shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "chart", content = "metric")]
pub enum ChartKind {
    /// Remaining SP per working day.
    Burndown,
    /// Completed SP per sprint.
    Velocity,
    /// Daily engineering metric.
    Metric(MetricKind)
}

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStyle {
    /// Solid line.
    Line,
    /// Dashed reference line.
    Dashed,
    /// Bars.
    Bar
}

/// One named series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Legend label.
    pub name:   String,
    /// Drawing style.
    pub style:  SeriesStyle,
    /// Colour as `#rrggbb`.
    pub color:  String,
    /// One value per x label.
    pub values: Vec<f64>
}

/// Data behind one chart image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDataset {
    /// What the chart shows.
    pub kind:     ChartKind,
    /// Chart title.
    pub title:    String,
    /// Y axis label.
    pub y_label:  String,
    /// X axis labels.
    pub x_labels: Vec<String>,
    /// Series sharing the x axis.
    pub series:   Vec<Series>
}

impl ChartDataset {
    /// Attachment name stem.
    pub fn file_stem(&self) -> &'static str {
        match self.kind {
            ChartKind::Burndown => "burndown",
            ChartKind::Velocity => "velocity",
            ChartKind::Metric(kind) => kind.file_stem()
        }
    }

    /// Attachment name for an image with `extension`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.file_stem())
    }

    /// Largest value across all series, zero when empty.
    pub fn max_value(&self) -> f64 {
        self.series
            .iter()
            .flat_map(|series| series.values.iter().copied())
            .filter(|value| value.is_finite())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(kind: ChartKind, values: Vec<f64>) -> ChartDataset {
        ChartDataset {
            kind,
            title: "t".to_owned(),
            y_label: "y".to_owned(),
            x_labels: vec!["a".to_owned(); values.len()],
            series: vec![Series {
                name: "s".to_owned(),
                style: SeriesStyle::Line,
                color: "#000000".to_owned(),
                values
            }]
        }
    }

    #[test]
    fn file_names_follow_chart_kind() {
        assert_eq!(dataset(ChartKind::Burndown, vec![]).file_name("svg"), "burndown.svg");
        assert_eq!(dataset(ChartKind::Velocity, vec![]).file_name("svg"), "velocity.svg");
        assert_eq!(
            dataset(ChartKind::Metric(MetricKind::PickupTime), vec![]).file_name("svg"),
            "pickup_p50.svg"
        );
    }

    #[test]
    fn max_value_ignores_non_finite_and_defaults_to_zero() {
        assert_eq!(dataset(ChartKind::Burndown, vec![]).max_value(), 0.0);
        assert_eq!(dataset(ChartKind::Burndown, vec![3.0, f64::NAN, 7.5]).max_value(), 7.5);
    }

    #[test]
    fn chart_kind_serializes_with_metric_content() {
        let json = serde_json::to_string(&ChartKind::Metric(MetricKind::CycleTime)).expect("serializes");
        assert_eq!(json, r#"{"chart":"metric","metric":"cycle_time"}"#);
    }
}
