// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Metrics engine.
//!
//! [`compute`] turns a [`Collection`] into a [`ReportModel`]. It performs no
//! I/O and reads no clock: the ageing reference `now` is an argument, so equal
//! inputs always produce equal reports.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::{
    collector::Collection,
    config::{self, ReportConfig},
    error::Error,
    model::{ActionItem, Assignee, Issue, MetricKind, MetricSample, Sprint, Status},
    report::{
        ActionItems, ActionRow, ChartDataset, ChartKind, IssueRow, Links, Overview, PersonAverage,
        QualityChecks, ReportModel, Series, SeriesStyle, SprintInfo
    }
};

const IDEAL_COLOR: &str = "#7A869A";
const ACTUAL_COLOR: &str = "#0052CC";
const COMMITTED_COLOR: &str = "#C1C7D0";
const COMPLETED_COLOR: &str = "#14892C";
const METRIC_COLOR: &str = "#6554C0";

/// Knobs of the computation, taken from the configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Title prefix of the page.
    pub title_prefix:   String,
    /// Tracker base address for links.
    pub tracker_base:   String,
    /// Tech-debt epic key.
    pub tech_debt_epic: String,
    /// Retro epic key.
    pub retro_epic:     String,
    /// Service-account denylist.
    pub bots:           Regex,
    /// Length of the top completed table.
    pub top_limit:      usize,
    /// Zone in which calendar days are counted.
    pub zone:           Tz
}

impl EngineSettings {
    /// Extracts the engine settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid bot pattern or zone.
    pub fn from_config(config: &ReportConfig) -> Result<Self, Error> {
        Ok(Self {
            title_prefix:   config.documents.title_prefix.clone(),
            tracker_base:   config.tracker.base_url.trim_end_matches('/').to_owned(),
            tech_debt_epic: config.tech_debt_epic.clone(),
            retro_epic:     config.retro_epic.clone(),
            bots:           config.bot_regex()?,
            top_limit:      config.top_completed_limit,
            zone:           config.zone()?
        })
    }

    fn is_bot(&self, person: &Assignee) -> bool {
        self.bots.is_match(&person.display_name)
            || self.bots.is_match(&person.account_id)
            || person.email.as_deref().is_some_and(|email| self.bots.is_match(email))
    }

    fn day(&self, timestamp: Option<DateTime<Utc>>) -> Option<NaiveDate> {
        timestamp.map(|value| value.with_timezone(&self.zone).date_naive())
    }
}

/// Counts Monday-to-Friday days in `start..=end`; zero when inverted.
pub fn working_days(start: NaiveDate, end: NaiveDate) -> u32 {
    working_day_list(start, end).len() as u32
}

fn working_day_list(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// `completed / committed` as a percentage, zero when nothing was committed.
pub fn percent_complete(committed: f64, completed: f64) -> f64 {
    if committed > 0.0 {
        (completed / committed * 100.0).max(0.0)
    } else {
        0.0
    }
}

/// Done stories and tasks by SP descending, keys ascending on ties, at most
/// `limit`.
pub fn top_completed(issues: &[Issue], limit: usize) -> Vec<&Issue> {
    let mut done: Vec<&Issue> = issues
        .iter()
        .filter(|issue| issue.is_done() && issue.issue_type.is_ranked())
        .collect();
    done.sort_by(|left, right| {
        right
            .points()
            .total_cmp(&left.points())
            .then_with(|| left.key.cmp(&right.key))
    });
    done.truncate(limit);
    done
}

/// Whole days from `created` to `now`, never negative.
pub fn age_in_days(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    created.map_or(0, |created| (now - created).num_days().max(0))
}

fn row(issue: &Issue) -> IssueRow {
    IssueRow {
        key:         issue.key.to_string(),
        summary:     issue.summary.clone(),
        status:      issue.status,
        status_name: issue.status_name.clone(),
        assignee:    issue.assignee.as_ref().map(|person| person.display_name.clone()),
        points:      issue.story_points
    }
}

fn action_row(item: &ActionItem, now: DateTime<Utc>) -> ActionRow {
    ActionRow {
        key:         item.key.to_string(),
        summary:     item.summary.clone(),
        assignee:    item.assignee.clone(),
        status:      item.status,
        status_name: item.status_name.clone(),
        age_days:    age_in_days(item.created, now)
    }
}

fn team_members<'a>(issues: &'a [Issue], settings: &EngineSettings) -> Vec<&'a Assignee> {
    let mut seen = BTreeSet::new();
    let mut members: Vec<&Assignee> = issues
        .iter()
        .filter_map(|issue| issue.assignee.as_ref())
        .filter(|person| !settings.is_bot(person))
        .filter(|person| seen.insert(person.account_id.as_str()))
        .collect();
    members.sort_by(|left, right| {
        left.display_name
            .cmp(&right.display_name)
            .then_with(|| left.account_id.cmp(&right.account_id))
    });
    members
}

fn per_person(issues: &[Issue], settings: &EngineSettings) -> Vec<PersonAverage> {
    let mut totals: BTreeMap<&str, (&str, usize, f64)> = BTreeMap::new();
    for issue in issues.iter().filter(|issue| issue.is_done()) {
        let Some(person) = issue.assignee.as_ref().filter(|person| !settings.is_bot(person)) else {
            continue;
        };
        let entry = totals
            .entry(person.account_id.as_str())
            .or_insert((person.display_name.as_str(), 0, 0.0));
        entry.1 += 1;
        entry.2 += issue.points();
    }
    let mut rows: Vec<PersonAverage> = totals
        .into_values()
        .map(|(name, count, points)| PersonAverage {
            name:             name.to_owned(),
            completed_issues: count,
            completed_points: points,
            average:          points / count as f64
        })
        .collect();
    rows.sort_by(|left, right| left.name.cmp(&right.name));
    rows
}

fn quality_checks(issues: &[Issue], sprint: &Sprint) -> QualityChecks {
    let checked: Vec<&Issue> = issues
        .iter()
        .filter(|issue| issue.issue_type.is_plannable() && issue.status != Status::NotNeeded)
        .collect();
    QualityChecks {
        carry_over:     checked
            .iter()
            .filter(|issue| issue.is_carry_over(sprint))
            .map(|issue| row(issue))
            .collect(),
        without_epic:   checked
            .iter()
            .filter(|issue| issue.epic.is_none())
            .map(|issue| row(issue))
            .collect(),
        without_points: checked
            .iter()
            .filter(|issue| issue.story_points.is_none_or(|points| points == 0.0))
            .map(|issue| row(issue))
            .collect()
    }
}

fn action_items(items: &[ActionItem], now: DateTime<Utc>) -> ActionItems {
    let (done, open): (Vec<&ActionItem>, Vec<&ActionItem>) = items
        .iter()
        .partition(|item| matches!(item.status, Status::Done | Status::NotNeeded));
    let mut open: Vec<ActionRow> = open.into_iter().map(|item| action_row(item, now)).collect();
    open.sort_by(|left, right| {
        right
            .age_days
            .cmp(&left.age_days)
            .then_with(|| left.key.cmp(&right.key))
    });
    let mut done: Vec<ActionRow> = done.into_iter().map(|item| action_row(item, now)).collect();
    done.sort_by(|left, right| {
        (&left.status_name, &left.assignee, &left.key).cmp(&(&right.status_name, &right.assignee, &right.key))
    });
    ActionItems {
        open,
        done
    }
}

fn day_label(day: NaiveDate) -> String {
    day.format("%b %d").to_string()
}

fn burndown(collection: &Collection, committed: f64, settings: &EngineSettings) -> Option<ChartDataset> {
    let start = settings.day(collection.sprint.actual_start())?;
    let end = settings.day(collection.sprint.actual_end())?;
    let days = working_day_list(start, end);
    if days.is_empty() {
        return None;
    }
    let span = (days.len() - 1).max(1) as f64;
    let ideal = (0..days.len())
        .map(|index| committed * (1.0 - index as f64 / span))
        .map(|value| value.max(0.0))
        .collect();
    let resolved: Vec<(NaiveDate, f64)> = collection
        .issues
        .iter()
        .filter(|issue| issue.is_done() && issue.issue_type.is_plannable())
        .filter_map(|issue| settings.day(issue.resolved).map(|day| (day, issue.points())))
        .collect();
    let actual = days
        .iter()
        .map(|day| {
            let burned: f64 = resolved
                .iter()
                .filter(|(resolved_on, _)| resolved_on <= day)
                .map(|(_, points)| points)
                .sum();
            (committed - burned).max(0.0)
        })
        .collect();
    Some(ChartDataset {
        kind:     ChartKind::Burndown,
        title:    "Sprint Burndown".to_owned(),
        y_label:  "Remaining SP".to_owned(),
        x_labels: days.into_iter().map(day_label).collect(),
        series:   vec![
            Series {
                name:   "Ideal".to_owned(),
                style:  SeriesStyle::Dashed,
                color:  IDEAL_COLOR.to_owned(),
                values: ideal
            },
            Series {
                name:   "Actual".to_owned(),
                style:  SeriesStyle::Line,
                color:  ACTUAL_COLOR.to_owned(),
                values: actual
            },
        ]
    })
}

fn velocity(collection: &Collection, committed: f64, completed: f64) -> ChartDataset {
    let (labels, committed_values, completed_values) = if collection.velocity_history.is_empty() {
        (vec![collection.sprint.name.clone()], vec![committed], vec![completed])
    } else {
        let history = &collection.velocity_history;
        (
            history.iter().map(|summary| summary.name.clone()).collect(),
            history.iter().map(|summary| summary.committed).collect(),
            history.iter().map(|summary| summary.completed).collect()
        )
    };
    ChartDataset {
        kind:     ChartKind::Velocity,
        title:    "Velocity".to_owned(),
        y_label:  "Story Points".to_owned(),
        x_labels: labels,
        series:   vec![
            Series {
                name:   "Committed".to_owned(),
                style:  SeriesStyle::Bar,
                color:  COMMITTED_COLOR.to_owned(),
                values: committed_values
            },
            Series {
                name:   "Completed".to_owned(),
                style:  SeriesStyle::Bar,
                color:  COMPLETED_COLOR.to_owned(),
                values: completed_values
            },
        ]
    }
}

fn metric_chart(sample: &MetricSample) -> ChartDataset {
    ChartDataset {
        kind:     ChartKind::Metric(sample.kind),
        title:    sample.kind.title().to_owned(),
        y_label:  "Hours".to_owned(),
        x_labels: sample.daily.iter().map(|value| day_label(value.date)).collect(),
        series:   vec![Series {
            name:   format!("P50 (median {:.1} h)", sample.value),
            style:  SeriesStyle::Line,
            color:  METRIC_COLOR.to_owned(),
            values: sample.daily.iter().map(|value| value.hours).collect()
        }]
    }
}

fn per_member(total: f64, members: usize) -> f64 {
    if members == 0 { 0.0 } else { total / members as f64 }
}

/// Computes the report for one collected sprint.
pub fn compute(collection: &Collection, settings: &EngineSettings, now: DateTime<Utc>) -> ReportModel {
    let sprint = &collection.sprint;
    let issues = collection.issues.as_slice();

    let committed = collection.committed_override.unwrap_or_else(|| {
        issues
            .iter()
            .filter(|issue| !issue.added_during_sprint && issue.issue_type.is_plannable())
            .map(Issue::points)
            .sum()
    });
    // Epics and sub-tasks would count their children's points twice.
    let completed: f64 = issues
        .iter()
        .filter(|issue| issue.is_done() && issue.issue_type.is_plannable())
        .map(Issue::points)
        .sum();

    let planned = (settings.day(sprint.start), settings.day(sprint.end));
    let actual = (settings.day(sprint.actual_start()), settings.day(sprint.actual_end()));
    let span_days = |window: (Option<NaiveDate>, Option<NaiveDate>)| match window {
        (Some(start), Some(end)) => working_days(start, end),
        _ => 0
    };

    let members = team_members(issues, settings);
    let quality = quality_checks(issues, sprint);

    let overview = Overview {
        committed,
        completed,
        percent_complete: percent_complete(committed, completed),
        working_days: span_days(planned),
        scope_change: issues.iter().filter(|issue| issue.added_during_sprint).count(),
        not_completed: issues
            .iter()
            .filter(|issue| !issue.is_done() && issue.status != Status::NotNeeded)
            .count(),
        carry_over: quality.carry_over.len(),
        committed_per_member: per_member(committed, members.len()),
        completed_per_member: per_member(completed, members.len())
    };

    let mut tech_debt: Vec<IssueRow> = issues
        .iter()
        .filter(|issue| issue.is_done() && issue.epic.as_deref() == Some(settings.tech_debt_epic.as_str()))
        .map(row)
        .collect();
    tech_debt.sort_by(|left, right| left.key.cmp(&right.key));

    let mut charts: Vec<ChartDataset> = burndown(collection, committed, settings).into_iter().collect();
    charts.push(velocity(collection, committed, completed));
    charts.extend(
        MetricKind::ALL
            .iter()
            .filter_map(|kind| collection.metrics.get(kind))
            .map(metric_chart)
    );

    ReportModel {
        title: config::page_title(&settings.title_prefix, &sprint.name),
        sprint: SprintInfo {
            id:                   sprint.id,
            name:                 sprint.name.clone(),
            board:                collection.board.name.clone(),
            planned_start:        planned.0,
            planned_end:          planned.1,
            actual_start:         actual.0,
            actual_end:           actual.1,
            planned_working_days: span_days(planned),
            actual_working_days:  span_days(actual)
        },
        overview,
        per_person: per_person(issues, settings),
        team_members: members.iter().map(|person| person.display_name.clone()).collect(),
        top_completed: top_completed(issues, settings.top_limit).into_iter().map(row).collect(),
        tech_debt,
        quality,
        action_items: action_items(&collection.action_items, now),
        charts,
        links: Links {
            tracker_base:   settings.tracker_base.clone(),
            board_id:       collection.board.id,
            tech_debt_epic: settings.tech_debt_epic.clone(),
            retro_epic:     settings.retro_epic.clone()
        }
    }
}
