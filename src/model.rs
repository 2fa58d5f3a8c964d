// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Provider-independent sprint entities.
//!
//! Raw tracker and metrics payloads are parsed into these types at the
//! collection boundary; nothing downstream looks at provider JSON.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle state of a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    /// Currently running.
    Active,
    /// Finished.
    Closed,
    /// Planned.
    Future
}

/// A time-boxed iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sprint {
    /// Tracker identifier.
    pub id:        u64,
    /// Display name.
    pub name:      String,
    /// Lifecycle state.
    pub state:     SprintState,
    /// Planned start.
    pub start:     Option<DateTime<Utc>>,
    /// Planned end.
    pub end:       Option<DateTime<Utc>>,
    /// Actual completion.
    pub completed: Option<DateTime<Utc>>,
    /// Actual activation, when it differs from the planned start.
    pub activated: Option<DateTime<Utc>>
}

impl Sprint {
    /// Checks that a completion date does not precede the start date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the dates are inverted.
    pub fn validate(&self) -> Result<(), Error> {
        if let (Some(start), Some(completed)) = (self.start, self.completed) {
            if completed < start {
                return Err(Error::validation(format!(
                    "sprint '{}' completes ({completed}) before it starts ({start})",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Actual start: activation date when known, planned start otherwise.
    pub fn actual_start(&self) -> Option<DateTime<Utc>> {
        self.activated.or(self.start)
    }

    /// Actual end: completion date when known, planned end otherwise.
    pub fn actual_end(&self) -> Option<DateTime<Utc>> {
        self.completed.or(self.end)
    }

    /// Timestamp used to order closed sprints, newest first.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.completed.or(self.end)
    }

    /// Reference to this sprint as it appears in issue histories.
    pub fn to_ref(&self) -> SprintRef {
        SprintRef {
            id:    self.id,
            name:  self.name.clone(),
            start: self.start
        }
    }
}

/// Entry of an issue's sprint history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SprintRef {
    /// Tracker identifier.
    pub id:    u64,
    /// Display name.
    pub name:  String,
    /// Planned start, when the provider reports it.
    pub start: Option<DateTime<Utc>>
}

impl SprintRef {
    /// Chronological precedence. Start dates decide when both are known;
    /// identifiers, which the tracker assigns in creation order, otherwise.
    pub fn is_before(&self, other: &SprintRef) -> bool {
        match (self.start, other.start) {
            (Some(mine), Some(theirs)) if mine != theirs => mine < theirs,
            _ => self.id < other.id
        }
    }
}

/// Issue identifier such as `GV-2398`, ordered naturally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    /// Wraps a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, Option<u64>) {
        match self.0.rsplit_once('-') {
            Some((project, number)) => (project, number.parse().ok()),
            None => (self.0.as_str(), None)
        }
    }
}

impl Ord for IssueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left_project, left_number) = self.split();
        let (right_project, right_number) = other.split();
        left_project
            .cmp(right_project)
            .then_with(|| left_number.cmp(&right_number))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for IssueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issue type reduced to the kinds the report distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// User story and its site-specific variants.
    Story,
    /// Task.
    Task,
    /// Bug.
    Bug,
    /// Sub-task.
    SubTask,
    /// Epic.
    Epic,
    /// Anything else, keeping the provider name.
    Other(String)
}

impl IssueType {
    /// Maps a provider type name.
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "story" | "user story" | "technical story" | "enabler story" | "spike" => Self::Story,
            "task" => Self::Task,
            "bug" | "defect" => Self::Bug,
            "sub-task" | "subtask" | "sub task" => Self::SubTask,
            "epic" => Self::Epic,
            _ => Self::Other(name.trim().to_owned())
        }
    }

    /// Whether the type is expected to carry an epic link and an estimate.
    pub fn is_plannable(&self) -> bool {
        !matches!(self, Self::SubTask | Self::Epic)
    }

    /// Whether the type competes in the top completed table.
    pub fn is_ranked(&self) -> bool {
        matches!(self, Self::Story | Self::Task)
    }
}

/// Fixed status taxonomy of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Finished work.
    Done,
    /// Work under way.
    InProgress,
    /// Not started.
    ToDo,
    /// Awaiting or under review.
    Reviewing,
    /// Dropped without being done.
    NotNeeded
}

impl Status {
    /// Maps a provider status name and status-category key.
    ///
    /// Name-based rules for review and cancellation win over the category,
    /// because trackers file both under broader categories.
    pub fn classify(name: &str, category: Option<&str>) -> Self {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "not needed" | "cancelled" | "canceled" | "won't do" | "wont do" | "rejected" => {
                return Self::NotNeeded;
            }
            "in review" | "review" | "reviewing" | "code review" | "in qa" => {
                return Self::Reviewing;
            }
            _ => {}
        }
        match category.map(str::to_lowercase).as_deref() {
            Some("done") => Self::Done,
            Some("indeterminate") => Self::InProgress,
            Some("new") => Self::ToDo,
            _ => match normalized.as_str() {
                "done" | "closed" | "resolved" => Self::Done,
                "to do" | "todo" | "open" | "backlog" | "selected for development" => Self::ToDo,
                _ => Self::InProgress
            }
        }
    }

    /// Canonical label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::InProgress => "In Progress",
            Self::ToDo => "To Do",
            Self::Reviewing => "Reviewing",
            Self::NotNeeded => "Not Needed"
        }
    }
}

/// Person an issue is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Assignee {
    /// Stable account identifier.
    pub account_id:   String,
    /// Name shown in the report.
    pub display_name: String,
    /// Email, when the tracker exposes it.
    pub email:        Option<String>
}

/// Issue as seen by the metrics engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// Identifier.
    pub key:                 IssueKey,
    /// One-line summary.
    pub summary:             String,
    /// Reduced type.
    pub issue_type:          IssueType,
    /// Reduced status.
    pub status:              Status,
    /// Provider status name, for display.
    pub status_name:         String,
    /// Assignee, if any.
    pub assignee:            Option<Assignee>,
    /// Non-negative estimate, if any.
    pub story_points:        Option<f64>,
    /// Key of the owning epic, if any.
    pub epic:                Option<String>,
    /// Sprints the issue passed through, oldest first.
    pub sprint_history:      Vec<SprintRef>,
    /// Creation timestamp.
    pub created:             Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub resolved:            Option<DateTime<Utc>>,
    /// Whether the issue joined the sprint after it started.
    pub added_during_sprint: bool
}

impl Issue {
    /// Completed in the sprint.
    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }

    /// Estimate, zero when absent.
    pub fn points(&self) -> f64 {
        self.story_points.unwrap_or(0.0)
    }

    /// True when the history holds a sprint other than `sprint` that started
    /// before it.
    pub fn is_carry_over(&self, sprint: &Sprint) -> bool {
        let current = sprint.to_ref();
        self.sprint_history
            .iter()
            .any(|entry| entry.id != current.id && entry.is_before(&current))
    }
}

/// Validates a raw estimate: negative or non-finite values are rejected.
pub fn checked_story_points(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Engineering metric kinds reported by the metrics provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// First commit to pull request opened.
    CodingTime,
    /// Pull request opened to first review.
    PickupTime,
    /// First review to merge.
    ReviewTime,
    /// First commit to release.
    CycleTime
}

impl MetricKind {
    /// Every kind, in report order.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::CodingTime,
        MetricKind::PickupTime,
        MetricKind::ReviewTime,
        MetricKind::CycleTime
    ];

    /// Chart title.
    pub fn title(self) -> &'static str {
        match self {
            Self::CodingTime => "Coding Time (P50)",
            Self::PickupTime => "Pickup Time (P50)",
            Self::ReviewTime => "Review Time (P50)",
            Self::CycleTime => "Cycle Time (P50)"
        }
    }

    /// Stem used for attachment names.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::CodingTime => "coding_p50",
            Self::PickupTime => "pickup_p50",
            Self::ReviewTime => "review_p50",
            Self::CycleTime => "cycle_p50"
        }
    }
}

/// Value of one metric on one day, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyValue {
    /// Calendar day.
    pub date:  NaiveDate,
    /// Hours; zero when the provider had no data.
    pub hours: f64
}

/// Team-level aggregate for one metric over the sprint window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    /// Metric kind.
    pub kind:  MetricKind,
    /// Median of the days that had data, in hours.
    pub value: f64,
    /// Zero-filled daily series covering the window.
    pub daily: Vec<DailyValue>
}

/// Committed and completed totals of one sprint, for velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintSummary {
    /// Tracker identifier.
    pub sprint_id: u64,
    /// Display name.
    pub name:      String,
    /// Committed SP at sprint start.
    pub committed: f64,
    /// Completed SP.
    pub completed: f64
}

/// Previous retrospective action item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionItem {
    /// Identifier.
    pub key:         IssueKey,
    /// Summary.
    pub summary:     String,
    /// Assignee display name.
    pub assignee:    Option<String>,
    /// Reduced status.
    pub status:      Status,
    /// Provider status name.
    pub status_name: String,
    /// Creation timestamp.
    pub created:     Option<DateTime<Utc>>
}
