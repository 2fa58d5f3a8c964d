// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Sprint data collection.
//!
//! Selects one closed sprint, fetches its issues with resolved custom fields
//! and gathers the optional enrichments (velocity, engineering metrics, retro
//! action items). Enrichment failures are recorded as [`SoftFailure`]s.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt
};

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::{
    config::ReportConfig,
    engineering::{MetricsClient, samples_from},
    error::{Error, SoftFailure},
    fields::FieldResolver,
    http::Transport,
    model::{ActionItem, Issue, IssueType, MetricKind, MetricSample, Sprint, SprintSummary},
    tracker::{Board, IssueFieldIds, TrackerClient, VelocityEntry}
};

/// Which closed sprint to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SprintSelector {
    /// Most recently closed sprint.
    #[default]
    Latest,
    /// 1-based position among closed sprints, newest first.
    Ordinal(usize),
    /// Tracker identifier.
    Id(u64)
}

impl fmt::Display for SprintSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("#1"),
            Self::Ordinal(index) => write!(f, "#{index}"),
            Self::Id(id) => write!(f, "id {id}")
        }
    }
}

/// Everything the metrics engine needs for one run.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Resolved board.
    pub board:              Board,
    /// Selected sprint.
    pub sprint:             Sprint,
    /// Sprint issues in provider order.
    pub issues:             Vec<Issue>,
    /// Engineering metrics per kind; empty when unavailable.
    pub metrics:            BTreeMap<MetricKind, MetricSample>,
    /// Committed SP from the velocity aggregate, when available.
    pub committed_override: Option<f64>,
    /// Trailing sprints for velocity, oldest first, selected sprint last.
    pub velocity_history:   Vec<SprintSummary>,
    /// Previous retro action items.
    pub action_items:       Vec<ActionItem>,
    /// Non-fatal problems met while collecting.
    pub failures:           Vec<SoftFailure>
}

/// Filters closed sprints by name prefix, drops QA sprints and orders the
/// rest newest first.
pub fn recent_sprints(sprints: Vec<Sprint>, prefix: &str) -> Vec<Sprint> {
    let prefix = prefix.trim().to_lowercase();
    let mut recent: Vec<Sprint> = sprints
        .into_iter()
        .filter(|sprint| sprint.name.to_lowercase().starts_with(&prefix))
        .filter(|sprint| !sprint.name.to_uppercase().contains("QA"))
        .collect();
    recent.sort_by(|left, right| {
        right
            .recency()
            .cmp(&left.recency())
            .then_with(|| right.id.cmp(&left.id))
    });
    recent
}

/// Picks one sprint out of a newest-first list.
///
/// # Errors
///
/// Returns [`Error::SprintNotFound`] when the ordinal is zero or beyond the
/// list, or the identifier is not in it, and [`Error::Validation`] when the
/// chosen sprint completes before it starts.
pub fn select_sprint(recent: &[Sprint], selector: SprintSelector) -> Result<Sprint, Error> {
    let found = match selector {
        SprintSelector::Latest => recent.first(),
        SprintSelector::Ordinal(index) => index.checked_sub(1).and_then(|position| recent.get(position)),
        SprintSelector::Id(id) => recent.iter().find(|sprint| sprint.id == id)
    };
    let sprint = found.cloned().ok_or_else(|| Error::SprintNotFound {
        selector: selector.to_string()
    })?;
    sprint.validate()?;
    Ok(sprint)
}

/// Velocity history ending at `sprint`, oldest first.
pub fn velocity_history(
    recent: &[Sprint],
    sprint: &Sprint,
    entries: &[VelocityEntry],
    window: usize
) -> Vec<SprintSummary> {
    let by_id: BTreeMap<u64, &VelocityEntry> = entries.iter().map(|entry| (entry.sprint_id, entry)).collect();
    let position = recent.iter().position(|candidate| candidate.id == sprint.id).unwrap_or(0);
    let mut history: Vec<SprintSummary> = recent
        .iter()
        .skip(position)
        .filter_map(|candidate| {
            by_id.get(&candidate.id).map(|entry| SprintSummary {
                sprint_id: candidate.id,
                name:      candidate.name.clone(),
                committed: entry.committed,
                completed: entry.completed
            })
        })
        .take(window)
        .collect();
    history.reverse();
    history
}

fn local_date(timestamp: Option<chrono::DateTime<chrono::Utc>>, zone: Tz) -> Option<NaiveDate> {
    timestamp.map(|value| value.with_timezone(&zone).date_naive())
}

/// Gathers sprint data through the tracker and metrics clients.
#[derive(Debug)]
pub struct Collector<T> {
    config:   ReportConfig,
    tracker:  TrackerClient<T>,
    metrics:  Option<MetricsClient<T>>,
    resolver: FieldResolver
}

impl<T: Transport> Collector<T> {
    /// Creates a collector; `metrics` is optional.
    pub fn new(config: ReportConfig, tracker: TrackerClient<T>, metrics: Option<MetricsClient<T>>) -> Self {
        let resolver = FieldResolver::new(config.aliases.clone());
        Self {
            config,
            tracker,
            metrics,
            resolver
        }
    }

    /// Tracker client in use.
    pub fn tracker(&self) -> &TrackerClient<T> {
        &self.tracker
    }

    /// Field resolver, for inspection.
    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    /// Resolves the board and lists its closed sprints newest first.
    pub async fn recent(&self) -> Result<(Board, Vec<Sprint>), Error> {
        let board = self.tracker.find_board(&self.config.board_name).await?;
        let sprints = self.tracker.closed_sprints(board.id).await?;
        let recent = recent_sprints(sprints, &self.config.sprint_prefix);
        info!(board = %board.name, closed = recent.len(), "listed closed sprints");
        Ok((board, recent))
    }

    /// Collects the data for the sprint picked by `selector`.
    ///
    /// # Errors
    ///
    /// Board, sprint, field and issue retrieval failures are fatal; metrics,
    /// velocity and retro items only add soft failures.
    pub async fn collect(&mut self, selector: SprintSelector) -> Result<Collection, Error> {
        let (board, recent) = self.recent().await?;
        let sprint = select_sprint(&recent, selector)?;
        info!(sprint = %sprint.name, id = sprint.id, "selected sprint");

        let names: BTreeSet<String> = self.config.fields.all().iter().map(|name| (*name).to_owned()).collect();
        let mapping = self.resolver.resolve(&self.tracker, &names).await?;
        let fields = IssueFieldIds::from_mapping(
            &mapping,
            &self.config.fields.story_points,
            &self.config.fields.epic_link,
            &self.config.fields.sprint
        )?;

        let report = self.tracker.sprint_report(board.id, sprint.id).await?;
        let issues = self
            .tracker
            .sprint_issues(sprint.id, &fields, &report.added_during_sprint)
            .await?;
        info!(issues = issues.len(), added = report.added_during_sprint.len(), "fetched sprint issues");

        let mut failures = Vec::new();

        let (committed_override, velocity_history) = match self.tracker.velocity(board.id).await {
            Ok(entries) => {
                let committed = entries
                    .iter()
                    .find(|entry| entry.sprint_id == sprint.id)
                    .map(|entry| entry.committed);
                let history = velocity_history(&recent, &sprint, &entries, self.config.velocity_window);
                (committed, history)
            }
            Err(error) => {
                warn!(%error, "velocity aggregate unavailable");
                failures.push(SoftFailure::VelocityUnavailable {
                    cause: error.to_display_string()
                });
                (None, Vec::new())
            }
        };

        let metrics = self.collect_metrics(&sprint, &mut failures).await?;
        let action_items = self.collect_action_items(&mut failures).await;

        Ok(Collection {
            board,
            sprint,
            issues,
            metrics,
            committed_override,
            velocity_history,
            action_items,
            failures
        })
    }

    async fn collect_metrics(
        &self,
        sprint: &Sprint,
        failures: &mut Vec<SoftFailure>
    ) -> Result<BTreeMap<MetricKind, MetricSample>, Error> {
        let Some(metrics) = &self.metrics else {
            if self.config.metrics.is_some() {
                warn!("metrics provider configured without an API key");
                failures.push(SoftFailure::MetricsUnavailable {
                    cause: "no API key for the configured metrics provider".to_owned()
                });
            } else {
                info!("engineering metrics not configured");
            }
            return Ok(BTreeMap::new());
        };
        let zone = self.config.zone()?;
        let (Some(start), Some(end)) = (
            local_date(sprint.actual_start(), zone),
            local_date(sprint.actual_end(), zone)
        ) else {
            failures.push(SoftFailure::MetricsUnavailable {
                cause: format!("sprint '{}' has no date window", sprint.name)
            });
            return Ok(BTreeMap::new());
        };
        match metrics.daily_measurements(start, end).await {
            Ok(rows) => {
                let samples = samples_from(&rows, start, end);
                info!(kinds = samples.len(), days = rows.len(), "collected engineering metrics");
                Ok(samples)
            }
            Err(error) => {
                warn!(%error, "engineering metrics unavailable");
                failures.push(SoftFailure::MetricsUnavailable {
                    cause: error.to_display_string()
                });
                Ok(BTreeMap::new())
            }
        }
    }

    async fn collect_action_items(&self, failures: &mut Vec<SoftFailure>) -> Vec<ActionItem> {
        let children = match self.tracker.epic_children(&self.config.retro_epic).await {
            Ok(children) => children,
            Err(error) => {
                warn!(%error, epic = %self.config.retro_epic, "retro action items unavailable");
                failures.push(SoftFailure::RetroItemsUnavailable {
                    cause: error.to_display_string()
                });
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        let mut subtasks = Vec::new();
        for child in children {
            if !matches!(child.issue_type, IssueType::Story | IssueType::Task) {
                continue;
            }
            subtasks.extend(child.subtasks);
            items.push(child.item);
        }
        for key in subtasks {
            match self.tracker.action_item(&key).await {
                Ok(item) => items.push(item),
                Err(error) => {
                    warn!(%error, %key, "sub-task of retro item unavailable");
                    failures.push(SoftFailure::RetroItemsUnavailable {
                        cause: format!("{key}: {}", error.to_display_string())
                    });
                }
            }
        }
        info!(items = items.len(), "collected retro action items");
        items
    }
}
