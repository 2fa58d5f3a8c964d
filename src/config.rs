// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Configuration document describing one team's report.
//!
//! The YAML file carries addresses, board and epic names and tuning knobs.
//! Secrets never live in the file; they arrive as [`Credentials`] from the
//! command line or the environment.

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use chrono_tz::Tz;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    error::{self, Error},
    retry::RetryConfig
};

/// Default denylist for automation accounts, matched as whole words.
pub const DEFAULT_BOT_PATTERN: &str = r"\b(automation|bot|svc|service|ci|pipeline|system)\b";

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use sprint_retro::parse_config;
///
/// let yaml = r#"
/// tracker:
///   base_url: https://tracker.example
/// documents:
///   base_url: https://docs.example/wiki
///   space_key: ENG
/// board_name: GVRE Board
/// sprint_prefix: GVRE
/// tech_debt_epic: GV-100
/// retro_epic: GV-200
/// "#;
/// let config = parse_config(yaml).expect("valid configuration");
/// assert_eq!(config.top_completed_limit, 5);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Issue tracker endpoint.
    pub tracker:             TrackerSettings,
    /// Engineering metrics endpoint; metrics are skipped when absent.
    #[serde(default)]
    pub metrics:             Option<MetricsSettings>,
    /// Document platform endpoint and page placement.
    #[serde(alias = "confluence")]
    pub documents:           DocumentSettings,
    /// Scrum board whose sprints are reported.
    #[serde(alias = "board")]
    pub board_name:          String,
    /// Closed sprints are filtered by this name prefix.
    #[serde(default, alias = "prefix")]
    pub sprint_prefix:       String,
    /// Epic whose completed children are listed as tech debt.
    pub tech_debt_epic:      String,
    /// Epic holding retrospective action items.
    #[serde(alias = "retro_action_items_epic")]
    pub retro_epic:          String,
    /// Human names of the custom fields the report needs.
    #[serde(default)]
    pub fields:              FieldNames,
    /// Alternative catalogue names per field name.
    #[serde(default)]
    pub aliases:             BTreeMap<String, Vec<String>>,
    /// Case-insensitive regex excluding service accounts from people views.
    #[serde(default = "default_bot_pattern")]
    pub bot_pattern:         String,
    /// Retry policy shared by every integration.
    #[serde(default)]
    pub retry:               RetryConfig,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs:        u64,
    /// Length of the top completed issues table.
    #[serde(default = "default_top_completed_limit")]
    pub top_completed_limit: usize,
    /// Number of sprints on the velocity chart.
    #[serde(default = "default_velocity_window")]
    pub velocity_window:     usize,
    /// IANA zone used for dates shown in the report.
    #[serde(default = "default_time_zone")]
    pub time_zone:           String,
    /// Summaries longer than this are truncated in tables.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars:   usize
}

/// Issue tracker endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerSettings {
    /// Base address, e.g. `https://tracker.example`.
    pub base_url: String
}

/// Engineering metrics endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsSettings {
    /// Base address of the provider API.
    pub base_url: String,
    /// Team identifier on the provider side.
    pub team_id:  u64
}

/// Document platform endpoint and page placement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentSettings {
    /// Base address including any context path, e.g. `https://docs.example/wiki`.
    pub base_url:     String,
    /// Space that holds the report pages.
    pub space_key:    String,
    /// Optional parent page identifier.
    #[serde(default)]
    pub parent_id:    Option<String>,
    /// Labels attached to every report page.
    #[serde(default = "default_labels")]
    pub labels:       Vec<String>,
    /// Prefix of the page title; the sprint name follows it.
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String
}

/// Human names of the custom fields read from every issue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldNames {
    /// Estimate field.
    pub story_points: String,
    /// Epic link field.
    pub epic_link:    String,
    /// Sprint history field.
    pub sprint:       String
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            story_points: "Story Points".to_owned(),
            epic_link:    "Epic Link".to_owned(),
            sprint:       "Sprint".to_owned()
        }
    }
}

impl FieldNames {
    /// All configured names.
    pub fn all(&self) -> [&str; 3] {
        [self.story_points.as_str(), self.epic_link.as_str(), self.sprint.as_str()]
    }
}

/// Secrets for the three providers.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Tracker bearer token.
    pub tracker:   String,
    /// Document platform bearer token.
    pub documents: String,
    /// Metrics provider API key; metrics are skipped when absent.
    pub metrics:   Option<String>
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tracker", &"***")
            .field("documents", &"***")
            .field("metrics", &self.metrics.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_bot_pattern() -> String {
    DEFAULT_BOT_PATTERN.to_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_top_completed_limit() -> usize {
    5
}

fn default_velocity_window() -> usize {
    5
}

fn default_time_zone() -> String {
    "Asia/Kolkata".to_owned()
}

fn default_summary_max_chars() -> usize {
    120
}

fn default_labels() -> Vec<String> {
    vec!["retro".to_owned()]
}

fn default_title_prefix() -> String {
    "Sprint Retro".to_owned()
}

impl ReportConfig {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Compiled bot denylist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid pattern.
    pub fn bot_regex(&self) -> Result<Regex, Error> {
        Ok(RegexBuilder::new(&self.bot_pattern).case_insensitive(true).build()?)
    }

    /// Report time zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown zone name.
    pub fn zone(&self) -> Result<Tz, Error> {
        self.time_zone
            .parse()
            .map_err(|_| Error::validation(format!("unknown time zone '{}'", self.time_zone)))
    }

    /// Deterministic page title for `sprint_name`.
    pub fn page_title(&self, sprint_name: &str) -> String {
        page_title(&self.documents.title_prefix, sprint_name)
    }

    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("tracker.base_url", &self.tracker.base_url),
            ("documents.base_url", &self.documents.base_url),
            ("documents.space_key", &self.documents.space_key),
            ("board_name", &self.board_name),
            ("tech_debt_epic", &self.tech_debt_epic),
            ("retro_epic", &self.retro_epic)
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{name} must not be empty")));
            }
        }
        for address in [&self.tracker.base_url, &self.documents.base_url]
            .into_iter()
            .chain(self.metrics.as_ref().map(|metrics| &metrics.base_url))
        {
            if !address.starts_with("https://") && !address.starts_with("http://") {
                return Err(Error::validation(format!("'{address}' is not an http(s) address")));
            }
        }
        if self.fields.all().iter().any(|name| name.trim().is_empty()) {
            return Err(Error::validation("field names must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::validation("timeout_secs must be positive"));
        }
        if self.top_completed_limit == 0 {
            return Err(Error::validation("top_completed_limit must be positive"));
        }
        if self.velocity_window == 0 {
            return Err(Error::validation("velocity_window must be positive"));
        }
        if self.summary_max_chars < 4 {
            return Err(Error::validation("summary_max_chars must be at least 4"));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(Error::validation("retry.backoff_factor must be at least 1.0"));
        }
        self.bot_regex()?;
        self.zone()?;
        Ok(())
    }
}

/// Joins a title prefix and a sprint name; an empty prefix yields the name.
pub fn page_title(prefix: &str, sprint_name: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        sprint_name.to_owned()
    } else {
        format!("{prefix} - {sprint_name}")
    }
}

/// Reads and validates the configuration at `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read, plus the errors of
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<ReportConfig, Error> {
    let contents = fs::read_to_string(path).map_err(|source| error::io_error(path, source))?;
    parse_config(&contents)
}

/// Parses and validates a configuration document.
///
/// # Errors
///
/// Propagates [`Error::Parse`] when the YAML cannot be decoded and
/// [`Error::Validation`] when a value is out of range.
pub fn parse_config(contents: &str) -> Result<ReportConfig, Error> {
    let config: ReportConfig = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}
