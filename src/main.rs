// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Command-line interface for the sprint retro reporter.
//!
//! One invocation reports one closed sprint. `--list-sprints` shows which
//! ordinals and identifiers are available, `--dry-run` writes the page and
//! charts to a directory instead of publishing them.

use std::{io, path::PathBuf, process, time::Duration};

use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use sprint_retro::{Credentials, Error, Reporter, RunMode, RunOptions, SprintSelector, load_config};
use tracing_subscriber::EnvFilter;

/// Publish a sprint retrospective page from tracker and metrics data.
#[derive(Debug, Parser)]
#[command(name = "sprint-retro", version, about = "Publish sprint retrospective reports")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long = "config", value_name = "PATH", default_value = "config/report.yaml")]
    config: PathBuf,

    #[command(flatten)]
    selection: Selection,

    /// Reference time for ageing action items (RFC 3339); defaults to now.
    #[arg(long = "now", value_name = "RFC3339", value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    /// Render into `--output` instead of publishing.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Directory receiving dry-run output.
    #[arg(long = "output", value_name = "DIR", default_value = "report-out", requires = "dry_run")]
    output: PathBuf,

    /// Print the closed sprints of the board and exit.
    #[arg(long = "list-sprints", action = ArgAction::SetTrue)]
    list_sprints: bool,

    #[command(flatten)]
    tokens: Tokens
}

#[derive(Debug, Args)]
#[group(multiple = false)]
struct Selection {
    /// 1-based position among recent closed sprints, newest first.
    #[arg(long = "sprint-index", value_name = "N")]
    sprint_index: Option<usize>,

    /// Tracker identifier of the sprint.
    #[arg(long = "sprint-id", value_name = "ID")]
    sprint_id: Option<u64>
}

impl Selection {
    fn selector(&self) -> SprintSelector {
        match (self.sprint_index, self.sprint_id) {
            (_, Some(id)) => SprintSelector::Id(id),
            (Some(index), None) => SprintSelector::Ordinal(index),
            (None, None) => SprintSelector::Latest
        }
    }
}

#[derive(Args)]
struct Tokens {
    /// Issue tracker token.
    #[arg(long = "tracker-token", env = "TRACKER_TOKEN", hide_env_values = true)]
    tracker: String,

    /// Document platform token.
    #[arg(long = "docs-token", env = "DOCS_TOKEN", hide_env_values = true)]
    documents: String,

    /// Engineering metrics API key.
    #[arg(long = "metrics-token", env = "METRICS_TOKEN", hide_env_values = true)]
    metrics: Option<String>
}

impl std::fmt::Debug for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokens").finish_non_exhaustive()
    }
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| format!("expected an RFC 3339 timestamp: {error}"))
}

/// Entry point that reports errors and sets the appropriate exit status.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    if let Err(error) = run(Cli::parse()) {
        eprintln!("{}", error.to_display_string());
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| Error::service(format!("failed to start runtime: {error}")))?;
    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<(), Error> {
    let config = load_config(&cli.config)?;
    let credentials = Credentials {
        tracker:   cli.tokens.tracker,
        documents: cli.tokens.documents,
        metrics:   cli.tokens.metrics
    };
    let mut reporter = Reporter::connect(config, &credentials)?;

    if cli.list_sprints {
        let (board, sprints) = reporter.list_sprints().await?;
        println!("{} (board {})", board.name, board.id);
        for (ordinal, sprint) in sprints.iter().enumerate() {
            let closed = sprint
                .recency()
                .map_or_else(|| "-".to_owned(), |date| date.format("%Y-%m-%d").to_string());
            println!("{:>3}  {:>6}  {}  {}", ordinal + 1, sprint.id, closed, sprint.name);
        }
        return Ok(());
    }

    let options = RunOptions {
        selector: cli.selection.selector(),
        now:      cli.now.unwrap_or_else(Utc::now),
        mode:     if cli.dry_run { RunMode::DryRun(cli.output) } else { RunMode::Publish }
    };

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.yellow} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = reporter
        .run(&options, |stage| spinner.set_message(format!("{stage}...")))
        .await;
    spinner.finish_and_clear();

    println!("{}", result?);
    Ok(())
}
