// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! End-to-end report run: collect, compute, publish.

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    chart::SvgChartRenderer,
    collector::{Collector, SprintSelector},
    config::{Credentials, ReportConfig},
    docs::{DocumentClient, RemoteDocument},
    engine::{self, EngineSettings},
    engineering::MetricsClient,
    error::{Error, SoftFailure},
    http::{ReqwestTransport, ResilientClient, Transport},
    model::Sprint,
    publisher::Publisher,
    report::Overview,
    tracker::{Board, TrackerClient}
};

/// Where the rendered report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Create or update the page on the document platform.
    Publish,
    /// Write markup and images into a directory.
    DryRun(PathBuf)
}

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Which closed sprint to report.
    pub selector: SprintSelector,
    /// Reference instant for ageing action items.
    pub now:      DateTime<Utc>,
    /// Output target.
    pub mode:     RunMode
}

/// What happened to the rendered report.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The page was written.
    Published {
        /// Page after the write.
        document: RemoteDocument,
        /// `true` when the page was new.
        created:  bool
    },
    /// Files were written locally.
    Written(Vec<PathBuf>)
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Page title.
    pub title:    String,
    /// Reported sprint name.
    pub sprint:   String,
    /// Headline numbers.
    pub overview: Overview,
    /// Output of the run.
    pub delivery: Delivery,
    /// Every soft failure met along the way.
    pub failures: Vec<SoftFailure>
}

impl RunSummary {
    /// `true` when the report was produced with gaps.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.title, self.sprint)?;
        writeln!(
            f,
            "  committed {:.1} SP, completed {:.1} SP, {:.0}% complete",
            self.overview.committed, self.overview.completed, self.overview.percent_complete
        )?;
        match &self.delivery {
            Delivery::Published {
                document,
                created: true
            } => writeln!(f, "  created page {} (version {})", document.id, document.version)?,
            Delivery::Published {
                document, ..
            } => writeln!(f, "  updated page {} to version {}", document.id, document.version)?,
            Delivery::Written(paths) => {
                writeln!(f, "  wrote {} file(s):", paths.len())?;
                for path in paths {
                    writeln!(f, "    {}", path.display())?;
                }
            }
        }
        if self.failures.is_empty() {
            write!(f, "  no soft failures")
        } else {
            write!(f, "  {} soft failure(s):", self.failures.len())?;
            for failure in &self.failures {
                write!(f, "\n    - {failure}")?;
            }
            Ok(())
        }
    }
}

/// Wires the providers together for one configuration.
#[derive(Debug)]
pub struct Reporter<T> {
    collector: Collector<T>,
    publisher: Publisher<T, SvgChartRenderer>,
    settings:  EngineSettings
}

impl Reporter<ReqwestTransport> {
    /// Builds HTTP clients for every configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for invalid settings and
    /// [`Error::Service`] when an HTTP client cannot be built.
    pub fn connect(config: ReportConfig, credentials: &Credentials) -> Result<Self, Error> {
        let client = || -> Result<ResilientClient, Error> {
            Ok(ResilientClient::new(ReqwestTransport::new(config.timeout())?, config.retry.clone()))
        };
        let tracker = TrackerClient::new(&config.tracker.base_url, credentials.tracker.clone(), client()?);
        let metrics = match (&config.metrics, &credentials.metrics) {
            (Some(settings), Some(key)) => Some(MetricsClient::new(
                &settings.base_url,
                key.clone(),
                settings.team_id,
                client()?
            )),
            _ => None
        };
        let docs = DocumentClient::new(config.documents.clone(), credentials.documents.clone(), client()?);
        Self::new(config, tracker, metrics, docs)
    }
}

impl<T: Transport> Reporter<T> {
    /// Assembles a reporter from ready clients.
    pub fn new(
        config: ReportConfig,
        tracker: TrackerClient<T>,
        metrics: Option<MetricsClient<T>>,
        docs: DocumentClient<T>
    ) -> Result<Self, Error> {
        let settings = EngineSettings::from_config(&config)?;
        let publisher = Publisher::new(
            docs,
            SvgChartRenderer::default(),
            config.documents.labels.clone(),
            config.summary_max_chars
        );
        Ok(Self {
            collector: Collector::new(config, tracker, metrics),
            publisher,
            settings
        })
    }

    /// Closed sprints of the board, newest first.
    pub async fn list_sprints(&self) -> Result<(Board, Vec<Sprint>), Error> {
        self.collector.recent().await
    }

    /// Runs collection, computation and output.
    ///
    /// `stage` is called with a short description before each stage.
    pub async fn run(&mut self, options: &RunOptions, mut stage: impl FnMut(&str)) -> Result<RunSummary, Error> {
        stage("collecting sprint data");
        let collection = self.collector.collect(options.selector).await?;
        let mut failures = collection.failures.clone();

        stage("computing metrics");
        let model = engine::compute(&collection, &self.settings, options.now);
        info!(
            title = %model.title,
            committed = model.overview.committed,
            completed = model.overview.completed,
            "report computed"
        );

        let delivery = match &options.mode {
            RunMode::DryRun(dir) => {
                stage("rendering report");
                let rendered = self.publisher.render(&model);
                failures.extend(rendered.failures.iter().cloned());
                let written = rendered.write_to(dir)?;
                info!(dir = %dir.display(), files = written.len(), "report written");
                Delivery::Written(written)
            }
            RunMode::Publish => {
                stage("publishing report");
                let outcome = self.publisher.publish(&model).await?;
                failures.extend(outcome.failures);
                Delivery::Published {
                    document: outcome.document,
                    created:  outcome.created
                }
            }
        };

        if !failures.is_empty() {
            warn!(count = failures.len(), "report produced with soft failures");
        }
        Ok(RunSummary {
            title: model.title,
            sprint: model.sprint.name,
            overview: model.overview,
            delivery,
            failures
        })
    }
}
