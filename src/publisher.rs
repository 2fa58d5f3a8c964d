// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Report publishing.
//!
//! A report is rendered once into markup plus chart images, then written to
//! the page titled after the sprint. Publishing the same model twice updates
//! that page instead of creating a second one.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf}
};

use tracing::{info, warn};

use crate::{
    chart::{ChartRenderer, RenderedChart, SvgChartRenderer},
    docs::{DocumentClient, RemoteDocument},
    error::{self, Error, SoftFailure},
    http::Transport,
    markup,
    report::ReportModel
};

/// Markup and images of one report.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    /// Page title.
    pub title:    String,
    /// Page body referencing every rendered chart.
    pub markup:   String,
    /// Chart images.
    pub charts:   Vec<RenderedChart>,
    /// Charts that could not be drawn.
    pub failures: Vec<SoftFailure>
}

impl RenderedReport {
    /// Writes `page.html` and every chart image into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory or a file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        fs::create_dir_all(dir).map_err(|source| error::io_error(dir, source))?;
        let mut written = Vec::with_capacity(self.charts.len() + 1);
        let page = dir.join("page.html");
        fs::write(&page, self.markup.as_bytes()).map_err(|source| error::io_error(&page, source))?;
        written.push(page);
        for chart in &self.charts {
            let path = dir.join(&chart.file_name);
            fs::write(&path, &chart.bytes).map_err(|source| error::io_error(&path, source))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Renders `model` with `renderer`.
///
/// A chart that fails to render is left out and noted; the page shows a
/// placeholder in its place.
pub fn render<R: ChartRenderer>(model: &ReportModel, renderer: &R, summary_max_chars: usize) -> RenderedReport {
    let mut charts = Vec::with_capacity(model.charts.len());
    let mut failures = Vec::new();
    for dataset in &model.charts {
        match renderer.render(dataset) {
            Ok(chart) => charts.push(chart),
            Err(error) => {
                let failure = SoftFailure::AttachmentUpload {
                    name:  dataset.file_name("svg"),
                    cause: error.to_display_string()
                };
                warn!(%failure, "chart not rendered");
                failures.push(failure);
            }
        }
    }
    let markup = markup::render_page(model, summary_max_chars, &image_map(&charts));
    RenderedReport {
        title: model.title.clone(),
        markup,
        charts,
        failures
    }
}

fn image_map<'a>(charts: impl IntoIterator<Item = &'a RenderedChart>) -> BTreeMap<&'static str, String> {
    charts
        .into_iter()
        .map(|chart| (chart.stem, chart.file_name.clone()))
        .collect()
}

/// Outcome of a publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    /// Page after the last write.
    pub document: RemoteDocument,
    /// `true` when the page did not exist before.
    pub created:  bool,
    /// Non-fatal problems met while publishing.
    pub failures: Vec<SoftFailure>
}

/// Writes reports to the document platform.
#[derive(Debug)]
pub struct Publisher<T, R = SvgChartRenderer> {
    docs:              DocumentClient<T>,
    renderer:          R,
    labels:            Vec<String>,
    summary_max_chars: usize
}

impl<T: Transport, R: ChartRenderer> Publisher<T, R> {
    /// Creates a publisher attaching `labels` to every page.
    pub fn new(docs: DocumentClient<T>, renderer: R, labels: Vec<String>, summary_max_chars: usize) -> Self {
        Self {
            docs,
            renderer,
            labels,
            summary_max_chars
        }
    }

    /// Document client in use.
    pub fn docs(&self) -> &DocumentClient<T> {
        &self.docs
    }

    /// Renders `model` without publishing it.
    pub fn render(&self, model: &ReportModel) -> RenderedReport {
        render(model, &self.renderer, self.summary_max_chars)
    }

    /// Creates or updates the page of `model`.
    ///
    /// Attachment and label failures are recorded in the outcome; the page is
    /// still written, with placeholders for missing charts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PublishConflict`] when the page changed concurrently
    /// and [`Error::Transport`] or [`Error::Status`] when a page write fails.
    pub async fn publish(&self, model: &ReportModel) -> Result<PublishOutcome, Error> {
        let rendered = self.render(model);
        let mut failures = rendered.failures.clone();

        let (document, created) = match self.docs.find_by_title(&rendered.title).await? {
            Some(existing) => {
                info!(title = %rendered.title, version = existing.version, "updating existing page");
                let uploaded = self.upload_all(&existing, &rendered.charts, &mut failures).await;
                let markup = if uploaded.len() == rendered.charts.len() {
                    rendered.markup.clone()
                } else {
                    self.degraded_markup(model, &uploaded)
                };
                let mut document = self.docs.update(&existing, &markup).await?;
                document.attachments = merged(&existing, &uploaded);
                (document, false)
            }
            None => {
                info!(title = %rendered.title, "creating page");
                let fresh = self.docs.create(&rendered.title, &rendered.markup).await?;
                let uploaded = self.upload_all(&fresh, &rendered.charts, &mut failures).await;
                let mut document = if uploaded.len() == rendered.charts.len() {
                    fresh.clone()
                } else {
                    self.docs.update(&fresh, &self.degraded_markup(model, &uploaded)).await?
                };
                document.attachments = merged(&fresh, &uploaded);
                (document, true)
            }
        };

        let mut labels = self.labels.clone();
        labels.push(format!("sprint-{}", model.sprint.id));
        if let Err(error) = self.docs.add_labels(&document.id, &labels).await {
            let failure = SoftFailure::LabelsFailed {
                cause: error.to_display_string()
            };
            warn!(%failure, "labels not applied");
            failures.push(failure);
        }

        Ok(PublishOutcome {
            document,
            created,
            failures
        })
    }

    fn degraded_markup(&self, model: &ReportModel, uploaded: &[(&RenderedChart, String)]) -> String {
        let images = image_map(uploaded.iter().map(|(chart, _)| *chart));
        markup::render_page(model, self.summary_max_chars, &images)
    }

    async fn upload_all<'c>(
        &self,
        page: &RemoteDocument,
        charts: &'c [RenderedChart],
        failures: &mut Vec<SoftFailure>
    ) -> Vec<(&'c RenderedChart, String)> {
        let mut uploaded = Vec::with_capacity(charts.len());
        for chart in charts {
            let existing = page.attachments.get(&chart.file_name).map(String::as_str);
            match self
                .docs
                .upload(&page.id, &chart.file_name, chart.content_type, chart.bytes.clone(), existing)
                .await
            {
                Ok(id) => {
                    info!(file = %chart.file_name, replaced = existing.is_some(), "attachment uploaded");
                    uploaded.push((chart, id));
                }
                Err(error) => {
                    let failure = SoftFailure::AttachmentUpload {
                        name:  chart.file_name.clone(),
                        cause: error.to_display_string()
                    };
                    warn!(%failure, "attachment skipped");
                    failures.push(failure);
                }
            }
        }
        uploaded
    }
}

fn merged(page: &RemoteDocument, uploaded: &[(&RenderedChart, String)]) -> BTreeMap<String, String> {
    let mut attachments = page.attachments.clone();
    for (chart, id) in uploaded {
        attachments.insert(chart.file_name.clone(), id.clone());
    }
    attachments
}
