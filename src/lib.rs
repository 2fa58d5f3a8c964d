// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Sprint retrospective reporting.
//!
//! The library collects one closed sprint from an issue tracker, optionally
//! joins daily engineering metrics, derives the retrospective numbers with a
//! pure engine and publishes the result as a page with chart attachments.
//! Every network call goes through [`ResilientClient`], which retries
//! transient failures with bounded exponential backoff.
//!
//! The stages are usable on their own: [`Collector`] returns a
//! [`Collection`], [`compute`] turns it into a [`ReportModel`] and
//! [`Publisher`] creates or updates the page. [`Reporter`] runs all three.

mod chart;
mod collector;
mod config;
mod docs;
mod engine;
mod engineering;
mod error;
mod fields;
mod http;
mod markup;
mod model;
mod pagination;
mod publisher;
mod report;
mod retry;
mod run;
#[cfg(test)]
mod testing;
mod tracker;

pub use chart::{ChartRenderer, RenderedChart, SvgChartRenderer};
pub use collector::{Collection, Collector, SprintSelector, recent_sprints, select_sprint};
pub use config::{
    Credentials, DEFAULT_BOT_PATTERN, DocumentSettings, FieldNames, MetricsSettings, ReportConfig, TrackerSettings,
    load_config, page_title, parse_config
};
pub use docs::{DocumentClient, RemoteDocument};
pub use engine::{EngineSettings, compute, percent_complete, top_completed, working_days};
pub use engineering::{DailyMeasurement, MetricsClient, samples_from};
pub use error::{Error, SoftFailure, io_error};
pub use fields::{FieldCatalogue, FieldDescriptor, FieldMapping, FieldResolver};
pub use http::{HttpRequest, HttpResponse, Payload, ReqwestTransport, ResilientClient, Transport, TransportFailure};
pub use markup::{percent_color, render_page, status_color, truncate_summary};
pub use model::{
    ActionItem, Assignee, DailyValue, Issue, IssueKey, IssueType, MetricKind, MetricSample, Sprint, SprintRef,
    SprintState, SprintSummary, Status
};
pub use pagination::{Cursor, LinkPages, OffsetPages, Page, PageFormat, Paginator};
pub use publisher::{PublishOutcome, Publisher, RenderedReport, render};
pub use report::{
    ActionItems, ActionRow, ChartDataset, ChartKind, IssueRow, Links, Overview, PersonAverage, QualityChecks,
    ReportModel, Series, SeriesStyle, SprintInfo
};
pub use retry::{AttemptOutcome, RetryConfig, RetryState};
pub use run::{Delivery, Reporter, RunMode, RunOptions, RunSummary};
pub use tracker::{Board, TrackerClient, resolve_board};
