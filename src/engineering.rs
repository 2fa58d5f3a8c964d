// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Engineering metrics provider.
//!
//! The provider reports daily team-level p50 values in minutes. They are
//! turned into zero-filled hourly series and one aggregate per metric kind.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    error::Error,
    http::{HttpRequest, ResilientClient, Transport},
    model::{DailyValue, MetricKind, MetricSample}
};

impl MetricKind {
    /// Measurement name understood by the provider.
    pub fn measurement(self) -> &'static str {
        match self {
            Self::CodingTime => "branch.time_to_pr",
            Self::PickupTime => "branch.time_to_review",
            Self::ReviewTime => "branch.review_time",
            Self::CycleTime => "branch.computed.cycle_time"
        }
    }
}

/// Values reported for one day, in minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMeasurement {
    /// Day the slice starts on.
    pub date:    NaiveDate,
    /// Minutes per metric; absent kinds had no data.
    pub minutes: BTreeMap<MetricKind, f64>
}

/// Client for the measurements endpoint.
#[derive(Debug)]
pub struct MetricsClient<T> {
    base_url: String,
    token:    String,
    team_id:  u64,
    client:   ResilientClient<T>
}

impl<T: Transport> MetricsClient<T> {
    /// Creates a client for `team_id` authenticated with an API key.
    pub fn new(base_url: &str, token: impl Into<String>, team_id: u64, client: ResilientClient<T>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            team_id,
            client
        }
    }

    /// Underlying executor.
    pub fn client(&self) -> &ResilientClient<T> {
        &self.client
    }

    /// Fetches daily p50 measurements between `start` and `end` inclusive.
    ///
    /// A `204 No Content` answer means the team had no data in the window.
    pub async fn daily_measurements(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyMeasurement>, Error> {
        let requested: Vec<Value> = MetricKind::ALL
            .iter()
            .map(|kind| json!({"name": kind.measurement(), "agg": "p50"}))
            .collect();
        let body = json!({
            "group_by": "team",
            "team_ids": [self.team_id],
            "roll_up": "1d",
            "requested_metrics": requested,
            "time_ranges": [{"after": start.to_string(), "before": end.to_string()}],
            "return_no_data": true,
            "limit": 1000
        });
        let request = HttpRequest::new(Method::POST, format!("{}/api/v2/measurements", self.base_url))
            .header("x-api-key", self.token.clone())
            .header("Accept", "application/json")
            .json(&body)?;
        let address = request.address.clone();
        let response = self.client.execute_ok(request).await?;
        if response.status == 204 || response.body.is_empty() {
            debug!(%address, "metrics provider returned no data");
            return Ok(Vec::new());
        }
        let slices: Vec<Value> = response.decode()?;
        Ok(slices.iter().filter_map(parse_slice).collect())
    }
}

fn parse_slice(slice: &Value) -> Option<DailyMeasurement> {
    let after = slice.get("after").and_then(Value::as_str)?;
    let date = NaiveDate::parse_from_str(after.split('T').next()?, "%Y-%m-%d").ok()?;
    let mut minutes = BTreeMap::new();
    for metric in slice.get("metrics").and_then(Value::as_array).into_iter().flatten() {
        let Some(entries) = metric.as_object() else {
            continue;
        };
        for (name, value) in entries {
            let Some(kind) = MetricKind::ALL
                .into_iter()
                .find(|kind| name.strip_suffix(":p50") == Some(kind.measurement()))
            else {
                continue;
            };
            if let Some(number) = value.as_f64() {
                minutes.insert(kind, number);
            }
        }
    }
    Some(DailyMeasurement {
        date,
        minutes
    })
}

/// Builds one sample per metric kind over `start..=end`.
///
/// Days without data become zero. A day missing cycle time gets the sum of
/// the other three kinds. Kinds with no non-zero day are left out.
pub fn samples_from(rows: &[DailyMeasurement], start: NaiveDate, end: NaiveDate) -> BTreeMap<MetricKind, MetricSample> {
    let by_date: BTreeMap<NaiveDate, &DailyMeasurement> = rows.iter().map(|row| (row.date, row)).collect();
    let days: Vec<NaiveDate> = start.iter_days().take_while(|day| *day <= end).collect();

    let mut samples = BTreeMap::new();
    for kind in MetricKind::ALL {
        let daily: Vec<DailyValue> = days
            .iter()
            .map(|day| DailyValue {
                date:  *day,
                hours: by_date.get(day).map_or(0.0, |row| minutes_for(row, kind)) / 60.0
            })
            .collect();
        let mut observed: Vec<f64> = daily.iter().map(|value| value.hours).filter(|hours| *hours > 0.0).collect();
        if observed.is_empty() {
            continue;
        }
        observed.sort_by(f64::total_cmp);
        samples.insert(kind, MetricSample {
            kind,
            value: median(&observed),
            daily
        });
    }
    samples
}

fn minutes_for(row: &DailyMeasurement, kind: MetricKind) -> f64 {
    match (kind, row.minutes.get(&kind)) {
        (_, Some(value)) => *value,
        (MetricKind::CycleTime, None) => [MetricKind::CodingTime, MetricKind::PickupTime, MetricKind::ReviewTime]
            .iter()
            .filter_map(|part| row.minutes.get(part))
            .sum(),
        _ => 0.0
    }
}

fn median(sorted: &[f64]) -> f64 {
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    } else {
        sorted[middle]
    }
}
