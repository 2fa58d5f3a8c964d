// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! In-memory transports and fixtures for unit tests.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError}
};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use crate::{
    http::{HttpRequest, HttpResponse, Transport, TransportFailure},
    model::{Assignee, Issue, IssueKey, IssueType, Sprint, SprintRef, SprintState, Status}
};

type Scripted = Result<HttpResponse, TransportFailure>;

/// Replays a fixed list of outcomes and records every request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script:   Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script:   Mutex::new(script.into()),
            requests: Mutex::new(Vec::new())
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Other("script exhausted".to_owned())))
    }
}

/// Answers every request through a closure; the closure may keep state.
pub struct FnTransport<F> {
    handler:  F,
    requests: Mutex<Vec<HttpRequest>>
}

impl<F> FnTransport<F>
where
    F: Fn(&HttpRequest) -> Scripted + Send + Sync
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            requests: Mutex::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<F> Transport for FnTransport<F>
where
    F: Fn(&HttpRequest) -> Scripted + Send + Sync
{
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        (self.handler)(request)
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .expect("valid fixture date")
}

/// Closed two-week sprint starting Monday 2025-09-01.
pub fn sprint(id: u64, name: &str) -> Sprint {
    Sprint {
        id,
        name: name.to_owned(),
        state: SprintState::Closed,
        start: Some(utc(2025, 9, 1)),
        end: Some(utc(2025, 9, 12)),
        completed: Some(utc(2025, 9, 12)),
        activated: None
    }
}

pub fn sprint_ref(id: u64, start: DateTime<Utc>) -> SprintRef {
    SprintRef {
        id,
        name: format!("Sprint {id}"),
        start: Some(start)
    }
}

pub fn person(name: &str) -> Assignee {
    Assignee {
        account_id:   name.to_ascii_lowercase().replace(' ', "."),
        display_name: name.to_owned(),
        email:        None
    }
}

/// Story in the current sprint only, no epic, no assignee.
pub fn issue(key: &str, points: Option<f64>, status: Status) -> Issue {
    Issue {
        key: IssueKey::new(key),
        summary: format!("Summary of {key}"),
        issue_type: IssueType::Story,
        status,
        status_name: status.label().to_owned(),
        assignee: None,
        story_points: points,
        epic: Some("GV-1".to_owned()),
        sprint_history: vec![sprint_ref(12, utc(2025, 9, 1))],
        created: Some(utc(2025, 8, 28)),
        resolved: (status == Status::Done).then(|| utc(2025, 9, 5)),
        added_during_sprint: false
    }
}

/// Configuration matching [`tracker_fixture`].
pub const SAMPLE_CONFIG: &str = r"
tracker:
  base_url: https://tracker.example
metrics:
  base_url: https://metrics.example
  team_id: 7
documents:
  base_url: https://docs.example/wiki
  space_key: ENG
board_name: GVRE Board
sprint_prefix: GVRE
tech_debt_epic: GV-100
retro_epic: GV-200
";

pub type Fixture = fn(&HttpRequest) -> Result<HttpResponse, TransportFailure>;

/// Tracker with board 3, closed sprints 11 and 12 and two issues in sprint 12.
/// The velocity endpoint is down and every other address fails.
pub fn tracker_fixture(request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
    let path = request.address.trim_start_matches("https://tracker.example");
    let body: Value = match path {
        "/rest/agile/1.0/board" => json!({"isLast": true, "values": [{"id": 3, "name": "GVRE Board"}]}),
        "/rest/agile/1.0/board/3/sprint" => json!({"isLast": true, "values": [
            {"id": 11, "name": "GVRE-11", "state": "closed",
             "startDate": "2025-08-18T09:00:00.000Z", "endDate": "2025-08-29T09:00:00.000Z",
             "completeDate": "2025-08-29T09:00:00.000Z"},
            {"id": 12, "name": "GVRE-12", "state": "closed",
             "startDate": "2025-09-01T09:00:00.000Z", "endDate": "2025-09-12T09:00:00.000Z",
             "completeDate": "2025-09-12T09:00:00.000Z"}
        ]}),
        "/rest/api/2/field" => json!([
            {"id": "customfield_1", "name": "Story Points"},
            {"id": "customfield_2", "name": "Epic Link"},
            {"id": "customfield_3", "name": "Sprint"}
        ]),
        "/rest/greenhopper/1.0/rapid/charts/sprintreport" => {
            json!({"contents": {"issueKeysAddedDuringSprint": {"GV-2": true}}})
        }
        "/rest/agile/1.0/sprint/12/issue" => json!({"total": 2, "issues": [
            {"key": "GV-1", "fields": {"issuetype": {"name": "Story"},
              "status": {"name": "Done", "statusCategory": {"key": "done"}},
              "customfield_1": 8, "customfield_2": "GV-100"}},
            {"key": "GV-2", "fields": {"issuetype": {"name": "Task"},
              "status": {"name": "To Do", "statusCategory": {"key": "new"}},
              "customfield_1": 3}}
        ]}),
        "/rest/greenhopper/1.0/rapid/charts/velocity" => return Ok(HttpResponse::empty(503)),
        "/rest/agile/1.0/epic/GV-200/issue" => json!({"total": 2, "issues": [
            {"key": "GV-201", "fields": {"issuetype": {"name": "Task"},
              "status": {"name": "Done", "statusCategory": {"key": "done"}},
              "subtasks": [{"key": "GV-202"}]}},
            {"key": "GV-205", "fields": {"issuetype": {"name": "Epic"}, "status": {"name": "To Do"}}}
        ]}),
        "/rest/api/2/issue/GV-202" => json!({"key": "GV-202", "fields": {
            "issuetype": {"name": "Sub-task"}, "status": {"name": "In Progress"}}}),
        other => return Err(TransportFailure::Other(format!("unexpected path {other}")))
    };
    Ok(HttpResponse::json(200, &body))
}
