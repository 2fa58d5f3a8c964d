// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Issue tracker integration.
//!
//! Every response is narrowed into [`crate::model`] types here; callers never
//! see provider JSON. Board, sprint and issue lists are drained through the
//! offset paginator.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::OnceLock
};

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    fields::{FieldCatalogue, FieldDescriptor, FieldMapping},
    http::{HttpRequest, ResilientClient, Transport},
    model::{
        ActionItem, Assignee, Issue, IssueKey, IssueType, Sprint, SprintRef, SprintState, Status,
        checked_story_points
    },
    pagination::{OffsetPages, Paginator}
};

const BOARD_PAGE: u32 = 50;
const ISSUE_PAGE: u32 = 100;
const MAX_PAGES: usize = 50;

/// Scrum board.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Board {
    /// Board identifier.
    pub id:   u64,
    /// Board name.
    pub name: String
}

/// Provider ids of the custom fields the collector reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFieldIds {
    /// Story points field.
    pub story_points: String,
    /// Epic link field.
    pub epic_link:    String,
    /// Sprint history field.
    pub sprint:       String
}

impl IssueFieldIds {
    /// Looks the three configured names up in `mapping`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] for a name the mapping lacks.
    pub fn from_mapping(
        mapping: &FieldMapping,
        story_points: &str,
        epic_link: &str,
        sprint: &str
    ) -> Result<Self, Error> {
        Ok(Self {
            story_points: mapping.id(story_points)?.to_owned(),
            epic_link:    mapping.id(epic_link)?.to_owned(),
            sprint:       mapping.id(sprint)?.to_owned()
        })
    }

    fn request_list(&self) -> String {
        [
            "summary",
            "issuetype",
            "status",
            "assignee",
            "created",
            "resolutiondate",
            "parent",
            "closedSprints",
            self.story_points.as_str(),
            self.epic_link.as_str(),
            self.sprint.as_str()
        ]
        .join(",")
    }
}

/// Sprint report aggregate: keys of issues added after the sprint started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprintReport {
    /// Keys added mid-sprint.
    pub added_during_sprint: BTreeSet<String>
}

/// Committed and completed SP for one sprint as the velocity chart shows.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityEntry {
    /// Sprint identifier.
    pub sprint_id: u64,
    /// Committed SP.
    pub committed: f64,
    /// Completed SP.
    pub completed: f64
}

/// Issue under the retro epic, with the keys of its sub-tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct EpicChild {
    /// Parsed item.
    pub item:       ActionItem,
    /// Type of the child.
    pub issue_type: IssueType,
    /// Keys of its sub-tasks.
    pub subtasks:   Vec<String>
}

/// Client for the tracker's REST and agile APIs.
#[derive(Debug)]
pub struct TrackerClient<T> {
    base_url: String,
    token:    String,
    client:   ResilientClient<T>
}

impl<T: Transport> TrackerClient<T> {
    /// Creates a client authenticated with a bearer `token`.
    pub fn new(base_url: &str, token: impl Into<String>, client: ResilientClient<T>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client
        }
    }

    /// Base address of the tracker.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying executor.
    pub fn client(&self) -> &ResilientClient<T> {
        &self.client
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
    }

    /// Lists scrum boards.
    pub async fn boards(&self) -> Result<Vec<Board>, Error> {
        let request = self.get("/rest/agile/1.0/board").query("type", "scrum");
        Paginator::new(&self.client, request, OffsetPages::<Board>::new("values", BOARD_PAGE), MAX_PAGES)
            .collect_all()
            .await
    }

    /// Finds the board called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoardNotFound`] when no board or several boards match.
    pub async fn find_board(&self, name: &str) -> Result<Board, Error> {
        let boards = self.boards().await?;
        let board = resolve_board(&boards, name)?;
        info!(board = %board.name, id = board.id, "resolved board");
        Ok(board)
    }

    /// Lists closed sprints of `board_id` in provider order.
    ///
    /// Sprints whose completion precedes their start are skipped with a
    /// warning.
    pub async fn closed_sprints(&self, board_id: u64) -> Result<Vec<Sprint>, Error> {
        let request = self
            .get(&format!("/rest/agile/1.0/board/{board_id}/sprint"))
            .query("state", "closed");
        let raw = Paginator::new(
            &self.client,
            request,
            OffsetPages::<RawSprint>::new("values", BOARD_PAGE),
            MAX_PAGES
        )
        .collect_all()
        .await?;
        Ok(raw
            .into_iter()
            .map(RawSprint::into_sprint)
            .filter_map(|sprint| match sprint.validate() {
                Ok(()) => Some(sprint),
                Err(error) => {
                    warn!(sprint = %sprint.name, id = sprint.id, %error, "skipping sprint");
                    None
                }
            })
            .collect())
    }

    /// Fetches every issue of `sprint_id`, flagging keys in `added`.
    pub async fn sprint_issues(
        &self,
        sprint_id: u64,
        fields: &IssueFieldIds,
        added: &BTreeSet<String>
    ) -> Result<Vec<Issue>, Error> {
        let request = self
            .get(&format!("/rest/agile/1.0/sprint/{sprint_id}/issue"))
            .query("fields", fields.request_list());
        let raw = Paginator::new(
            &self.client,
            request,
            OffsetPages::<Value>::new("issues", ISSUE_PAGE),
            MAX_PAGES
        )
        .collect_all()
        .await?;
        debug!(sprint_id, issues = raw.len(), "fetched sprint issues");
        raw.iter().map(|value| parse_issue(value, fields, added)).collect()
    }

    /// Reads the sprint report aggregate.
    pub async fn sprint_report(&self, board_id: u64, sprint_id: u64) -> Result<SprintReport, Error> {
        let request = self
            .get("/rest/greenhopper/1.0/rapid/charts/sprintreport")
            .query("rapidViewId", board_id)
            .query("sprintId", sprint_id);
        let document: Value = self.client.fetch_json(request).await?;
        let added_during_sprint = document
            .pointer("/contents/issueKeysAddedDuringSprint")
            .and_then(Value::as_object)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        Ok(SprintReport {
            added_during_sprint
        })
    }

    /// Reads the velocity chart of `board_id`.
    pub async fn velocity(&self, board_id: u64) -> Result<Vec<VelocityEntry>, Error> {
        let request = self
            .get("/rest/greenhopper/1.0/rapid/charts/velocity")
            .query("rapidViewId", board_id);
        let document: Value = self.client.fetch_json(request).await?;
        parse_velocity(&document)
    }

    /// Lists the direct children of `epic_key`.
    pub async fn epic_children(&self, epic_key: &str) -> Result<Vec<EpicChild>, Error> {
        let request = self
            .get(&format!("/rest/agile/1.0/epic/{epic_key}/issue"))
            .query("fields", "summary,issuetype,status,assignee,created,subtasks");
        let raw = Paginator::new(
            &self.client,
            request,
            OffsetPages::<Value>::new("issues", ISSUE_PAGE),
            MAX_PAGES
        )
        .collect_all()
        .await?;
        raw.iter().map(parse_epic_child).collect()
    }

    /// Fetches a single issue as an action item.
    pub async fn action_item(&self, key: &str) -> Result<ActionItem, Error> {
        let request = self
            .get(&format!("/rest/api/2/issue/{key}"))
            .query("fields", "summary,issuetype,status,assignee,created,subtasks");
        let document: Value = self.client.fetch_json(request).await?;
        Ok(parse_epic_child(&document)?.item)
    }
}

impl<T: Transport> FieldCatalogue for TrackerClient<T> {
    async fn fetch_fields(&self) -> Result<Vec<FieldDescriptor>, Error> {
        let raw: Vec<RawField> = self.client.fetch_json(self.get("/rest/api/2/field")).await?;
        Ok(raw
            .into_iter()
            .map(|field| FieldDescriptor {
                id:         field.id,
                name:       field.name,
                field_type: field.schema.and_then(|schema| schema.kind)
            })
            .collect())
    }
}

/// Picks a board by exact name, then by a unique case-insensitive substring.
///
/// # Errors
///
/// Returns [`Error::BoardNotFound`] when nothing or more than one board
/// matches.
pub fn resolve_board(boards: &[Board], name: &str) -> Result<Board, Error> {
    if let Some(exact) = boards.iter().find(|board| board.name == name) {
        return Ok(exact.clone());
    }
    let needle = name.to_lowercase();
    let partial: Vec<&Board> = boards
        .iter()
        .filter(|board| board.name.to_lowercase().contains(&needle))
        .collect();
    match partial.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(Error::BoardNotFound {
            name:   name.to_owned(),
            reason: "no scrum board has that name".to_owned()
        }),
        many => Err(Error::BoardNotFound {
            name:   name.to_owned(),
            reason: format!(
                "ambiguous, candidates: {}",
                many.iter().map(|board| board.name.as_str()).collect::<Vec<_>>().join(", ")
            )
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawField {
    id:     String,
    #[serde(default)]
    name:   String,
    #[serde(default)]
    schema: Option<RawSchema>
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(rename = "type")]
    kind: Option<String>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSprint {
    id:             u64,
    name:           String,
    #[serde(default)]
    state:          Option<String>,
    #[serde(default)]
    start_date:     Option<String>,
    #[serde(default)]
    end_date:       Option<String>,
    #[serde(default)]
    complete_date:  Option<String>,
    #[serde(default)]
    activated_date: Option<String>
}

impl RawSprint {
    fn into_sprint(self) -> Sprint {
        let state = match self.state.as_deref().map(str::to_lowercase).as_deref() {
            Some("active") => SprintState::Active,
            Some("future") => SprintState::Future,
            _ => SprintState::Closed
        };
        Sprint {
            id: self.id,
            name: self.name,
            state,
            start: self.start_date.as_deref().and_then(parse_timestamp),
            end: self.end_date.as_deref().and_then(parse_timestamp),
            completed: self.complete_date.as_deref().and_then(parse_timestamp),
            activated: self.activated_date.as_deref().and_then(parse_timestamp)
        }
    }
}

/// Parses tracker timestamps: RFC 3339, `+0000` offsets, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "<null>" {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn issue_key(value: &Value) -> Result<IssueKey, Error> {
    text(value, "/key")
        .map(IssueKey::new)
        .ok_or_else(|| Error::decode("issue without key"))
}

fn parse_status(fields: &Value) -> (Status, String) {
    let name = text(fields, "/status/name").unwrap_or("Unknown");
    let category = text(fields, "/status/statusCategory/key");
    (Status::classify(name, category), name.to_owned())
}

fn parse_assignee(fields: &Value) -> Option<Assignee> {
    let person = fields.get("assignee").filter(|value| value.is_object())?;
    let display_name = text(person, "/displayName")?.to_owned();
    let account_id = text(person, "/accountId")
        .or_else(|| text(person, "/name"))
        .or_else(|| text(person, "/key"))
        .unwrap_or(&display_name)
        .to_owned();
    Some(Assignee {
        account_id,
        display_name,
        email: text(person, "/emailAddress").map(str::to_owned)
    })
}

fn parse_points(raw: Option<&Value>) -> Option<f64> {
    let value = match raw? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None
    };
    checked_story_points(value)
}

fn legacy_attribute_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[\[,]([A-Za-z]+)=([^,\]]*)").ok())
        .as_ref()
}

fn parse_sprint_entry(entry: &Value) -> Option<SprintRef> {
    match entry {
        Value::Object(_) => Some(SprintRef {
            id:    entry.get("id").and_then(Value::as_u64)?,
            name:  text(entry, "/name").unwrap_or_default().to_owned(),
            start: text(entry, "/startDate").and_then(parse_timestamp)
        }),
        Value::String(legacy) => {
            let attributes: BTreeMap<&str, &str> = legacy_attribute_pattern()?
                .captures_iter(legacy)
                .filter_map(|captures| Some((captures.get(1)?.as_str(), captures.get(2)?.as_str())))
                .collect();
            Some(SprintRef {
                id:    attributes.get("id")?.parse().ok()?,
                name:  attributes.get("name").copied().unwrap_or_default().to_owned(),
                start: attributes.get("startDate").and_then(|raw| parse_timestamp(raw))
            })
        }
        _ => None
    }
}

fn parse_sprint_history(fields: &Value, sprint_field: &str) -> Vec<SprintRef> {
    let mut history: Vec<SprintRef> = Vec::new();
    let sources = [fields.get(sprint_field), fields.get("closedSprints"), fields.get("sprint")];
    for source in sources.into_iter().flatten() {
        let entries: Vec<&Value> = match source {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single]
        };
        for entry in entries {
            if let Some(parsed) = parse_sprint_entry(entry) {
                if !history.iter().any(|known| known.id == parsed.id) {
                    history.push(parsed);
                }
            }
        }
    }
    history.sort_by_key(|entry| (entry.start, entry.id));
    history
}

fn parse_epic(fields: &Value, epic_field: &str) -> Option<String> {
    if let Some(link) = fields.get(epic_field).and_then(Value::as_str).filter(|link| !link.is_empty()) {
        return Some(link.to_owned());
    }
    let parent = fields.get("parent")?;
    let parent_type = text(parent, "/fields/issuetype/name")?;
    (IssueType::from_name(parent_type) == IssueType::Epic)
        .then(|| text(parent, "/key").map(str::to_owned))
        .flatten()
}

/// Narrows one raw issue into [`Issue`].
///
/// # Errors
///
/// Returns [`Error::Decode`] when the issue lacks a key or fields.
pub fn parse_issue(value: &Value, ids: &IssueFieldIds, added: &BTreeSet<String>) -> Result<Issue, Error> {
    let key = issue_key(value)?;
    let fields = value
        .get("fields")
        .ok_or_else(|| Error::decode(format!("issue {key} without fields")))?;
    let (status, status_name) = parse_status(fields);
    Ok(Issue {
        summary: text(fields, "/summary").unwrap_or_default().to_owned(),
        issue_type: IssueType::from_name(text(fields, "/issuetype/name").unwrap_or_default()),
        status,
        status_name,
        assignee: parse_assignee(fields),
        story_points: parse_points(fields.get(&ids.story_points)),
        epic: parse_epic(fields, &ids.epic_link),
        sprint_history: parse_sprint_history(fields, &ids.sprint),
        created: text(fields, "/created").and_then(parse_timestamp),
        resolved: text(fields, "/resolutiondate").and_then(parse_timestamp),
        added_during_sprint: added.contains(key.as_str()),
        key
    })
}

fn parse_epic_child(value: &Value) -> Result<EpicChild, Error> {
    let key = issue_key(value)?;
    let fields = value
        .get("fields")
        .ok_or_else(|| Error::decode(format!("issue {key} without fields")))?;
    let (status, status_name) = parse_status(fields);
    let subtasks = fields
        .get("subtasks")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| text(item, "/key").or_else(|| text(item, "/id")))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Ok(EpicChild {
        issue_type: IssueType::from_name(text(fields, "/issuetype/name").unwrap_or_default()),
        subtasks,
        item: ActionItem {
            summary: text(fields, "/summary").unwrap_or_default().to_owned(),
            assignee: parse_assignee(fields).map(|person| person.display_name),
            status,
            status_name,
            created: text(fields, "/created").and_then(parse_timestamp),
            key
        }
    })
}

fn parse_velocity(document: &Value) -> Result<Vec<VelocityEntry>, Error> {
    let Some(entries) = document.get("velocityStatEntries").and_then(Value::as_object) else {
        return Err(Error::decode("velocity payload without velocityStatEntries"));
    };
    let mut parsed: BTreeMap<u64, VelocityEntry> = BTreeMap::new();
    for (id, entry) in entries {
        let Ok(sprint_id) = id.parse::<u64>() else {
            continue;
        };
        let number = |pointer: &str| entry.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0);
        parsed.insert(sprint_id, VelocityEntry {
            sprint_id,
            committed: number("/estimated/value"),
            completed: number("/completed/value")
        });
    }
    Ok(parsed.into_values().collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        http::HttpResponse,
        retry::RetryConfig,
        testing::{ScriptedTransport, utc}
    };

    fn ids() -> IssueFieldIds {
        IssueFieldIds {
            story_points: "customfield_10016".to_owned(),
            epic_link:    "customfield_10014".to_owned(),
            sprint:       "customfield_10020".to_owned()
        }
    }

    fn tracker(script: Vec<HttpResponse>) -> TrackerClient<ScriptedTransport> {
        TrackerClient::new(
            "https://tracker.example/",
            "secret",
            ResilientClient::new(
                ScriptedTransport::new(script.into_iter().map(Ok).collect()),
                RetryConfig {
                    max_attempts: 1,
                    ..RetryConfig::default()
                }
            )
        )
    }

    fn board(id: u64, name: &str) -> Board {
        Board {
            id,
            name: name.to_owned()
        }
    }

    #[test]
    fn board_resolution_prefers_exact_then_unique_substring() {
        let boards = vec![board(1, "GVRE Board"), board(2, "GVRE Board (old)"), board(3, "Payments")];
        assert_eq!(resolve_board(&boards, "GVRE Board").expect("exact").id, 1);
        assert_eq!(resolve_board(&boards, "payments").expect("substring").id, 3);
        assert!(matches!(resolve_board(&boards, "gvre"), Err(Error::BoardNotFound { .. })));
        assert!(matches!(resolve_board(&boards, "Search"), Err(Error::BoardNotFound { .. })));
    }

    #[test]
    fn timestamps_in_tracker_formats_parse() {
        assert_eq!(parse_timestamp("2025-09-01T09:00:00.000+0000"), Some(utc(2025, 9, 1)));
        assert_eq!(parse_timestamp("2025-09-01T09:00:00.000Z"), Some(utc(2025, 9, 1)));
        assert!(parse_timestamp("2025-09-01").is_some());
        assert_eq!(parse_timestamp("<null>"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn raw_issue_is_narrowed_to_model() {
        let raw = json!({
            "key": "GV-7",
            "fields": {
                "summary": "Cache field catalogue",
                "issuetype": {"name": "Story"},
                "status": {"name": "Done", "statusCategory": {"key": "done"}},
                "assignee": {"accountId": "abc", "displayName": "Priya N"},
                "created": "2025-08-28T10:00:00.000+0000",
                "customfield_10016": 5.0,
                "customfield_10014": "GV-100",
                "customfield_10020": [
                    {"id": 11, "name": "Alpha-11", "startDate": "2025-08-18T09:00:00.000Z"},
                    {"id": 12, "name": "Alpha-12", "startDate": "2025-09-01T09:00:00.000Z"}
                ]
            }
        });
        let added = BTreeSet::from(["GV-7".to_owned()]);
        let issue = parse_issue(&raw, &ids(), &added).expect("parses");
        assert_eq!(issue.key.as_str(), "GV-7");
        assert_eq!(issue.status, Status::Done);
        assert_eq!(issue.story_points, Some(5.0));
        assert_eq!(issue.epic.as_deref(), Some("GV-100"));
        assert_eq!(issue.assignee.map(|person| person.account_id).as_deref(), Some("abc"));
        assert_eq!(issue.sprint_history.iter().map(|entry| entry.id).collect::<Vec<_>>(), [11, 12]);
        assert!(issue.added_during_sprint);
    }

    #[test]
    fn negative_points_and_missing_fields_become_absent() {
        let raw = json!({
            "key": "GV-8",
            "fields": {
                "summary": "Negative",
                "issuetype": {"name": "Task"},
                "status": {"name": "In Progress", "statusCategory": {"key": "indeterminate"}},
                "assignee": null,
                "customfield_10016": -2
            }
        });
        let issue = parse_issue(&raw, &ids(), &BTreeSet::new()).expect("parses");
        assert_eq!(issue.story_points, None);
        assert_eq!(issue.assignee, None);
        assert_eq!(issue.epic, None);
        assert!(issue.sprint_history.is_empty());
    }

    #[test]
    fn parent_epic_fills_missing_epic_link() {
        let raw = json!({
            "key": "GV-9",
            "fields": {
                "issuetype": {"name": "Bug"},
                "status": {"name": "To Do"},
                "parent": {"key": "GV-200", "fields": {"issuetype": {"name": "Epic"}}}
            }
        });
        let issue = parse_issue(&raw, &ids(), &BTreeSet::new()).expect("parses");
        assert_eq!(issue.epic.as_deref(), Some("GV-200"));
    }

    #[test]
    fn legacy_sprint_strings_are_understood() {
        let raw = json!({
            "key": "GV-10",
            "fields": {
                "issuetype": {"name": "Story"},
                "status": {"name": "Done"},
                "customfield_10020": [
                    "com.atlassian.greenhopper.service.sprint.Sprint@1a[id=11,rapidViewId=3,state=CLOSED,name=Alpha-11,startDate=2025-08-18T09:00:00.000Z,endDate=<null>]",
                    "com.atlassian.greenhopper.service.sprint.Sprint@1b[id=12,rapidViewId=3,state=CLOSED,name=Alpha-12,startDate=<null>,endDate=<null>]"
                ]
            }
        });
        let issue = parse_issue(&raw, &ids(), &BTreeSet::new()).expect("parses");
        let history = &issue.sprint_history;
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|entry| entry.id == 11 && entry.name == "Alpha-11" && entry.start.is_some()));
        assert!(history.iter().any(|entry| entry.id == 12 && entry.start.is_none()));
    }

    #[test]
    fn issue_without_key_fails_to_decode() {
        let error = parse_issue(&json!({"fields": {}}), &ids(), &BTreeSet::new()).expect_err("no key");
        assert!(matches!(error, Error::Decode { .. }));
    }

    #[test]
    fn velocity_entries_are_keyed_by_sprint() {
        let document = json!({
            "velocityStatEntries": {
                "12": {"estimated": {"value": 50.0}, "completed": {"value": 11.0}},
                "11": {"estimated": {"value": 40.0}, "completed": {"value": 38.0}}
            }
        });
        let entries = parse_velocity(&document).expect("parses");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sprint_id, 11);
        assert_eq!(entries[1].committed, 50.0);
    }

    #[tokio::test]
    async fn closed_sprints_are_paged_and_validated() {
        let tracker = tracker(vec![HttpResponse::json(
            200,
            &json!({"isLast": true, "values": [
                {"id": 12, "name": "Alpha-12", "state": "closed",
                 "startDate": "2025-09-01T09:00:00.000Z", "endDate": "2025-09-12T09:00:00.000Z",
                 "completeDate": "2025-09-12T10:00:00.000Z"}
            ]})
        )]);
        let sprints = tracker.closed_sprints(3).await.expect("sprints");
        assert_eq!(sprints.len(), 1);
        assert_eq!(sprints[0].state, SprintState::Closed);

        let requests = tracker.client().transport().requests();
        assert_eq!(requests[0].address, "https://tracker.example/rest/agile/1.0/board/3/sprint");
        assert_eq!(requests[0].query_value("state"), Some("closed"));
        assert!(
            requests[0]
                .headers
                .iter()
                .any(|(name, value)| name == "Authorization" && value == "Bearer secret")
        );
    }

    #[tokio::test]
    async fn inverted_historic_sprint_is_skipped() {
        let tracker = tracker(vec![HttpResponse::json(
            200,
            &json!({"isLast": true, "values": [
                {"id": 12, "name": "GVRE-12", "state": "closed",
                 "startDate": "2025-09-01T09:00:00.000Z", "endDate": "2025-09-12T09:00:00.000Z",
                 "completeDate": "2025-09-12T10:00:00.000Z"},
                {"id": 3, "name": "GVRE-3", "state": "closed",
                 "startDate": "2024-02-10T00:00:00.000Z", "endDate": "2024-02-20T00:00:00.000Z",
                 "completeDate": "2024-02-09T00:00:00.000Z"}
            ]})
        )]);
        let sprints = tracker.closed_sprints(3).await.expect("sprints");
        let ids: Vec<u64> = sprints.iter().map(|sprint| sprint.id).collect();
        assert_eq!(ids, [12]);
    }

    #[tokio::test]
    async fn sprint_report_lists_added_keys() {
        let tracker = tracker(vec![HttpResponse::json(
            200,
            &json!({"contents": {"issueKeysAddedDuringSprint": {"GV-3": true, "GV-4": true}}})
        )]);
        let report = tracker.sprint_report(3, 12).await.expect("report");
        assert_eq!(report.added_during_sprint.len(), 2);
        assert!(report.added_during_sprint.contains("GV-3"));
    }

    #[tokio::test]
    async fn field_catalogue_keeps_schema_type() {
        let tracker = tracker(vec![HttpResponse::json(
            200,
            &json!([{"id": "customfield_10016", "name": "Story Points", "schema": {"type": "number"}},
                    {"id": "summary", "name": "Summary"}])
        )]);
        let fields = tracker.fetch_fields().await.expect("catalogue");
        assert_eq!(fields[0].field_type.as_deref(), Some("number"));
        assert_eq!(fields[1].field_type, None);
    }

    #[tokio::test]
    async fn epic_children_carry_subtask_keys() {
        let tracker = tracker(vec![HttpResponse::json(
            200,
            &json!({"total": 1, "issues": [{
                "key": "GV-50",
                "fields": {
                    "summary": "Automate release notes",
                    "issuetype": {"name": "Task"},
                    "status": {"name": "In Progress", "statusCategory": {"key": "indeterminate"}},
                    "created": "2025-08-01T09:00:00.000+0000",
                    "subtasks": [{"key": "GV-51"}, {"id": "10052"}]
                }
            }]})
        )]);
        let children = tracker.epic_children("GV-RETRO").await.expect("children");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].subtasks, ["GV-51", "10052"]);
        assert_eq!(children[0].item.status, Status::InProgress);
    }
}
