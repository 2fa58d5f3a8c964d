// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Document platform client.
//!
//! Pages are addressed by title inside one space. Updates carry the version
//! the caller last read; the platform answers `409 Conflict` when somebody
//! else saved in between.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    config::DocumentSettings,
    error::Error,
    http::{HttpRequest, ResilientClient, Transport},
    pagination::{LinkPages, Paginator}
};

const ATTACHMENT_PAGE: u32 = 50;
const MAX_PAGES: usize = 20;

/// Page as last seen on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Platform identifier.
    pub id:          String,
    /// Page title.
    pub title:       String,
    /// Version number of the stored revision.
    pub version:     u32,
    /// Attachment identifiers keyed by file name.
    pub attachments: BTreeMap<String, String>
}

#[derive(Debug, Deserialize)]
struct RawContent {
    id:      String,
    title:   String,
    #[serde(default)]
    version: Option<RawVersion>
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    number: u32
}

impl RawContent {
    fn into_document(self) -> RemoteDocument {
        RemoteDocument {
            id:          self.id,
            title:       self.title,
            version:     self.version.map_or(1, |version| version.number),
            attachments: BTreeMap::new()
        }
    }
}

/// Client for pages, attachments and labels.
#[derive(Debug)]
pub struct DocumentClient<T> {
    settings: DocumentSettings,
    token:    String,
    client:   ResilientClient<T>
}

impl<T: Transport> DocumentClient<T> {
    /// Creates a client for the configured space.
    pub fn new(settings: DocumentSettings, token: impl Into<String>, client: ResilientClient<T>) -> Self {
        Self {
            settings: DocumentSettings {
                base_url: settings.base_url.trim_end_matches('/').to_owned(),
                ..settings
            },
            token: token.into(),
            client
        }
    }

    /// Underlying executor.
    pub fn client(&self) -> &ResilientClient<T> {
        &self.client
    }

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}{path}", self.settings.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
    }

    fn page_body(&self, title: &str, markup: &str) -> Value {
        let mut body = json!({
            "type": "page",
            "title": title,
            "space": {"key": self.settings.space_key},
            "body": {"storage": {"value": markup, "representation": "storage"}}
        });
        if let Some(parent) = &self.settings.parent_id {
            body["ancestors"] = json!([{"id": parent}]);
        }
        body
    }

    /// Looks a page up by exact title, including its attachments.
    pub async fn find_by_title(&self, title: &str) -> Result<Option<RemoteDocument>, Error> {
        let request = self
            .request(Method::GET, "/rest/api/content")
            .query("spaceKey", &self.settings.space_key)
            .query("title", title)
            .query("expand", "version");
        let document: Value = self.client.fetch_json(request).await?;
        let Some(first) = document
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
        else {
            debug!(title, "no existing page");
            return Ok(None);
        };
        let mut page = serde_json::from_value::<RawContent>(first.clone())
            .map_err(|error| Error::decode(format!("content lookup: {error}")))?
            .into_document();
        page.attachments = self.attachments(&page.id).await?;
        debug!(title, id = %page.id, version = page.version, "found existing page");
        Ok(Some(page))
    }

    /// Lists attachment identifiers by file name.
    pub async fn attachments(&self, page_id: &str) -> Result<BTreeMap<String, String>, Error> {
        let request = self.request(Method::GET, &format!("/rest/api/content/{page_id}/child/attachment"));
        let items: Vec<RawContent> = Paginator::new(
            &self.client,
            request,
            LinkPages::new(self.settings.base_url.clone(), ATTACHMENT_PAGE),
            MAX_PAGES
        )
        .collect_all()
        .await?;
        Ok(items.into_iter().map(|item| (item.title, item.id)).collect())
    }

    /// Creates a page under the configured parent.
    pub async fn create(&self, title: &str, markup: &str) -> Result<RemoteDocument, Error> {
        let request = self
            .request(Method::POST, "/rest/api/content")
            .json(&self.page_body(title, markup))?;
        let created: RawContent = self.client.fetch_json(request).await?;
        let page = created.into_document();
        info!(title, id = %page.id, "created page");
        Ok(page)
    }

    /// Replaces the body of `page`, bumping its version by one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PublishConflict`] when the stored version moved on.
    pub async fn update(&self, page: &RemoteDocument, markup: &str) -> Result<RemoteDocument, Error> {
        let next = page.version + 1;
        let mut body = self.page_body(&page.title, markup);
        body["id"] = json!(page.id);
        body["version"] = json!({"number": next});
        let request = self
            .request(Method::PUT, &format!("/rest/api/content/{}", page.id))
            .json(&body)?;
        let address = request.address.clone();
        let response = self.client.execute(request).await?;
        if response.status == 409 {
            return Err(Error::PublishConflict {
                title:   page.title.clone(),
                version: page.version
            });
        }
        let updated: RawContent = response.error_for_status(&address)?.decode()?;
        let mut updated = updated.into_document();
        updated.attachments = page.attachments.clone();
        info!(title = %page.title, id = %updated.id, version = updated.version, "updated page");
        Ok(updated)
    }

    /// Uploads `bytes` as `file_name`, replacing the attachment `existing`
    /// when given. Returns the attachment identifier.
    pub async fn upload(
        &self,
        page_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        existing: Option<&str>
    ) -> Result<String, Error> {
        let path = match existing {
            Some(attachment) => format!("/rest/api/content/{page_id}/child/attachment/{attachment}/data"),
            None => format!("/rest/api/content/{page_id}/child/attachment")
        };
        let request = self
            .request(Method::POST, &path)
            .header("X-Atlassian-Token", "nocheck")
            .file(file_name, content_type, bytes);
        let document: Value = self.client.fetch_json(request).await?;
        let id = document
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .unwrap_or(&document)
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| existing.map(str::to_owned))
            .ok_or_else(|| Error::decode(format!("attachment '{file_name}' answer has no id")))?;
        debug!(file_name, attachment = %id, replaced = existing.is_some(), "uploaded attachment");
        Ok(id)
    }

    /// Adds global labels to a page.
    pub async fn add_labels(&self, page_id: &str, labels: &[String]) -> Result<(), Error> {
        if labels.is_empty() {
            return Ok(());
        }
        let body: Vec<Value> = labels
            .iter()
            .map(|name| json!({"prefix": "global", "name": name}))
            .collect();
        let request = self
            .request(Method::POST, &format!("/rest/api/content/{page_id}/label"))
            .json(&body)?;
        self.client.execute_ok(request).await?;
        debug!(page_id, count = labels.len(), "labels applied");
        Ok(())
    }
}
