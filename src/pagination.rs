// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Page-by-page retrieval of list endpoints.
//!
//! A [`Paginator`] yields pages lazily until the provider reports there is
//! nothing more, or the page budget runs out. It cannot be rewound: once a
//! page has been handed out the cursor has moved past it.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::Error,
    http::{HttpRequest, HttpResponse, ResilientClient, Transport}
};

/// Position of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Zero-based item offset (`startAt` style).
    Offset(u64),
    /// Opaque continuation supplied by the provider (`_links.next` style).
    Token(String)
}

/// One decoded page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<I> {
    /// Items carried by the page.
    pub items: Vec<I>,
    /// Cursor of the following page, `None` on the last page.
    pub next:  Option<Cursor>
}

/// Describes how a provider encodes paging in requests and responses.
pub trait PageFormat {
    /// Item type produced by the format.
    type Item;

    /// Places `cursor` onto the base request.
    fn apply(&self, request: &HttpRequest, cursor: &Cursor) -> HttpRequest;

    /// Decodes a response fetched at `cursor`.
    fn parse(&self, response: &HttpResponse, cursor: &Cursor) -> Result<Page<Self::Item>, Error>;
}

/// `startAt` / `maxResults` paging with `isLast` or `total` hints.
#[derive(Debug, Clone)]
pub struct OffsetPages<I> {
    items_key: &'static str,
    page_size: u32,
    marker:    PhantomData<fn() -> I>
}

impl<I> OffsetPages<I> {
    /// Pages whose items live under `items_key`, requested `page_size` at a
    /// time.
    pub fn new(items_key: &'static str, page_size: u32) -> Self {
        Self {
            items_key,
            page_size: page_size.max(1),
            marker: PhantomData
        }
    }
}

impl<I: DeserializeOwned> PageFormat for OffsetPages<I> {
    type Item = I;

    fn apply(&self, request: &HttpRequest, cursor: &Cursor) -> HttpRequest {
        let offset = match cursor {
            Cursor::Offset(offset) => *offset,
            Cursor::Token(token) => token.parse().unwrap_or(0)
        };
        request
            .clone()
            .query("startAt", offset)
            .query("maxResults", self.page_size)
    }

    fn parse(&self, response: &HttpResponse, cursor: &Cursor) -> Result<Page<I>, Error> {
        let document: Value = response.decode()?;
        let raw_items = document
            .get(self.items_key)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let items: Vec<I> = serde_json::from_value(raw_items).map_err(|error| {
            Error::decode(format!("page field '{}': {error}", self.items_key))
        })?;

        let start = document
            .get("startAt")
            .and_then(Value::as_u64)
            .unwrap_or(match cursor {
                Cursor::Offset(offset) => *offset,
                Cursor::Token(_) => 0
            });
        let fetched = items.len() as u64;
        let page_size = document
            .get("maxResults")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(self.page_size));

        let has_more = if fetched == 0 {
            false
        } else if let Some(is_last) = document.get("isLast").and_then(Value::as_bool) {
            !is_last
        } else if let Some(total) = document.get("total").and_then(Value::as_u64) {
            start + fetched < total
        } else {
            fetched >= page_size
        };

        Ok(Page {
            items,
            next: has_more.then_some(Cursor::Offset(start + fetched))
        })
    }
}

/// `results` + `_links.next` paging used by the document platform.
#[derive(Debug, Clone)]
pub struct LinkPages<I> {
    base_url: String,
    limit:    u32,
    marker:   PhantomData<fn() -> I>
}

impl<I> LinkPages<I> {
    /// `base_url` is prefixed to relative `next` links.
    pub fn new(base_url: impl Into<String>, limit: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            limit: limit.max(1),
            marker: PhantomData
        }
    }
}

impl<I: DeserializeOwned> PageFormat for LinkPages<I> {
    type Item = I;

    fn apply(&self, request: &HttpRequest, cursor: &Cursor) -> HttpRequest {
        match cursor {
            Cursor::Offset(offset) => request
                .clone()
                .query("start", offset)
                .query("limit", self.limit),
            Cursor::Token(next) => {
                let mut follow = request.clone();
                follow.query.clear();
                follow.address = if next.starts_with("http://") || next.starts_with("https://") {
                    next.clone()
                } else {
                    format!("{}{}", self.base_url, next)
                };
                follow
            }
        }
    }

    fn parse(&self, response: &HttpResponse, _cursor: &Cursor) -> Result<Page<I>, Error> {
        let document: Value = response.decode()?;
        let raw_items = document
            .get("results")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let items: Vec<I> = serde_json::from_value(raw_items)
            .map_err(|error| Error::decode(format!("page field 'results': {error}")))?;
        let next = document
            .pointer("/_links/next")
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty() && !items.is_empty())
            .map(|link| Cursor::Token(link.to_owned()));
        Ok(Page {
            items,
            next
        })
    }
}

/// Lazily fetched, finite sequence of pages.
pub struct Paginator<'c, T, F> {
    client:    &'c ResilientClient<T>,
    request:   HttpRequest,
    format:    F,
    cursor:    Option<Cursor>,
    remaining: usize
}

impl<'c, T: Transport, F: PageFormat> Paginator<'c, T, F> {
    /// Starts at offset zero and fetches at most `max_pages` pages.
    pub fn new(client: &'c ResilientClient<T>, request: HttpRequest, format: F, max_pages: usize) -> Self {
        Self {
            client,
            request,
            format,
            cursor: Some(Cursor::Offset(0)),
            remaining: max_pages.max(1)
        }
    }

    /// Fetches the next page, or returns `None` once the sequence ended.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decoding errors. After an error the
    /// paginator is finished.
    pub async fn next_page(&mut self) -> Result<Option<Vec<F::Item>>, Error> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };
        if self.remaining == 0 {
            warn!(address = %self.request.address, "page budget exhausted, stopping early");
            return Ok(None);
        }
        self.remaining -= 1;

        let request = self.format.apply(&self.request, &cursor);
        let address = request.address.clone();
        let response = self.client.execute_ok(request).await?;
        let page = self.format.parse(&response, &cursor)?;
        debug!(%address, items = page.items.len(), more = page.next.is_some(), "fetched page");
        self.cursor = page.next;
        Ok(Some(page.items))
    }

    /// Drains every remaining page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<F::Item>, Error> {
        let mut items = Vec::new();
        while let Some(mut page) = self.next_page().await? {
            items.append(&mut page);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{retry::RetryConfig, testing::ScriptedTransport};

    fn client(script: Vec<HttpResponse>) -> ResilientClient<ScriptedTransport> {
        ResilientClient::new(
            ScriptedTransport::new(script.into_iter().map(Ok).collect()),
            RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            }
        )
    }

    #[tokio::test]
    async fn offset_pages_follow_is_last_flag() {
        let client = client(vec![
            HttpResponse::json(200, &json!({"startAt": 0, "maxResults": 2, "isLast": false, "values": [1, 2]})),
            HttpResponse::json(200, &json!({"startAt": 2, "maxResults": 2, "isLast": true, "values": [3]})),
        ]);
        let paginator = Paginator::new(
            &client,
            HttpRequest::get("https://tracker.example/rest/agile/1.0/board"),
            OffsetPages::<u32>::new("values", 2),
            10
        );

        let items = paginator.collect_all().await.expect("pages");
        assert_eq!(items, vec![1, 2, 3]);

        let requests = client.transport().requests();
        assert_eq!(requests[0].query_value("startAt"), Some("0"));
        assert_eq!(requests[1].query_value("startAt"), Some("2"));
    }

    #[tokio::test]
    async fn offset_pages_use_total_when_present() {
        let client = client(vec![
            HttpResponse::json(200, &json!({"startAt": 0, "maxResults": 2, "total": 3, "issues": ["A-1", "A-2"]})),
            HttpResponse::json(200, &json!({"startAt": 2, "maxResults": 2, "total": 3, "issues": ["A-3"]})),
        ]);
        let paginator = Paginator::new(
            &client,
            HttpRequest::get("https://tracker.example/rest/agile/1.0/sprint/7/issue"),
            OffsetPages::<String>::new("issues", 2),
            10
        );
        let items = paginator.collect_all().await.expect("pages");
        assert_eq!(items.len(), 3);
        assert_eq!(client.transport().request_count(), 2);
    }

    #[tokio::test]
    async fn empty_page_ends_sequence() {
        let client = client(vec![HttpResponse::json(200, &json!({"values": []}))]);
        let mut paginator = Paginator::new(
            &client,
            HttpRequest::get("https://tracker.example/x"),
            OffsetPages::<u32>::new("values", 50),
            10
        );
        assert_eq!(paginator.next_page().await.expect("page"), Some(Vec::new()));
        assert_eq!(paginator.next_page().await.expect("end"), None);
        assert_eq!(paginator.next_page().await.expect("still ended"), None);
    }

    #[tokio::test]
    async fn page_budget_bounds_the_sequence() {
        let full = HttpResponse::json(200, &json!({"isLast": false, "values": [1]}));
        let client = client(vec![full.clone(), full.clone(), full]);
        let paginator = Paginator::new(
            &client,
            HttpRequest::get("https://tracker.example/x"),
            OffsetPages::<u32>::new("values", 1),
            2
        );
        let items = paginator.collect_all().await.expect("pages");
        assert_eq!(items.len(), 2);
        assert_eq!(client.transport().request_count(), 2);
    }

    #[tokio::test]
    async fn link_pages_follow_relative_next_link() {
        let client = client(vec![
            HttpResponse::json(
                200,
                &json!({"results": ["a"], "_links": {"next": "/rest/api/content/9/child/attachment?start=1"}})
            ),
            HttpResponse::json(200, &json!({"results": ["b"], "_links": {}})),
        ]);
        let paginator = Paginator::new(
            &client,
            HttpRequest::get("https://docs.example/wiki/rest/api/content/9/child/attachment"),
            LinkPages::<String>::new("https://docs.example/wiki/", 25),
            10
        );
        let items = paginator.collect_all().await.expect("pages");
        assert_eq!(items, vec!["a".to_owned(), "b".to_owned()]);

        let requests = client.transport().requests();
        assert_eq!(
            requests[1].address,
            "https://docs.example/wiki/rest/api/content/9/child/attachment?start=1"
        );
        assert!(requests[1].query.is_empty());
    }

    #[tokio::test]
    async fn decoding_failure_is_reported() {
        let client = client(vec![HttpResponse::json(200, &json!({"values": ["x"]}))]);
        let paginator = Paginator::new(
            &client,
            HttpRequest::get("https://tracker.example/x"),
            OffsetPages::<u32>::new("values", 5),
            3
        );
        let error = paginator.collect_all().await.expect_err("strings are not numbers");
        assert!(matches!(error, Error::Decode { .. }));
    }
}
