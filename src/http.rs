// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Resilient request executor shared by every provider integration.
//!
//! [`ResilientClient`] drives a [`Transport`] through the retry state machine
//! of [`crate::retry`]. The transport is a seam: production code uses
//! [`ReqwestTransport`], tests substitute a scripted one.

use std::{collections::BTreeMap, future::Future, time::Duration};

use rand::Rng;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::Error,
    retry::{AttemptOutcome, RetryConfig, RetryState, classify_status, parse_retry_after}
};

/// Maximum number of body bytes quoted in error messages.
const BODY_SNIPPET_LIMIT: usize = 400;

/// Request body variants.
///
/// Bodies are kept as plain data so every attempt can rebuild the wire
/// representation; multipart forms cannot be cloned once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON document.
    Json(Value),
    /// Single-file multipart upload under the form field `file`.
    File {
        /// File name announced to the server.
        file_name:    String,
        /// MIME type of the content.
        content_type: String,
        /// Raw bytes.
        bytes:        Vec<u8>
    }
}

/// Transport-agnostic request description.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method:  Method,
    /// Absolute address without query string.
    pub address: String,
    /// Query parameters in insertion order.
    pub query:   Vec<(String, String)>,
    /// Extra headers for this request.
    pub headers: Vec<(String, String)>,
    /// Optional body.
    pub payload: Option<Payload>
}

impl HttpRequest {
    /// Creates a request without query, headers or body.
    pub fn new(method: Method, address: impl Into<String>) -> Self {
        Self {
            method,
            address: address.into(),
            query: Vec::new(),
            headers: Vec::new(),
            payload: None
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(address: impl Into<String>) -> Self {
        Self::new(Method::GET, address)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Attaches a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.payload = Some(Payload::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Attaches a single-file multipart body.
    pub fn file(mut self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.payload = Some(Payload::File {
            file_name: file_name.to_owned(),
            content_type: content_type.to_owned(),
            bytes
        });
        self
    }

    /// Returns the value of the named query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Response captured from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status:  u16,
    /// Headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body:    Vec<u8>
}

impl HttpResponse {
    /// Builds a JSON response; mostly useful for fakes.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.to_string().into_bytes()
        }
    }

    /// Builds a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new()
        }
    }

    /// Adds a header, lower-casing its name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_owned());
        self
    }

    /// Looks a header up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|error| {
            Error::decode(format!("{error} (body: {})", self.body_snippet()))
        })
    }

    /// Leading part of the body for diagnostics.
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(BODY_SNIPPET_LIMIT).collect()
    }

    /// Turns a non-2xx final response into [`Error::Status`].
    pub fn error_for_status(self, address: &str) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Status {
                address: address.to_owned(),
                status:  self.status,
                body:    self.body_snippet()
            })
        }
    }
}

/// Failure raised by a transport before any response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The connection could not be established or was reset.
    Connect(String),
    /// The per-call timeout elapsed.
    Timeout(String),
    /// Anything else; not retried.
    Other(String)
}

impl TransportFailure {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Connect(_) | Self::Timeout(_) => AttemptOutcome::Retryable {
                status:      None,
                retry_after: None
            },
            Self::Other(_) => AttemptOutcome::Abort
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Connect(message) => format!("connection failed: {message}"),
            Self::Timeout(message) => format!("timed out: {message}"),
            Self::Other(message) => message.clone()
        }
    }
}

/// One network round trip.
pub trait Transport: Send + Sync {
    /// Sends `request` once, without retrying.
    fn send(
        &self,
        request: &HttpRequest
    ) -> impl Future<Output = Result<HttpResponse, TransportFailure>> + Send;
}

/// [`Transport`] backed by a `reqwest` client with a per-call timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client
}

impl ReqwestTransport {
    /// Builds a transport whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| Error::service(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            client
        })
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.address)
            .query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.payload {
            None => builder,
            Some(Payload::Json(value)) => builder.json(value),
            Some(Payload::File {
                file_name,
                content_type,
                bytes
            }) => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(content_type)
                    .map_err(|error| TransportFailure::Other(error.to_string()))?;
                builder.multipart(reqwest::multipart::Form::new().part("file", part))
            }
        };
        Ok(builder)
    }
}

fn failure_from_reqwest(error: reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout(error.to_string())
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportFailure::Connect(error.to_string())
    } else {
        TransportFailure::Other(error.to_string())
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let response = self.build(request)?.send().await.map_err(failure_from_reqwest)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_ascii_lowercase(), text.to_owned()))
            })
            .collect();
        let body = response.bytes().await.map_err(failure_from_reqwest)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body
        })
    }
}

/// Request executor with bounded retries, exponential backoff and jitter.
///
/// Retries connection failures, timeouts, 5xx and 429. Any other response,
/// including 4xx, is returned to the caller untouched. Exhausting the budget
/// yields [`Error::Transport`] carrying the attempt count and last status.
#[derive(Debug, Clone)]
pub struct ResilientClient<T = ReqwestTransport> {
    transport: T,
    retry:     RetryConfig
}

impl<T: Transport> ResilientClient<T> {
    /// Wraps `transport` with the given retry policy.
    pub fn new(transport: T, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry
        }
    }

    /// Retry policy in use.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes `request`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the attempt ceiling is reached or a
    /// non-retryable transport failure occurs.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let mut state = RetryState::start();
        let mut last_cause = String::new();

        loop {
            match state {
                RetryState::Attempting {
                    attempt
                } => {
                    debug!(
                        attempt,
                        method = %request.method,
                        address = %request.address,
                        "sending request"
                    );
                    let (outcome, response) = match self.transport.send(&request).await {
                        Ok(response) => {
                            let hint = response.header("retry-after").and_then(parse_retry_after);
                            let outcome = classify_status(response.status, hint);
                            if outcome != AttemptOutcome::Final {
                                last_cause = format!(
                                    "status {}: {}",
                                    response.status,
                                    response.body_snippet()
                                );
                            }
                            (outcome, Some(response))
                        }
                        Err(failure) => {
                            last_cause = failure.describe();
                            (failure.outcome(), None)
                        }
                    };

                    if outcome == AttemptOutcome::Final {
                        if attempt > 1 {
                            debug!(attempt, address = %request.address, "request succeeded after retries");
                        }
                        if let Some(response) = response {
                            return Ok(response);
                        }
                    }
                    state = self.retry.advance(state, outcome, jitter_sample());
                }
                RetryState::Backoff {
                    attempt,
                    delay
                } => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.ceiling(),
                        address = %request.address,
                        delay_ms = delay.as_millis() as u64,
                        cause = %last_cause,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    state = self.retry.advance(state, AttemptOutcome::Final, 0.0);
                }
                RetryState::Succeeded { .. } => {
                    return Err(Error::service("retry loop finished without a response"));
                }
                RetryState::Exhausted {
                    attempts,
                    last_status
                } => {
                    warn!(attempts, address = %request.address, cause = %last_cause, "giving up on request");
                    return Err(Error::Transport {
                        address: request.address.clone(),
                        cause: last_cause,
                        attempts,
                        last_status
                    });
                }
            }
        }
    }

    /// Executes `request` and requires a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] for non-2xx final responses in addition to
    /// the errors of [`execute`](Self::execute).
    pub async fn execute_ok(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let address = request.address.clone();
        self.execute(request).await?.error_for_status(&address)
    }

    /// Executes `request`, requires 2xx and decodes the JSON body.
    pub async fn fetch_json<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R, Error> {
        self.execute_ok(request).await?.decode()
    }
}

fn jitter_sample() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}
