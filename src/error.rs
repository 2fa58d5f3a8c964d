#![allow(non_shorthand_field_patterns)]
#![doc = "Error handling primitives shared across the sprint-retro crate."]
// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The derive emitted by [`masterror::Error`] expands pattern matches that
//! trigger the `non_shorthand_field_patterns` lint. The lint is disabled for
//! the module to keep the generated implementations warning-free.
//!
//! Two families live here. [`Error`] is fatal: it aborts the run and keeps the
//! originating cause. [`SoftFailure`] is recorded in the run summary while the
//! run continues with a degraded report.

use std::{
    fmt,
    path::{Path, PathBuf}
};

use serde::Serialize;

/// Unified fatal error type returned by collection, computation and publish.
#[derive(Debug, masterror::Error)]
pub enum Error {
    /// A network call failed after the retry budget was spent, or failed in a
    /// way that retrying cannot fix.
    #[error("request to {address} failed after {attempts} attempt(s) (last status: {last_status:?}): {cause}")]
    Transport {
        /// Address of the failing call, without query string.
        address:     String,
        /// Description of the last failure observed.
        cause:       String,
        /// Number of attempts that were made.
        attempts:    u32,
        /// HTTP status of the last response, when one was received.
        last_status: Option<u16>
    },
    /// The provider answered with a non-retryable client error.
    #[error("{address} answered with status {status}: {body}")]
    Status {
        /// Address of the call.
        address: String,
        /// HTTP status code.
        status:  u16,
        /// Leading part of the response body.
        body:    String
    },
    /// A requested field name has no counterpart in the provider catalogue.
    #[error("field '{name}' was not found in the issue tracker field catalogue")]
    FieldNotFound {
        /// Human-readable field name that failed to resolve.
        name: String
    },
    /// The configured board does not exist or the name is ambiguous.
    #[error("board '{name}' could not be resolved: {reason}")]
    BoardNotFound {
        /// Configured board name.
        name:   String,
        /// Why resolution failed.
        reason: String
    },
    /// The sprint selector does not match a closed sprint on the board.
    #[error("sprint {selector} was not found among closed sprints")]
    SprintNotFound {
        /// Rendered selector (ordinal or identifier).
        selector: String
    },
    /// The report page changed between read and write.
    #[error("document '{title}' was modified concurrently (expected version {version}); rerun the report")]
    PublishConflict {
        /// Title of the page being updated.
        title:   String,
        /// Version number the update was based on.
        version: u32
    },
    /// Wraps I/O errors raised while reading configuration or writing output.
    #[error("i/o failure at {path:?}: {source}")]
    Io {
        /// Location that triggered the error.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error
    },
    /// Wraps YAML decoding errors.
    #[error("failed to parse configuration: {source}")]
    Parse {
        /// Source decoding error from serde_yaml.
        source: serde_yaml::Error
    },
    /// A provider payload could not be decoded into the expected shape.
    #[error("failed to decode provider payload: {message}")]
    Decode {
        /// Human readable description of the decoding problem.
        message: String
    },
    /// Returned when configuration or input data violates invariants.
    #[error("invalid input: {message}")]
    Validation {
        /// Human readable message describing the validation problem.
        message: String
    },
    /// Service errors that do not fit a more specific variant.
    #[error("service error: {message}")]
    Service {
        /// Human readable message describing the service error.
        message: String
    }
}

impl Error {
    /// Constructs a validation error from the provided displayable value.
    pub fn validation<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Validation {
            message: message.into()
        }
    }

    /// Constructs a service error from the provided displayable value.
    pub fn service<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Service {
            message: message.into()
        }
    }

    /// Constructs a decode error from the provided displayable value.
    pub fn decode<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Decode {
            message: message.into()
        }
    }

    /// Formats the error for diagnostics without the variant name.
    pub fn to_display_string(&self) -> String {
        format!("{self}")
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Parse {
            source
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Decode {
            message: source.to_string()
        }
    }
}

impl From<regex::Error> for Error {
    fn from(source: regex::Error) -> Self {
        Self::Validation {
            message: format!("invalid pattern: {source}")
        }
    }
}

/// Creates an [`Error::Io`] variant capturing the failing path and source.
pub fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source
    }
}

/// Non-fatal failure recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftFailure {
    /// Engineering metrics could not be fetched; metric charts are omitted.
    MetricsUnavailable {
        /// Reason reported by the collector.
        cause: String
    },
    /// The velocity aggregate could not be read; committed SP was derived from
    /// the issue list and the velocity chart degrades to the current sprint.
    VelocityUnavailable {
        /// Reason reported by the collector.
        cause: String
    },
    /// Previous retro action items could not be fetched.
    RetroItemsUnavailable {
        /// Reason reported by the collector.
        cause: String
    },
    /// A chart attachment could not be uploaded; the page shows a placeholder.
    AttachmentUpload {
        /// Attachment file name.
        name:  String,
        /// Reason reported by the publisher.
        cause: String
    },
    /// Labels could not be attached to the published page.
    LabelsFailed {
        /// Reason reported by the publisher.
        cause: String
    }
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetricsUnavailable {
                cause
            } => write!(f, "engineering metrics unavailable: {cause}"),
            Self::VelocityUnavailable {
                cause
            } => write!(f, "velocity aggregate unavailable: {cause}"),
            Self::RetroItemsUnavailable {
                cause
            } => write!(f, "retro action items unavailable: {cause}"),
            Self::AttachmentUpload {
                name,
                cause
            } => write!(f, "attachment '{name}' not uploaded: {cause}"),
            Self::LabelsFailed {
                cause
            } => write!(f, "labels not applied: {cause}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, SoftFailure};

    #[test]
    fn validation_constructor_populates_message() {
        let error = Error::validation("something went wrong");
        match error {
            Error::Validation {
                ref message
            } => {
                assert_eq!(message, "something went wrong");
            }
            other => panic!("expected validation error, got {other:?}")
        }
    }

    #[test]
    fn to_display_string_matches_display() {
        let error = Error::validation("display me");
        assert_eq!(error.to_string(), error.to_display_string());
    }

    #[test]
    fn transport_error_reports_attempts_and_status() {
        let error = Error::Transport {
            address:     "https://tracker.example/rest/api/2/field".to_owned(),
            cause:       "service unavailable".to_owned(),
            attempts:    4,
            last_status: Some(503)
        };
        let rendered = error.to_string();
        assert!(rendered.contains("4 attempt(s)"));
        assert!(rendered.contains("503"));
    }

    #[test]
    fn transport_error_without_status_says_none() {
        let error = Error::Transport {
            address:     "https://tracker.example".to_owned(),
            cause:       "connection refused".to_owned(),
            attempts:    1,
            last_status: None
        };
        assert!(error.to_string().contains("last status: None"));
    }

    #[test]
    fn field_not_found_names_the_field() {
        let error = Error::FieldNotFound {
            name: "Story Points".to_owned()
        };
        assert!(error.to_string().contains("'Story Points'"));
    }

    #[test]
    fn io_error_helper_wraps_path_and_source() {
        let path = std::path::Path::new("/tmp/report.yaml");
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = super::io_error(path, io_error);

        match error {
            Error::Io {
                path: ref stored_path,
                ref source
            } => {
                assert_eq!(stored_path, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected io error, got {other:?}")
        }
    }

    #[test]
    fn serde_yaml_conversion_maps_to_parse_variant() {
        let error = serde_yaml::from_str::<usize>("not-a-number").unwrap_err();
        let mapped: Error = error.into();
        assert!(matches!(mapped, Error::Parse { .. }));
    }

    #[test]
    fn serde_json_conversion_maps_to_decode_variant() {
        let invalid = serde_json::from_str::<serde_json::Value>("not-json").unwrap_err();
        let mapped: Error = invalid.into();
        assert!(matches!(mapped, Error::Decode { .. }));
    }

    #[test]
    fn soft_failure_display_mentions_attachment_name() {
        let failure = SoftFailure::AttachmentUpload {
            name:  "burndown.svg".to_owned(),
            cause: "timeout".to_owned()
        };
        assert_eq!(failure.to_string(), "attachment 'burndown.svg' not uploaded: timeout");
    }

    #[test]
    fn soft_failure_serializes_with_kind_tag() {
        let failure = SoftFailure::LabelsFailed {
            cause: "forbidden".to_owned()
        };
        let json = serde_json::to_string(&failure).expect("serialization failed");
        assert!(json.contains("\"kind\":\"labels_failed\""));
    }
}
