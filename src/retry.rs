// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Retry policy with exponential backoff for provider calls.
//!
//! The policy is a bounded state machine: every attempt ends in an
//! [`AttemptOutcome`], and [`RetryConfig::advance`] maps the current
//! [`RetryState`] plus that outcome to the next state. Backoff durations are a
//! pure function of the attempt number and a jitter sample, so the whole
//! schedule can be asserted without sleeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound applied to provider-supplied `Retry-After` hints.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included (default: 4).
    pub max_attempts:     u32,
    /// Delay before the first retry in milliseconds (default: 800).
    pub initial_delay_ms: u64,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_factor:   f64,
    /// Ceiling for a computed delay in milliseconds (default: 6000).
    pub max_delay_ms:     u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts:     4,
            initial_delay_ms: 800,
            backoff_factor:   2.0,
            max_delay_ms:     6000
        }
    }
}

/// Classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A response the caller should see: 2xx, 3xx or a non-retryable 4xx.
    Final,
    /// Transient failure: connection error, timeout, 5xx or 429.
    Retryable {
        /// Status of the response, absent for transport failures.
        status:      Option<u16>,
        /// Provider hint taken from `Retry-After`.
        retry_after: Option<Duration>
    },
    /// Failure that another attempt cannot fix (malformed request and such).
    Abort
}

/// States of a single call's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is about to run.
    Attempting {
        /// Attempt about to be made.
        attempt: u32
    },
    /// Waiting `delay` after `attempt` attempts have been made.
    Backoff {
        /// Attempts made so far.
        attempt: u32,
        /// Time to wait before the next attempt.
        delay:   Duration
    },
    /// A final response was obtained.
    Succeeded {
        /// Attempts consumed.
        attempts: u32
    },
    /// No further attempt will be made.
    Exhausted {
        /// Attempts consumed.
        attempts:    u32,
        /// Status of the last response, if any.
        last_status: Option<u16>
    }
}

impl RetryState {
    /// Initial state of every call.
    pub fn start() -> Self {
        Self::Attempting {
            attempt: 1
        }
    }

    /// Returns `true` once the loop has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }
}

impl RetryConfig {
    /// Attempt ceiling, never below one.
    pub fn ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Computes the delay that follows failed attempt `attempt` (1-based).
    ///
    /// The exponential base is `initial_delay_ms * backoff_factor^(attempt-1)`
    /// capped at `max_delay_ms`. Equal jitter is applied: the result lies in
    /// `[base / 2, base]`, with `jitter` in `[0, 1)` selecting the point.
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.max(1.0).powi(exponent);
        let base = raw.min(self.max_delay_ms as f64).max(0.0);
        let jitter = jitter.clamp(0.0, 1.0);
        let millis = base / 2.0 + (base / 2.0) * jitter;
        Duration::from_millis(millis.round() as u64)
    }

    /// Moves the state machine forward after an attempt finished.
    ///
    /// `Backoff` always advances to the next `Attempting` state regardless of
    /// `outcome`; terminal states are returned unchanged.
    pub fn advance(&self, state: RetryState, outcome: AttemptOutcome, jitter: f64) -> RetryState {
        match state {
            RetryState::Attempting {
                attempt
            } => match outcome {
                AttemptOutcome::Final => RetryState::Succeeded {
                    attempts: attempt
                },
                AttemptOutcome::Abort => RetryState::Exhausted {
                    attempts:    attempt,
                    last_status: None
                },
                AttemptOutcome::Retryable {
                    status,
                    retry_after
                } => {
                    if attempt >= self.ceiling() {
                        RetryState::Exhausted {
                            attempts:    attempt,
                            last_status: status
                        }
                    } else {
                        let delay = match retry_after {
                            Some(hint) => hint.min(MAX_RETRY_AFTER),
                            None => self.backoff_delay(attempt, jitter)
                        };
                        RetryState::Backoff {
                            attempt,
                            delay
                        }
                    }
                }
            },
            RetryState::Backoff {
                attempt, ..
            } => RetryState::Attempting {
                attempt: attempt + 1
            },
            terminal => terminal
        }
    }
}

/// Classifies an HTTP status code.
///
/// 5xx and 429 are retryable; everything else is handed back to the caller.
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> AttemptOutcome {
    if status == 429 || (500..600).contains(&status) {
        AttemptOutcome::Retryable {
            status: Some(status),
            retry_after: if status == 429 { retry_after } else { None }
        }
    } else {
        AttemptOutcome::Final
    }
}

/// Parses a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values are ignored and the computed backoff applies instead.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1000.0).round() as u64))
}
