// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client wrapping reqwest.
//!
//! Retries on 429/500/502/503/504 and on connection errors with
//! exponential backoff; a 429 honors `Retry-After`.

use reqwest::header::HeaderMap;
use serde::Serialize;
use std::time::Duration;

/// Statuses worth retrying.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Longest body excerpt carried in a status error.
const BODY_EXCERPT: usize = 200;

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Retry budget for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one.
    pub backoff_base: Duration,
    /// Cap on a server-provided `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Transport-level failures, after retries.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status} on all {attempts} attempts")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// HTTP client for the API source.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client with fixed default headers and a per-request timeout.
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        default_headers: HeaderMap,
        retry: RetryPolicy,
    ) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .default_headers(default_headers)
            .build()?;

        Ok(Self { client, retry })
    }

    /// POST a JSON body, retrying transient failures.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<HttpResponse, HttpError> {
        let mut retries = 0u32;

        loop {
            let resp = self.client.post(url).json(body).send().await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if RETRYABLE_STATUSES.contains(&status) {
                        if retries >= self.retry.max_retries {
                            return Err(HttpError::RetriesExhausted {
                                status,
                                attempts: retries + 1,
                            });
                        }
                        retries += 1;

                        let delay = if status == 429 {
                            r.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|s| s.trim().parse::<u64>().ok())
                                .map(|secs| Duration::from_secs(secs).min(self.retry.max_retry_after))
                                .unwrap_or_else(|| self.retry.backoff(retries))
                        } else {
                            self.retry.backoff(retries)
                        };
                        tracing::warn!(
                            "{url} answered {status}, retry {retries}/{} in {delay:?}",
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let body = r.text().await?;

                    if !(200..300).contains(&status) {
                        return Err(HttpError::Status {
                            status,
                            body: body.chars().take(BODY_EXCERPT).collect(),
                        });
                    }

                    return Ok(HttpResponse {
                        status,
                        body,
                    });
                }
                Err(e) => {
                    if retries < self.retry.max_retries {
                        retries += 1;
                        let delay = self.retry.backoff(retries);
                        tracing::warn!(
                            "request to {url} failed ({e}), retry {retries}/{} in {delay:?}",
                            self.retry.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}
