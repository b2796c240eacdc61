use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use http::header::{ACCEPT, AUTHORIZATION};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::upstream::UpstreamConfig;
use crate::error::{RelayError, RelayResult};
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::upstream::dto::{GradesResponse, SessionRequest, SessionResponse};
use crate::upstream::{Credentials, FetchOutcome, Upstream};

static AUTHENTICATE_MSG: &str = "authenticate";
static FETCH_MSG: &str = "fetch";

/// reqwest-backed portal client
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    sessions_url: Url,
    grades_url: Url,
}

impl HttpUpstream {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &cfg.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid upstream header name '{}'", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid upstream header value for '{}'", name))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("building upstream HTTP client")?;

        let sessions_url = join_url(&cfg.base_url, &cfg.sessions_path)?;
        let mut grades_url = join_url(&cfg.base_url, &cfg.grades_path)?;
        if !cfg.query.is_empty() {
            let mut params: Vec<(&String, &String)> = cfg.query.iter().collect();
            params.sort();
            grades_url.query_pairs_mut().extend_pairs(params);
        }

        Ok(Self {
            client,
            sessions_url,
            grades_url,
        })
    }

    async fn send_authenticate(&self, credentials: &Credentials) -> RelayResult<String> {
        let response = self
            .client
            .post(self.sessions_url.clone())
            .json(&SessionRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RelayError::UpstreamUnavailable(format!(
                "authenticate returned {}",
                status
            )));
        }
        if status.is_client_error() {
            warn!(status = %status, username = %credentials.username, "authenticate rejected");
            return Err(RelayError::InvalidCredentials(format!(
                "upstream rejected credentials for '{}' with {}",
                credentials.username, status
            )));
        }
        let body = response.text().await?;

        let parsed: SessionResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) if status.is_success() => {
                return Err(RelayError::MalformedResponse(format!(
                    "authenticate body is not JSON: {}",
                    err
                )))
            }
            Err(_) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "authenticate returned {}",
                    status
                )))
            }
        };

        parsed.token().ok_or_else(|| {
            warn!(status = %status, username = %credentials.username, "no token in authenticate response");
            RelayError::InvalidCredentials(format!(
                "upstream issued no token for '{}'",
                credentials.username
            ))
        })
    }

    async fn send_fetch(&self, token: &str) -> RelayResult<FetchOutcome> {
        let response = self
            .client
            .get(self.grades_url.clone())
            .header(AUTHORIZATION, format!("Token token={}", token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(FetchOutcome::NotAuthenticated);
        }
        if status.is_server_error() {
            return Err(RelayError::UpstreamUnavailable(format!(
                "fetch returned {}",
                status
            )));
        }
        let body = response.text().await?;

        let parsed: GradesResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) if status.is_success() => {
                return Ok(FetchOutcome::MalformedResponse(format!(
                    "grades body is not JSON: {}",
                    err
                )))
            }
            Err(_) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "fetch returned {}",
                    status
                )))
            }
        };

        if parsed.is_not_logged_in() {
            return Ok(FetchOutcome::NotAuthenticated);
        }
        if !status.is_success() {
            return Err(RelayError::UpstreamUnavailable(format!(
                "fetch returned {}",
                status
            )));
        }

        Ok(match parsed.grades {
            Some(records) => FetchOutcome::Success(records),
            None => FetchOutcome::MalformedResponse("grades field missing".to_string()),
        })
    }
}

impl Upstream for HttpUpstream {
    async fn authenticate(&self, credentials: &Credentials) -> RelayResult<String> {
        let metrics = get_metrics().await;
        let start = get_instant();
        metrics.upstream_requests.with_label_values(&[AUTHENTICATE_MSG]).inc();

        let result = self.send_authenticate(credentials).await;

        metrics
            .upstream_duration
            .with_label_values(&[AUTHENTICATE_MSG])
            .observe(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            metrics
                .upstream_failures
                .with_label_values(&[AUTHENTICATE_MSG, err.code()])
                .inc();
        }
        debug!(url = %self.sessions_url, ok = result.is_ok(), "authenticate finished");
        result
    }

    async fn fetch(&self, token: &str) -> RelayResult<FetchOutcome> {
        let metrics = get_metrics().await;
        let start = get_instant();
        metrics.upstream_requests.with_label_values(&[FETCH_MSG]).inc();

        let result = self.send_fetch(token).await;

        metrics
            .upstream_duration
            .with_label_values(&[FETCH_MSG])
            .observe(start.elapsed().as_secs_f64());
        let failure = match &result {
            Ok(FetchOutcome::Success(_)) => None,
            Ok(FetchOutcome::NotAuthenticated) => Some("not_authenticated"),
            Ok(FetchOutcome::MalformedResponse(_)) => Some("malformed_response"),
            Err(err) => Some(err.code()),
        };
        if let Some(reason) = failure {
            metrics
                .upstream_failures
                .with_label_values(&[FETCH_MSG, reason])
                .inc();
        }
        debug!(url = %self.grades_url, outcome = failure.unwrap_or("success"), "fetch finished");
        result
    }
}

/// `base` may carry a path prefix (`https://host/api`); `path` is appended to it.
fn join_url(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|err| anyhow!("invalid upstream url '{}': {}", joined, err))
}
