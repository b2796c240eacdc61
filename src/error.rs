use thiserror::Error;

/// Failures surfaced by the relay to its callers.
///
/// Each variant implies a different remediation: wrong caller credentials,
/// a shared session that needs attention, an unreachable upstream, an
/// upstream contract change, or a broken local store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Upstream refused to issue a token for the given credentials
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Shared token still rejected after one re-authentication
    #[error("upstream session expired and could not be renewed")]
    UpstreamAuthExpired,

    /// Transport failure, timeout or 5xx
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream answered with success but without the expected fields
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Credential store read/write failure
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RelayError {
    /// Stable machine readable code, used in HTTP bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidCredentials(_) => "invalid_credentials",
            RelayError::UpstreamAuthExpired => "upstream_auth_expired",
            RelayError::UpstreamUnavailable(_) => "upstream_unavailable",
            RelayError::MalformedResponse(_) => "malformed_response",
            RelayError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::UpstreamUnavailable(format!("request timed out: {}", err))
        } else {
            RelayError::UpstreamUnavailable(err.to_string())
        }
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
