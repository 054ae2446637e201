use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors that abort a run or an offline step (setup, input, output).
///
/// Per-unit fetch problems never surface here; they are [`FetchError`]s and
/// end up as `FetchOutcome::Failure`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest Error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a single request attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("blocked (HTTP 403)")]
    Blocked,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Which backoff band a failed attempt waits in before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffClass {
    RateLimited,
    Blocked,
    Network,
    Status,
    Malformed,
}

impl FetchError {
    pub fn backoff_class(&self) -> BackoffClass {
        match self {
            FetchError::TransientNetwork(_) => BackoffClass::Network,
            FetchError::RateLimited => BackoffClass::RateLimited,
            FetchError::Blocked => BackoffClass::Blocked,
            FetchError::Status(_) => BackoffClass::Status,
            FetchError::MalformedResponse(_) => BackoffClass::Malformed,
        }
    }

    /// Maps a non-success status code onto the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FetchError::RateLimited,
            403 => FetchError::Blocked,
            other => FetchError::Status(other),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16())
        } else {
            FetchError::TransientNetwork(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::MalformedResponse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_backoff_bands() {
        assert_eq!(FetchError::from_status(429).backoff_class(), BackoffClass::RateLimited);
        assert_eq!(FetchError::from_status(403).backoff_class(), BackoffClass::Blocked);
        assert_eq!(FetchError::from_status(500).backoff_class(), BackoffClass::Status);
        assert_eq!(FetchError::from_status(404), FetchError::Status(404));
    }

    #[test]
    fn bad_json_is_malformed() {
        let err: FetchError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.backoff_class(), BackoffClass::Malformed);
    }
}
