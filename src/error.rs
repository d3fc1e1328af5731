use std::time::Duration;

use thiserror::Error;

/// Startup configuration failures. These are the only errors allowed to stop
/// the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (env {env})")]
    Missing { key: &'static str, env: &'static str },

    #[error("set CF_USER/CF_PASSWORD or CF_CLIENT/CF_SECRET")]
    MissingPlatformCredentials,

    #[error("invalid URL for `{key}`: {value}")]
    InvalidUrl {
        key: String,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("rule file {path}: {reason}")]
    InvalidRules { path: String, reason: String },
}

/// A collaborator (inventory, metrics backend) could not be reached or
/// answered with something unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("authentication against {endpoint} failed: {reason}")]
    Auth { endpoint: String, reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("{0}")]
    Other(String),
}

/// Evaluation of a single rule against a single instance failed. The rule is
/// skipped for that instance; siblings keep running.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("error rendering {what} template: {reason}")]
    Template { what: &'static str, reason: String },

    #[error("threshold `{0}` is not an integer")]
    NonNumericThreshold(String),

    #[error("metric query did not return a vector (got {0})")]
    NotAVector(String),

    #[error("sample value {0} is not finite")]
    NonFiniteSample(f64),

    #[error("error querying metrics: {0}")]
    Query(#[from] FetchError),
}

/// Run `fut`, failing with [`FetchError::Timeout`] if it does not finish
/// within `timeout`.
pub async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T, FetchError>
where
    F: std::future::Future<Output = Result<T, FetchError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}
