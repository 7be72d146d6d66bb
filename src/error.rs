use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Slack error codes that mean the credential itself is unusable.
const UNAUTHORIZED_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "missing_scope",
    "not_allowed_token_type",
];

/// A single failed call against the remote API, before the gateway decides
/// whether to retry it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("not found: {code}")]
    NotFound { code: String },

    #[error("unauthorized: {code}")]
    Unauthorized { code: String },

    #[error("Slack API error: {code}")]
    Api { code: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ApiFailure {
    /// Classify a Slack `error` code string.
    pub fn from_code(code: &str) -> Self {
        if UNAUTHORIZED_CODES.contains(&code) {
            ApiFailure::Unauthorized {
                code: code.to_string(),
            }
        } else if code.ends_with("_not_found") || code == "no_such_subteam" {
            ApiFailure::NotFound {
                code: code.to_string(),
            }
        } else if code == "ratelimited" {
            ApiFailure::RateLimited { retry_after: None }
        } else {
            ApiFailure::Api {
                code: code.to_string(),
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiFailure::RateLimited { .. } | ApiFailure::Transport(_)
        )
    }
}

/// A gateway call that failed for good, tagged with the endpoint and the
/// cursor of the page that was being requested.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{endpoint} failed (cursor {cursor:?}): {failure}")]
    Request {
        endpoint: &'static str,
        cursor: Option<String>,
        failure: ApiFailure,
    },

    #[error("{endpoint} still rate limited after {attempts} attempts (cursor {cursor:?})")]
    RateLimitExhausted {
        endpoint: &'static str,
        cursor: Option<String>,
        attempts: u32,
    },
}

impl GatewayError {
    pub fn endpoint(&self) -> &'static str {
        match self {
            GatewayError::Request { endpoint, .. }
            | GatewayError::RateLimitExhausted { endpoint, .. } => endpoint,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        match self {
            GatewayError::Request { cursor, .. }
            | GatewayError::RateLimitExhausted { cursor, .. } => cursor.as_deref(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Request { failure, .. } => failure.is_retryable(),
            GatewayError::RateLimitExhausted { .. } => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::Request {
                failure: ApiFailure::NotFound { .. },
                ..
            }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            GatewayError::Request {
                failure: ApiFailure::Unauthorized { .. },
                ..
            }
        )
    }
}

/// Pipeline stage an export aborted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    History,
    Resolution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::History => f.write_str("history fetch"),
            Stage::Resolution => f.write_str("name resolution"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("SLACK_TOKEN environment variable not set")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid date format: {0}")]
    InvalidDate(String),

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("export failed during {stage} after {messages_fetched} messages: {source}")]
    Export {
        stage: Stage,
        messages_fetched: usize,
        cursor: Option<String>,
        #[source]
        source: GatewayError,
    },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("invalid output format: {0}")]
    InvalidFormat(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
