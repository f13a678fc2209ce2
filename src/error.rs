use reqwest::StatusCode;
use thiserror::Error;

/// How much of an error response body is kept for display.
pub const BODY_SNIPPET_LIMIT: usize = 300;

/// Errors from talking to the quiz API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response: timeout, DNS, refused or reset connection.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-2xx status.
    #[error("{endpoint} failed ({status}) {body}")]
    Http {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("{endpoint} returned an unexpected body: {source}")]
    MalformedBody {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid API URL: {0}")]
    Url(#[from] url::ParseError),
    /// The HTTP client could not be built, e.g. no TLS backend. Nothing was sent.
    #[error("could not set up the HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

/// Errors from the on-disk cookie store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cookie file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cookie file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("could not read roster {path}: {source}")]
    RosterIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("roster {path} is not a JSON list of pairs: {source}")]
    RosterFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("roster must contain at least one pair")]
    EmptyRoster,
    #[error("questions per pair must be at least 1")]
    NoQuestions,
}

/// Why a player's pick was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("no question is being shown")]
    NothingShown,
    #[error("time is up for this question")]
    Expired,
    #[error("answer {0} is empty")]
    EmptySlot(crate::model::types::AnswerIndex),
    /// The pick was not sent because progress could not be written to disk.
    #[error("could not store progress: {0}")]
    ProgressNotSaved(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("no identity stored, redeem an access code first")]
    NoIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevealError {
    #[error("there is no pair {pair} with question {question}")]
    OutOfRange { pair: usize, question: u32 },
}

/// Keep at most [`BODY_SNIPPET_LIMIT`] characters of a response body.
pub fn body_snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_SNIPPET_LIMIT) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
