use thiserror::Error;

use crate::form::schema::ValidationErrors;

/// Errors raised by line collection edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line {index} does not exist (document has {len} lines)")]
    OutOfRange { index: usize, len: usize },

    #[error("a document needs at least {min} line(s)")]
    LastLine { min: usize },
}

/// Persistence failure carrying a reason that can be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PersistError {
    pub reason: String,
}

impl PersistError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a rejected submission attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("a submission is already in flight")]
    InFlight,

    #[error("document was already submitted")]
    AlreadySubmitted,

    #[error("document is invalid: {0}")]
    Invalid(ValidationErrors),

    #[error("could not save document: {0}")]
    Persist(#[from] PersistError),
}

/// Reference-data fetch failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request for {resource} failed: {source}")]
    Http {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} returned status {status}")]
    Status { resource: String, status: u16 },

    #[error("{resource} response has no `{key}` collection")]
    Envelope { resource: String, key: String },
}

/// Tax-rate lookup failures.
#[derive(Debug, Error)]
pub enum TaxLookupError {
    #[error("tax lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tax lookup returned status {0}")]
    Status(u16),
}

/// Assistant transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    #[error("could not reach the assistant: {0}")]
    Connection(String),

    #[error("assistant error: {message}")]
    Server { message: String, retryable: bool },

    #[error("unexpected assistant response: {0}")]
    Decode(String),
}

impl AssistantError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AssistantError::Connection(_) => true,
            AssistantError::Server { retryable, .. } => *retryable,
            AssistantError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AssistantError::Decode(err.to_string())
        } else {
            AssistantError::Connection(err.to_string())
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
