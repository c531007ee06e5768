use std::fmt;

use thiserror::Error;

/// Result type alias for bot API calls.
pub type BotResult<T> = std::result::Result<T, BotError>;

/// Coarse classification of a bot API failure.
///
/// Clients map their transport and API errors onto these classes so the poll
/// loop can pick a retry policy without knowing the client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection reset, DNS failure, timeout, rate limit, server restart.
    TransientNetwork,
    /// The API rejected the credentials.
    Authentication,
    /// The API answered with something that could not be decoded.
    MalformedResponse,
    /// Anything the client could not classify.
    Unknown,
}

impl FailureKind {
    /// Short lowercase label used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::TransientNetwork => "transient_network",
            FailureKind::Authentication => "authentication",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call against the bot API.
#[derive(Debug, Clone, Error)]
#[error("{kind} bot API failure: {message}")]
pub struct BotError {
    pub kind: FailureKind,
    pub message: String,
}

impl BotError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientNetwork, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Authentication, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}
