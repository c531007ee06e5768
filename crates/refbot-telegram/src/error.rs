use refbot_proto::{BotError, FailureKind};
use teloxide::{ApiError, RequestError};

/// Classify a teloxide request failure for the retry policy.
pub fn classify_request_error(err: &RequestError) -> FailureKind {
    match err {
        RequestError::Api(ApiError::InvalidToken) => FailureKind::Authentication,
        RequestError::Api(_) => FailureKind::Unknown,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_) => {
            FailureKind::TransientNetwork
        }
        RequestError::InvalidJson { .. } => FailureKind::MalformedResponse,
        _ => FailureKind::Unknown,
    }
}

/// Convert a teloxide request failure into a [`BotError`].
pub fn to_bot_error(err: RequestError) -> BotError {
    BotError::new(classify_request_error(&err), err.to_string())
}
