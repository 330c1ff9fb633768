use axum::http::StatusCode;

use crate::llm::LlmError;

/// Failures an assist request can end in. Each one is rendered into the
/// endpoint's own JSON envelope with an empty result field.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("{0}")]
    Validation(String),
    #[error("Too many requests. Please wait a minute and try again.")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("AI assistance is not configured on this server.")]
    NotConfigured,
    #[error("The AI service failed to respond. Please try again.")]
    Upstream(#[source] LlmError),
}

impl AssistError {
    pub fn status(&self) -> StatusCode {
        match self {
            AssistError::Validation(_) => StatusCode::BAD_REQUEST,
            AssistError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AssistError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AssistError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AssistError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistError::Validation(_) => "validation",
            AssistError::RateLimited { .. } => "rate_limited",
            AssistError::PayloadTooLarge(_) => "too_large",
            AssistError::NotConfigured => "not_configured",
            AssistError::Upstream(_) => "upstream",
        }
    }
}

impl From<LlmError> for AssistError {
    fn from(err: LlmError) -> Self {
        AssistError::Upstream(err)
    }
}
