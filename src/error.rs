use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the pipeline, the editor and the external services.
///
/// Finding no text is not an error; detection returns an empty list.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("{service} service failed: {message}")]
    Service { service: String, message: String },
    #[error("{service} service blocked the request")]
    Blocked { service: String },
    #[error("{service} service timed out after {after:?}")]
    Timeout { service: String, after: Duration },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("rejected: {0}")]
    ConcurrencyGuardRejected(String),
}

impl PipelineError {
    pub fn service(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Service {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout(service: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            after,
        }
    }

    /// Blocked and timed-out calls count as service failures for callers.
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Service { .. } | Self::Blocked { .. } | Self::Timeout { .. }
        )
    }
}
