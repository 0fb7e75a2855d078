use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(anyhow::Error),

    #[error("Invalid transition: {0}")]
    InvalidTransition(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    /// A multi-step write committed its first step but not all of the rest.
    /// `unlinked` lists the work orders still waiting to be linked to `document_id`.
    #[error(
        "Partial failure: document {document_id} was created but {count} work order(s) are not linked: {source}",
        count = .unlinked.len()
    )]
    PartialFailure {
        document_id: Uuid,
        unlinked: Vec<Uuid>,
        source: anyhow::Error,
    },

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for metrics and structured logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::NotFound(_) => "not_found",
            AppError::PartialFailure { .. } => "partial_failure",
            AppError::Conflict(_) => "conflict",
            AppError::DatabaseError(_) => "database",
            AppError::ConfigError(_) => "config",
            AppError::InternalError(_) => "internal",
        }
    }

    /// True when the caller can fix the request and try again; the store was
    /// left untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_) | AppError::InvalidTransition(_) | AppError::NotFound(_)
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_recoverable() {
        assert!(AppError::ValidationError(anyhow::anyhow!("bad")).is_recoverable());
        assert!(AppError::InvalidTransition(anyhow::anyhow!("bad")).is_recoverable());
        assert!(AppError::NotFound(anyhow::anyhow!("missing")).is_recoverable());
    }

    #[test]
    fn partial_failure_needs_reconciliation() {
        let err = AppError::PartialFailure {
            document_id: Uuid::nil(),
            unlinked: vec![Uuid::new_v4(), Uuid::new_v4()],
            source: anyhow::anyhow!("store unavailable"),
        };

        assert!(!err.is_recoverable());
        assert_eq!(err.error_type(), "partial_failure");
        assert!(err.to_string().contains("2 work order(s)"));
    }
}
