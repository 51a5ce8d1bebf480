/// Failure taxonomy shared by every registry.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Caller-supplied data breaks an invariant. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The record's current state no longer allows the transition.
    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Permission(String),

    /// Storage failure; usually transient.
    #[error(transparent)]
    Store(anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }
}

/// Domain errors raised inside a store transaction travel through `anyhow`;
/// recover them here instead of flattening everything into `Store`.
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service) => service,
            Err(other) => Self::Store(other),
        }
    }
}
