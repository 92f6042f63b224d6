//! Error abstractions.

use thiserror::Error;
use tonic::Status;

// Error messages.
pub const ERR_ITER_FAILURE: &str = "error returned during key/value iteration from database";
pub const ERR_DB_FLUSH: &str = "error flushing database state";

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// The caller is unauthorized to perform the requested action.
    #[error("unauthorized to perform the requested action")]
    Unauthorized,
    /// The caller does not have permission on the owning project.
    #[error("permission denied for the owning project")]
    PermissionDenied,
    /// The given input was invalid.
    #[error("validation error: {0}")]
    InvalidInput(String),
    /// The targeted resource was not found.
    #[error("the targeted resource was not found")]
    ResourceNotFound,
    /// The requested operation can not be performed in the system's current state.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    /// A storage serialization conflict which was not resolved within the retry budget.
    ///
    /// Callers may retry the corresponding operation.
    #[allow(dead_code)]
    #[error("transaction conflict, the operation may be retried")]
    Conflict,
    /// The server has hit an internal error, but will remain online.
    #[error("internal server error")]
    Ise(anyhow::Error),
}

impl AppError {
    /// Get the gRPC status code and message for this error.
    pub fn into_status(self) -> Status {
        match self {
            AppError::Unauthorized => Status::unauthenticated(self.to_string()),
            AppError::PermissionDenied => Status::permission_denied(self.to_string()),
            AppError::InvalidInput(_) => Status::invalid_argument(self.to_string()),
            AppError::ResourceNotFound => Status::not_found(self.to_string()),
            AppError::FailedPrecondition(_) => Status::failed_precondition(self.to_string()),
            AppError::Conflict => Status::aborted(self.to_string()),
            AppError::Ise(_) => Status::internal(self.to_string()),
        }
    }

    /// Translate the given error as an app error and map into a gRPC status object.
    pub fn grpc(err: anyhow::Error) -> Status {
        err.downcast::<tonic::Status>()
            .or_else(|err| err.downcast::<Self>().map(Self::into_status))
            .unwrap_or_else(|err| Self::Ise(err).into_status())
    }
}

/// The error type used to indicate that a system shutdown is required.
#[derive(Debug, thiserror::Error)]
#[error("fatal error: {0}")]
pub struct ShutdownError(#[from] pub anyhow::Error);

/// A result type where the error is a `ShutdownError`.
pub type ShutdownResult<T> = ::std::result::Result<T, ShutdownError>;

/// A result type used with the gRPC system.
pub type RpcResult<T> = ::std::result::Result<T, tonic::Status>;
