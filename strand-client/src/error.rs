/// Error types for the Strand client
use thiserror::Error;
use tonic::Status;

/// Every failure a caller can observe from the client.
///
/// The type is `Clone` because one transport failure is fanned out to every
/// request still pending on the stream that broke.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Wait interrupted: {0}")]
    Interrupted(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Transaction closed: {0}")]
    TransactionClosed(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "TRANSPORT",
            ClientError::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            ClientError::Timeout(_) => "TIMEOUT",
            ClientError::Interrupted(_) => "INTERRUPTED",
            ClientError::Server(_) => "SERVER_ERROR",
            ClientError::TransactionClosed(_) => "TRANSACTION_CLOSED",
            ClientError::SessionClosed(_) => "SESSION_CLOSED",
            ClientError::UnexpectedResponse(_) => "UNEXPECTED_RESPONSE",
            ClientError::ConnectionError(_) => "CONNECTION_ERROR",
            ClientError::NotFound(_) => "NOT_FOUND",
            ClientError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ClientError::AlreadyExists(_) => "ALREADY_EXISTS",
            ClientError::Unavailable(_) => "UNAVAILABLE",
            ClientError::PermissionDenied(_) => "PERMISSION_DENIED",
            ClientError::Unimplemented(_) => "UNIMPLEMENTED",
            ClientError::InternalError(_) => "INTERNAL_ERROR",
            ClientError::Unknown(_) => "UNKNOWN",
        }
    }

    /// True for failures that only affect the local wait, not the request.
    ///
    /// After a timeout or an interruption the request is still pending on the
    /// server and the same handle can be waited on again.
    pub fn is_local_wait_failure(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::Interrupted(_))
    }

    /// Build the transport failure reported when the transaction stream breaks.
    pub(crate) fn from_stream_status(status: &Status) -> Self {
        ClientError::Transport(format!("{:?}: {}", status.code(), status.message()))
    }
}

/// Convert gRPC Status to ClientError
impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        let msg = status.message().to_string();

        match status.code() {
            tonic::Code::NotFound => ClientError::NotFound(msg),
            tonic::Code::InvalidArgument => ClientError::InvalidArgument(msg),
            tonic::Code::AlreadyExists => ClientError::AlreadyExists(msg),
            tonic::Code::Unavailable => ClientError::Unavailable(msg),
            tonic::Code::DeadlineExceeded => ClientError::Timeout(msg),
            tonic::Code::Cancelled | tonic::Code::Aborted => ClientError::Transport(msg),
            tonic::Code::Internal | tonic::Code::DataLoss => ClientError::InternalError(msg),
            tonic::Code::Unimplemented => ClientError::Unimplemented(msg),
            tonic::Code::PermissionDenied | tonic::Code::Unauthenticated => {
                ClientError::PermissionDenied(msg)
            }
            _ => ClientError::Unknown(msg),
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        ClientError::ConnectionError(err.to_string())
    }
}
