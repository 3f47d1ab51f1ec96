use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::{broadcaster::BroadcastError, session::AuthError};

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    /// HTTP 风格的状态码，控制面和实时帧的错误回复共用
    pub fn status_code(&self) -> u16 {
        match self {
            ApplicationError::Authentication(AuthError::Issue(_)) => 500,
            ApplicationError::Authentication(_) => 401,
            ApplicationError::Domain(err) => match err {
                DomainError::NotARoomMember | DomainError::NotListingOwner => 403,
                DomainError::RoomNotFound
                | DomainError::ListingNotFound
                | DomainError::ApprovalRequestNotFound
                | DomainError::LocationNotFound
                | DomainError::NotificationNotFound => 404,
                DomainError::InvalidArgument { .. }
                | DomainError::AlreadyDecided
                | DomainError::ListingFull
                | DomainError::ListingClosed
                | DomainError::RoomClosed => 400,
            },
            ApplicationError::Repository(RepositoryError::NotFound) => 404,
            ApplicationError::Repository(_)
            | ApplicationError::Broadcast(_)
            | ApplicationError::Infrastructure(_) => 500,
        }
    }

    /// 机器可读的错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            ApplicationError::Authentication(AuthError::Missing) => "MISSING_CREDENTIAL",
            ApplicationError::Authentication(AuthError::Revoked) => "REVOKED_CREDENTIAL",
            ApplicationError::Authentication(AuthError::Invalid(_)) => "INVALID_CREDENTIAL",
            ApplicationError::Authentication(AuthError::Issue(_)) => "CREDENTIAL_ISSUE_FAILED",
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } => "INVALID_ARGUMENT",
                DomainError::RoomNotFound => "ROOM_NOT_FOUND",
                DomainError::ListingNotFound => "LISTING_NOT_FOUND",
                DomainError::ApprovalRequestNotFound => "REQUEST_NOT_FOUND",
                DomainError::LocationNotFound => "LOCATION_NOT_FOUND",
                DomainError::NotificationNotFound => "NOTIFICATION_NOT_FOUND",
                DomainError::NotARoomMember => "NOT_ROOM_MEMBER",
                DomainError::NotListingOwner => "NOT_LISTING_OWNER",
                DomainError::AlreadyDecided => "ALREADY_DECIDED",
                DomainError::ListingFull => "LISTING_FULL",
                DomainError::ListingClosed => "LISTING_CLOSED",
                DomainError::RoomClosed => "ROOM_CLOSED",
            },
            ApplicationError::Repository(RepositoryError::NotFound) => "NOT_FOUND",
            ApplicationError::Repository(_) => "DATABASE_ERROR",
            ApplicationError::Broadcast(_) => "BROADCAST_ERROR",
            ApplicationError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
