//! 领域模型错误定义
//!
//! 定义了协调核心中所有可能的业务错误，以及持久化网关的错误类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("room not found")]
    RoomNotFound,

    #[error("listing not found")]
    ListingNotFound,

    #[error("approval request not found")]
    ApprovalRequestNotFound,

    #[error("location not found")]
    LocationNotFound,

    #[error("notification not found")]
    NotificationNotFound,

    /// 既不是申请者也不是发布者
    #[error("user is not a member of the room")]
    NotARoomMember,

    #[error("only the listing owner may perform this action")]
    NotListingOwner,

    /// 申请已处于终态
    #[error("approval request already decided")]
    AlreadyDecided,

    #[error("listing has reached its capacity")]
    ListingFull,

    /// 发布已关闭，不再接受新的申请
    #[error("listing is closed for new requests")]
    ListingClosed,

    #[error("room is closed")]
    RoomClosed,
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 持久化网关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 条件写入失败（唯一键冲突或比较交换不成立）
    #[error("conflicting write")]
    Conflict,

    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
