//! 持久化网关的调用契约
//!
//! 单行操作的原子性由存储保证；跨实体的不变量（按容量审批）由应用层负责串行化。

use futures::future::BoxFuture;

use crate::approval::ApprovalRequest;
use crate::chat_room::{ChatRoom, RoomInsertOutcome};
use crate::errors::RepositoryError;
use crate::listing::Listing;
use crate::location::{LocationPing, NewLocationPing};
use crate::message::{Message, NewMessage, Page};
use crate::notification::{NewNotification, Notification};
use crate::value_objects::{ListingId, NotificationId, RoomId, Timestamp, UserId};

pub type RepositoryResult<T> = Result<T, RepositoryError>;
pub type RepositoryFuture<T> = BoxFuture<'static, RepositoryResult<T>>;

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait ChatRoomRepository: Send + Sync {
    fn find_by_id(&self, id: RoomId) -> RepositoryFuture<Option<ChatRoom>>;
    fn find_active_by_pair(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ChatRoom>>;
    /// 以 (listing_id, requester_id) 为键的条件插入；键已存在时返回已有的 ACTIVE 房间。
    fn insert_if_absent(&self, room: ChatRoom) -> RepositoryFuture<RoomInsertOutcome>;
    /// 只更新摘要与时间，不触碰状态
    fn record_activity(
        &self,
        id: RoomId,
        summary: String,
        at: Timestamp,
    ) -> RepositoryFuture<()>;
    fn close(&self, id: RoomId, at: Timestamp) -> RepositoryFuture<()>;
    fn list_for_user(&self, user_id: UserId, active_only: bool)
        -> RepositoryFuture<Vec<ChatRoom>>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait MessageRepository: Send + Sync {
    fn append(&self, message: NewMessage) -> RepositoryFuture<Message>;
    /// 按 created_at 升序返回
    fn list_by_room(&self, room_id: RoomId, page: Option<Page>) -> RepositoryFuture<Vec<Message>>;
    fn latest_created_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>>;
    /// 将房间内非 reader 发送的消息标记为已读，返回新增的已读记录数
    fn mark_read(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64>;
    fn count_unread(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait ListingRepository: Send + Sync {
    fn find_by_id(&self, id: ListingId) -> RepositoryFuture<Option<Listing>>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait ApprovalRepository: Send + Sync {
    fn find(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ApprovalRequest>>;
    /// 返回 (申请, 是否新建)
    fn create_if_absent(&self, request: ApprovalRequest)
        -> RepositoryFuture<(ApprovalRequest, bool)>;
    /// 在同一事务内写入 APPROVED 状态与发布的参与人数/可见性。
    ///
    /// 申请必须仍为 PENDING 且发布的参与人数仍为 `expected_participants`，否则返回 `Conflict`。
    fn commit_approval(
        &self,
        request: ApprovalRequest,
        listing: Listing,
        expected_participants: u32,
    ) -> RepositoryFuture<()>;
    fn commit_rejection(&self, request: ApprovalRequest) -> RepositoryFuture<()>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait LocationRepository: Send + Sync {
    fn append(&self, ping: NewLocationPing) -> RepositoryFuture<LocationPing>;
    fn latest_per_sender(&self, room_id: RoomId) -> RepositoryFuture<Vec<LocationPing>>;
    fn latest_for(
        &self,
        room_id: RoomId,
        sender_id: UserId,
    ) -> RepositoryFuture<Option<LocationPing>>;
    fn latest_captured_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
pub trait NotificationRepository: Send + Sync {
    fn insert(&self, notification: NewNotification) -> RepositoryFuture<Notification>;
    /// 按创建时间倒序
    fn list_for_recipient(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> RepositoryFuture<Vec<Notification>>;
    /// 通知不存在或不属于 recipient 时返回 false
    fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> RepositoryFuture<bool>;
}
