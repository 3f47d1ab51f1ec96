//! 房间注册表
//!
//! 为 (发布, 申请者) 解析或创建唯一的 ACTIVE 房间，并校验成员身份。

use std::sync::Arc;

use domain::{
    ApprovalRepository, ApprovalStatus, ChatRoom, ChatRoomRepository, DomainError, ListingId,
    ListingRepository, MessageRepository, NotificationCategory, RoomId, RoomInsertOutcome,
    Timestamp, UserId,
};

use crate::{
    clock::Clock,
    dto::{ListingDto, RoomDetailDto, RoomSummaryDto},
    error::ApplicationError,
    services::notification_fanout::{NotificationFanout, NotifyRequest},
};

pub struct RoomRegistryDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub listing_repository: Arc<dyn ListingRepository>,
    pub approval_repository: Arc<dyn ApprovalRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub notifications: Arc<NotificationFanout>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoomRegistry {
    deps: RoomRegistryDependencies,
}

impl RoomRegistry {
    pub fn new(deps: RoomRegistryDependencies) -> Self {
        Self { deps }
    }

    /// 返回该申请者在该发布下唯一的 ACTIVE 房间，不存在则创建。
    ///
    /// 并发创建时条件插入只会成功一次，其余调用拿到同一个房间。
    pub async fn resolve_or_create(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> Result<ChatRoom, ApplicationError> {
        if let Some(room) = self
            .deps
            .room_repository
            .find_active_by_pair(listing_id, requester_id)
            .await?
        {
            return Ok(room);
        }

        let listing = self
            .deps
            .listing_repository
            .find_by_id(listing_id)
            .await?
            .ok_or(DomainError::ListingNotFound)?;

        if listing.is_owned_by(requester_id) {
            return Err(DomainError::invalid_argument(
                "listing_id",
                "cannot open a chat room on your own listing",
            )
            .into());
        }

        // 已关闭的发布只对已获批准的申请者开放
        if !listing.visible {
            let approved = self
                .deps
                .approval_repository
                .find(listing_id, requester_id)
                .await?
                .is_some_and(|request| request.status == ApprovalStatus::Approved);
            if !approved {
                return Err(DomainError::ListingClosed.into());
            }
        }

        let room = ChatRoom::open(
            RoomId::generate(),
            listing_id,
            requester_id,
            listing.owner_id,
            self.deps.clock.now(),
        )?;

        match self.deps.room_repository.insert_if_absent(room).await? {
            RoomInsertOutcome::Created(room) => {
                tracing::info!(
                    room_id = %room.id,
                    listing_id = %listing_id,
                    requester_id = %requester_id,
                    "聊天室已创建"
                );
                self.deps
                    .notifications
                    .notify_quietly(NotifyRequest {
                        recipient_id: room.counterparty_id,
                        message: format!("A new chat room was opened for \"{}\"", listing.title),
                        category: NotificationCategory::RoomCreated,
                        related_room_id: Some(room.id),
                        related_listing_id: Some(listing_id),
                    })
                    .await;
                Ok(room)
            }
            RoomInsertOutcome::Existing(room) => {
                tracing::debug!(room_id = %room.id, "并发创建已由已有房间解决");
                Ok(room)
            }
        }
    }

    /// 身份必须是房间的申请者或发布者
    pub async fn authorize_member(
        &self,
        room_id: RoomId,
        identity: UserId,
    ) -> Result<ChatRoom, ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        if !room.is_member(identity) {
            return Err(DomainError::NotARoomMember.into());
        }
        Ok(room)
    }

    pub async fn find(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    pub async fn find_active(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> Result<Option<ChatRoom>, ApplicationError> {
        Ok(self
            .deps
            .room_repository
            .find_active_by_pair(listing_id, requester_id)
            .await?)
    }

    /// 用户参与的房间，按最近活动倒序
    pub async fn list_rooms(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> Result<Vec<RoomSummaryDto>, ApplicationError> {
        let mut rooms = self
            .deps
            .room_repository
            .list_for_user(user_id, active_only)
            .await?;
        rooms.sort_by(|a, b| {
            let a_at = a.last_message_at.unwrap_or(a.created_at);
            let b_at = b.last_message_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at)
        });

        let mut summaries = Vec::with_capacity(rooms.len());
        for room in &rooms {
            summaries.push(self.summarize(room, user_id).await?);
        }
        Ok(summaries)
    }

    pub async fn summarize(
        &self,
        room: &ChatRoom,
        viewer: UserId,
    ) -> Result<RoomSummaryDto, ApplicationError> {
        let unread = self
            .deps
            .message_repository
            .count_unread(room.id, viewer)
            .await?;
        Ok(RoomSummaryDto::from_room(room, unread))
    }

    pub async fn room_detail(
        &self,
        room_id: RoomId,
        viewer: UserId,
    ) -> Result<RoomDetailDto, ApplicationError> {
        let room = self.authorize_member(room_id, viewer).await?;
        let listing = self
            .deps
            .listing_repository
            .find_by_id(room.listing_id)
            .await?;
        let approval = self
            .deps
            .approval_repository
            .find(room.listing_id, room.requester_id)
            .await?;

        Ok(RoomDetailDto {
            room: self.summarize(&room, viewer).await?,
            listing: listing.as_ref().map(ListingDto::from),
            approval_status: approval.map(|request| request.status),
        })
    }

    pub async fn record_activity(
        &self,
        room_id: RoomId,
        summary: String,
        at: Timestamp,
    ) -> Result<(), ApplicationError> {
        self.deps
            .room_repository
            .record_activity(room_id, summary, at)
            .await?;
        Ok(())
    }

    pub async fn close(&self, room_id: RoomId) -> Result<(), ApplicationError> {
        self.deps
            .room_repository
            .close(room_id, self.deps.clock.now())
            .await?;
        tracing::info!(room_id = %room_id, "聊天室已关闭");
        Ok(())
    }
}
