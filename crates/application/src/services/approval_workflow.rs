//! 加入申请审批
//!
//! PENDING → APPROVED | REJECTED。同一发布上的审批在临界区内串行执行，
//! 状态写入、参与人数加一与可见性翻转在一次存储提交中完成。

use std::sync::Arc;

use domain::{
    ApprovalRepository, ApprovalRequest, DomainError, Listing, ListingId, ListingRepository,
    NotificationCategory, RoomId, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    services::{
        keyed_lock::KeyedLocks,
        notification_fanout::{NotificationFanout, NotifyRequest},
        room_registry::RoomRegistry,
    },
};

pub struct ApprovalWorkflowDependencies {
    pub listing_repository: Arc<dyn ListingRepository>,
    pub approval_repository: Arc<dyn ApprovalRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub notifications: Arc<NotificationFanout>,
    pub clock: Arc<dyn Clock>,
}

/// 审批结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub request: ApprovalRequest,
    pub listing: Listing,
}

pub struct ApprovalWorkflow {
    deps: ApprovalWorkflowDependencies,
    listing_locks: KeyedLocks<ListingId>,
}

impl ApprovalWorkflow {
    pub fn new(deps: ApprovalWorkflowDependencies) -> Self {
        Self {
            deps,
            listing_locks: KeyedLocks::new(),
        }
    }

    /// 创建 PENDING 申请；已存在时原样返回
    pub async fn request_join(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let listing = self.load_listing(listing_id).await?;
        if listing.is_owned_by(requester_id) {
            return Err(DomainError::invalid_argument(
                "listing_id",
                "cannot request to join your own listing",
            )
            .into());
        }

        if let Some(existing) = self
            .deps
            .approval_repository
            .find(listing_id, requester_id)
            .await?
        {
            return Ok(existing);
        }

        if !listing.accepts_requests() {
            return Err(DomainError::ListingClosed.into());
        }

        let (request, created) = self
            .deps
            .approval_repository
            .create_if_absent(ApprovalRequest::pending(
                listing_id,
                requester_id,
                self.deps.clock.now(),
            ))
            .await?;

        if created {
            tracing::info!(listing_id = %listing_id, requester_id = %requester_id, "收到加入申请");
            self.deps
                .notifications
                .notify_quietly(NotifyRequest {
                    recipient_id: listing.owner_id,
                    message: format!("New join request for \"{}\"", listing.title),
                    category: NotificationCategory::JoinRequested,
                    related_room_id: None,
                    related_listing_id: Some(listing_id),
                })
                .await;
        }
        Ok(request)
    }

    /// 批准申请。容量已满时返回 `ListingFull`，申请保持 PENDING。
    pub async fn approve(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
        acting_id: UserId,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let outcome = {
            let _guard = self.listing_locks.lock(listing_id).await;

            let mut listing = self.load_listing(listing_id).await?;
            if !listing.is_owned_by(acting_id) {
                return Err(DomainError::NotListingOwner.into());
            }
            let mut request = self.load_request(listing_id, requester_id).await?;
            if !request.is_pending() {
                return Err(DomainError::AlreadyDecided.into());
            }

            let expected_participants = listing.participants;
            listing.admit_participant()?;
            request.approve(acting_id, self.deps.clock.now())?;

            self.deps
                .approval_repository
                .commit_approval(request.clone(), listing.clone(), expected_participants)
                .await?;

            ApprovalOutcome { request, listing }
        };

        tracing::info!(
            listing_id = %listing_id,
            requester_id = %requester_id,
            participants = outcome.listing.participants,
            capacity = outcome.listing.capacity,
            visible = outcome.listing.visible,
            "加入申请已批准"
        );

        let room_id = self.active_room_id(listing_id, requester_id).await;
        self.deps
            .notifications
            .notify_quietly(NotifyRequest {
                recipient_id: requester_id,
                message: format!("Your request for \"{}\" was approved", outcome.listing.title),
                category: NotificationCategory::JoinApproved,
                related_room_id: room_id,
                related_listing_id: Some(listing_id),
            })
            .await;

        Ok(outcome)
    }

    /// 拒绝申请：不影响参与人数，关闭申请者的房间
    pub async fn reject(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
        acting_id: UserId,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let (request, listing) = {
            let _guard = self.listing_locks.lock(listing_id).await;

            let listing = self.load_listing(listing_id).await?;
            if !listing.is_owned_by(acting_id) {
                return Err(DomainError::NotListingOwner.into());
            }
            let mut request = self.load_request(listing_id, requester_id).await?;
            request.reject(acting_id, self.deps.clock.now())?;

            self.deps
                .approval_repository
                .commit_rejection(request.clone())
                .await?;
            (request, listing)
        };

        tracing::info!(listing_id = %listing_id, requester_id = %requester_id, "加入申请已拒绝");

        let room_id = self.active_room_id(listing_id, requester_id).await;
        if let Some(room_id) = room_id {
            if let Err(err) = self.deps.rooms.close(room_id).await {
                tracing::warn!(room_id = %room_id, error = %err, "拒绝后关闭聊天室失败");
            }
        }

        self.deps
            .notifications
            .notify_quietly(NotifyRequest {
                recipient_id: requester_id,
                message: format!("Your request for \"{}\" was declined", listing.title),
                category: NotificationCategory::JoinRejected,
                related_room_id: room_id,
                related_listing_id: Some(listing_id),
            })
            .await;

        Ok(request)
    }

    /// 控制面入口：按房间定位申请
    pub async fn approve_for_room(
        &self,
        room_id: RoomId,
        acting_id: UserId,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        let room = self.deps.rooms.find(room_id).await?;
        self.approve(room.listing_id, room.requester_id, acting_id)
            .await
    }

    pub async fn reject_for_room(
        &self,
        room_id: RoomId,
        acting_id: UserId,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let room = self.deps.rooms.find(room_id).await?;
        self.reject(room.listing_id, room.requester_id, acting_id)
            .await
    }

    async fn load_listing(&self, listing_id: ListingId) -> Result<Listing, ApplicationError> {
        self.deps
            .listing_repository
            .find_by_id(listing_id)
            .await?
            .ok_or_else(|| DomainError::ListingNotFound.into())
    }

    async fn load_request(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> Result<ApprovalRequest, ApplicationError> {
        self.deps
            .approval_repository
            .find(listing_id, requester_id)
            .await?
            .ok_or_else(|| DomainError::ApprovalRequestNotFound.into())
    }

    async fn active_room_id(&self, listing_id: ListingId, requester_id: UserId) -> Option<RoomId> {
        match self.deps.rooms.find_active(listing_id, requester_id).await {
            Ok(room) => room.map(|room| room.id),
            Err(err) => {
                tracing::warn!(listing_id = %listing_id, error = %err, "查询申请者房间失败");
                None
            }
        }
    }
}
