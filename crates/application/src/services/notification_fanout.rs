//! 通知扇出
//!
//! 先持久化通知记录，再推送给接收者当前的实时连接；离线时持久化记录是唯一产物。

use std::sync::Arc;

use domain::{
    DomainError, ListingId, NewNotification, Notification, NotificationCategory, NotificationId,
    NotificationRepository, RoomId, UserId,
};

use crate::{
    broadcaster::{FanoutEvent, MessageBroadcaster, Topic},
    clock::Clock,
    dto::NotificationDto,
    error::ApplicationError,
};

#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub recipient_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub related_room_id: Option<RoomId>,
    pub related_listing_id: Option<ListingId>,
}

pub struct NotificationFanoutDependencies {
    pub notification_repository: Arc<dyn NotificationRepository>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub clock: Arc<dyn Clock>,
}

pub struct NotificationFanout {
    deps: NotificationFanoutDependencies,
}

impl NotificationFanout {
    pub fn new(deps: NotificationFanoutDependencies) -> Self {
        Self { deps }
    }

    pub async fn notify(&self, request: NotifyRequest) -> Result<Notification, ApplicationError> {
        let notification = self
            .deps
            .notification_repository
            .insert(NewNotification {
                recipient_id: request.recipient_id,
                message: request.message,
                category: request.category,
                related_room_id: request.related_room_id,
                related_listing_id: request.related_listing_id,
                created_at: self.deps.clock.now(),
            })
            .await?;

        let event = FanoutEvent::Notification {
            notification: NotificationDto::from(&notification),
        };
        match self
            .deps
            .broadcaster
            .broadcast(Topic::User(notification.recipient_id), event)
            .await
        {
            Ok(report) if report.delivered == 0 => {
                tracing::debug!(
                    recipient = %notification.recipient_id,
                    category = notification.category.as_str(),
                    "接收者不在线，仅持久化通知"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    recipient = %notification.recipient_id,
                    error = %err,
                    "通知已保存，但实时推送失败"
                );
            }
        }

        Ok(notification)
    }

    /// 与实时事件解耦：失败只记录日志，不影响调用方
    pub async fn notify_quietly(&self, request: NotifyRequest) {
        let recipient = request.recipient_id;
        let category = request.category;
        if let Err(err) = self.notify(request).await {
            tracing::warn!(
                recipient = %recipient,
                category = category.as_str(),
                error = %err,
                "通知持久化失败"
            );
        }
    }

    pub async fn list(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationDto>, ApplicationError> {
        let notifications = self
            .deps
            .notification_repository
            .list_for_recipient(recipient_id, unread_only)
            .await?;
        Ok(notifications.iter().map(NotificationDto::from).collect())
    }

    pub async fn mark_read(
        &self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<(), ApplicationError> {
        let found = self
            .deps
            .notification_repository
            .mark_read(id, recipient_id)
            .await?;
        if !found {
            return Err(DomainError::NotificationNotFound.into());
        }
        Ok(())
    }
}
