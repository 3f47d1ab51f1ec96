//! 聊天消息的持久化与广播
//!
//! 同一房间内"持久化 → 广播"在房间临界区内完成，广播顺序即持久化顺序。

use std::sync::Arc;

use domain::{
    AttachmentRef, DomainError, Message, MessageBody, MessageContent, MessageRepository,
    NewMessage, NotificationCategory, Page, RoomId, UserId, NOTIFICATION_PREVIEW_CHARS,
    ROOM_SUMMARY_CHARS,
};

use crate::{
    attachments::{AttachmentStore, AttachmentUpload},
    broadcaster::{FanoutEvent, MessageBroadcaster, Topic},
    clock::Clock,
    dto::MessageDto,
    error::ApplicationError,
    services::{
        keyed_lock::KeyedLocks,
        next_commit_time,
        notification_fanout::{NotificationFanout, NotifyRequest},
        room_registry::RoomRegistry,
        CommitSequence,
    },
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: MessageBody,
}

impl SendMessageRequest {
    /// 文本与附件二选一
    pub fn from_parts(
        room_id: RoomId,
        sender_id: UserId,
        content: Option<String>,
        attachment: Option<String>,
    ) -> Result<Self, DomainError> {
        let body = match (content, attachment) {
            (Some(content), None) => MessageBody::Text {
                content: MessageContent::parse(content)?,
            },
            (None, Some(attachment)) => MessageBody::Image {
                attachment: AttachmentRef::parse(attachment)?,
            },
            _ => {
                return Err(DomainError::invalid_argument(
                    "content",
                    "exactly one of content or attachment is required",
                ))
            }
        };
        Ok(Self {
            room_id,
            sender_id,
            body,
        })
    }
}

pub struct MessageBrokerDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub notifications: Arc<NotificationFanout>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageBroker {
    deps: MessageBrokerDependencies,
    room_sequences: KeyedLocks<RoomId, CommitSequence>,
}

impl MessageBroker {
    pub fn new(deps: MessageBrokerDependencies) -> Self {
        Self {
            deps,
            room_sequences: KeyedLocks::new(),
        }
    }

    pub async fn send(&self, request: SendMessageRequest) -> Result<Message, ApplicationError> {
        let room = self
            .deps
            .rooms
            .authorize_member(request.room_id, request.sender_id)
            .await?;
        if !room.is_active() {
            return Err(DomainError::RoomClosed.into());
        }

        let message = {
            let mut sequence = self.room_sequences.lock(room.id).await;
            if !sequence.loaded {
                sequence.last = self
                    .deps
                    .message_repository
                    .latest_created_at(room.id)
                    .await?;
                sequence.loaded = true;
            }

            let created_at = next_commit_time(self.deps.clock.now(), sequence.last);
            let message = self
                .deps
                .message_repository
                .append(NewMessage {
                    room_id: room.id,
                    sender_id: request.sender_id,
                    body: request.body,
                    created_at,
                })
                .await?;
            sequence.last = Some(message.created_at);

            let event = FanoutEvent::ChatMessage {
                message: MessageDto::from(&message),
            };
            match self
                .deps
                .broadcaster
                .broadcast(Topic::Room(room.id), event)
                .await
            {
                Ok(report) => tracing::debug!(
                    room_id = %room.id,
                    message_id = %message.id,
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "消息已广播"
                ),
                Err(err) => tracing::error!(
                    room_id = %room.id,
                    message_id = %message.id,
                    error = %err,
                    "消息已保存到数据库，但广播失败"
                ),
            }

            if let Err(err) = self
                .deps
                .rooms
                .record_activity(
                    room.id,
                    message.body.summary(ROOM_SUMMARY_CHARS),
                    message.created_at,
                )
                .await
            {
                tracing::warn!(room_id = %room.id, error = %err, "更新房间摘要失败");
            }

            message
        };

        if let Some(recipient_id) = room.counterpart_of(message.sender_id) {
            self.deps
                .notifications
                .notify_quietly(NotifyRequest {
                    recipient_id,
                    message: message.body.summary(NOTIFICATION_PREVIEW_CHARS),
                    category: NotificationCategory::ChatMessage,
                    related_room_id: Some(room.id),
                    related_listing_id: Some(room.listing_id),
                })
                .await;
        }

        Ok(message)
    }

    /// 先校验成员身份再保存附件，避免为非成员落盘
    pub async fn send_image(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        upload: AttachmentUpload,
    ) -> Result<Message, ApplicationError> {
        let room = self.deps.rooms.authorize_member(room_id, sender_id).await?;
        if !room.is_active() {
            return Err(DomainError::RoomClosed.into());
        }
        upload.validate()?;

        let attachment = self.deps.attachments.store(upload).await?;
        self.send(SendMessageRequest {
            room_id,
            sender_id,
            body: MessageBody::Image { attachment },
        })
        .await
    }

    /// 幂等：重复调用不会产生新的已读记录
    pub async fn mark_read(&self, room_id: RoomId, reader: UserId) -> Result<u64, ApplicationError> {
        self.deps.rooms.authorize_member(room_id, reader).await?;
        let marked = self
            .deps
            .message_repository
            .mark_read(room_id, reader)
            .await?;
        if marked > 0 {
            tracing::debug!(room_id = %room_id, reader = %reader, marked, "消息已标记为已读");
        }
        Ok(marked)
    }

    pub async fn list_messages(
        &self,
        room_id: RoomId,
        viewer: UserId,
        page: Option<Page>,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps.rooms.authorize_member(room_id, viewer).await?;
        Ok(self
            .deps
            .message_repository
            .list_by_room(room_id, page)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_requires_exactly_one_body() {
        let room = RoomId::generate();
        let user = UserId::generate();
        assert!(SendMessageRequest::from_parts(room, user, Some("hi".into()), None).is_ok());
        assert!(
            SendMessageRequest::from_parts(room, user, None, Some("/attachments/a.png".into()))
                .is_ok()
        );
        assert!(SendMessageRequest::from_parts(room, user, None, None).is_err());
        assert!(SendMessageRequest::from_parts(
            room,
            user,
            Some("hi".into()),
            Some("/attachments/a.png".into())
        )
        .is_err());
    }
}
