use crate::errors::DomainError;
use crate::value_objects::{ListingId, NotificationId, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    ChatMessage,
    LocationShare,
    RoomCreated,
    JoinRequested,
    JoinApproved,
    JoinRejected,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::ChatMessage => "CHAT_MESSAGE",
            NotificationCategory::LocationShare => "LOCATION_SHARE",
            NotificationCategory::RoomCreated => "ROOM_CREATED",
            NotificationCategory::JoinRequested => "JOIN_REQUESTED",
            NotificationCategory::JoinApproved => "JOIN_APPROVED",
            NotificationCategory::JoinRejected => "JOIN_REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let category = match value {
            "CHAT_MESSAGE" => NotificationCategory::ChatMessage,
            "LOCATION_SHARE" => NotificationCategory::LocationShare,
            "ROOM_CREATED" => NotificationCategory::RoomCreated,
            "JOIN_REQUESTED" => NotificationCategory::JoinRequested,
            "JOIN_APPROVED" => NotificationCategory::JoinApproved,
            "JOIN_REJECTED" => NotificationCategory::JoinRejected,
            other => {
                return Err(DomainError::invalid_argument(
                    "category",
                    format!("unknown notification category {other}"),
                ))
            }
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub related_room_id: Option<RoomId>,
    pub related_listing_id: Option<ListingId>,
    pub created_at: Timestamp,
}

/// 通知记录；创建后只允许修改已读标记
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub related_room_id: Option<RoomId>,
    pub related_listing_id: Option<ListingId>,
    pub created_at: Timestamp,
    pub read: bool,
}

impl Notification {
    pub fn from_new(id: NotificationId, new: NewNotification) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            message: new.message,
            category: new.category,
            related_room_id: new.related_room_id,
            related_listing_id: new.related_listing_id,
            created_at: new.created_at,
            read: false,
        }
    }
}
