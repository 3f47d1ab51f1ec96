use domain::{
    ApprovalRequest, ApprovalStatus, ChatRoom, Listing, ListingId, LocationPing, Message,
    MessageBody, Notification, NotificationCategory, RoomId, RoomStatus, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub kind: String,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub created_at: Timestamp,
    pub read_by: Vec<UserId>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        let (content, attachment) = match &message.body {
            MessageBody::Text { content } => (Some(content.as_str().to_string()), None),
            MessageBody::Image { attachment } => (None, Some(attachment.as_str().to_string())),
        };
        Self {
            id: message.id.0,
            room_id: message.room_id,
            sender_id: message.sender_id,
            kind: message.body.kind().to_string(),
            content,
            attachment,
            created_at: message.created_at,
            read_by: message.read_by.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    pub id: i64,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: Timestamp,
}

impl From<&LocationPing> for LocationDto {
    fn from(ping: &LocationPing) -> Self {
        Self {
            id: ping.id.0,
            room_id: ping.room_id,
            sender_id: ping.sender_id,
            latitude: ping.latitude,
            longitude: ping.longitude,
            captured_at: ping.captured_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: i64,
    pub recipient_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub related_room_id: Option<RoomId>,
    pub related_listing_id: Option<ListingId>,
    pub created_at: Timestamp,
    pub read: bool,
}

impl From<&Notification> for NotificationDto {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id.0,
            recipient_id: notification.recipient_id,
            message: notification.message.clone(),
            category: notification.category,
            related_room_id: notification.related_room_id,
            related_listing_id: notification.related_listing_id,
            created_at: notification.created_at,
            read: notification.read,
        }
    }
}

/// 房间列表项（带未读数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub room_id: RoomId,
    pub listing_id: ListingId,
    pub requester_id: UserId,
    pub counterparty_id: UserId,
    pub status: RoomStatus,
    pub last_message_summary: Option<String>,
    pub last_message_at: Option<Timestamp>,
    pub unread_count: u64,
}

impl RoomSummaryDto {
    pub fn from_room(room: &ChatRoom, unread_count: u64) -> Self {
        Self {
            room_id: room.id,
            listing_id: room.listing_id,
            requester_id: room.requester_id,
            counterparty_id: room.counterparty_id,
            status: room.status,
            last_message_summary: room.last_message_summary.clone(),
            last_message_at: room.last_message_at,
            unread_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDto {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: String,
    pub capacity: u32,
    pub participants: u32,
    pub visible: bool,
}

impl From<&Listing> for ListingDto {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id,
            owner_id: listing.owner_id,
            title: listing.title.clone(),
            capacity: listing.capacity,
            participants: listing.participants,
            visible: listing.visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetailDto {
    pub room: RoomSummaryDto,
    pub listing: Option<ListingDto>,
    /// 申请者的审批状态
    pub approval_status: Option<ApprovalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDto {
    pub listing_id: ListingId,
    pub requester_id: UserId,
    pub status: ApprovalStatus,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<Timestamp>,
    pub requested_at: Timestamp,
}

impl From<&ApprovalRequest> for ApprovalDto {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            listing_id: request.listing_id,
            requester_id: request.requester_id,
            status: request.status,
            decided_by: request.decided_by,
            decided_at: request.decided_at,
            requested_at: request.requested_at,
        }
    }
}
