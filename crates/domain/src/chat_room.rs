use crate::errors::DomainError;
use crate::value_objects::{ListingId, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Active,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "ACTIVE",
            RoomStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "ACTIVE" => Ok(RoomStatus::Active),
            "CLOSED" => Ok(RoomStatus::Closed),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown room status {other}"),
            )),
        }
    }
}

/// 绑定一个发布、其发布者与一个申请者的聊天室。
///
/// 同一 (listing_id, requester_id) 至多存在一个 ACTIVE 房间；房间不会被物理删除，只会关闭。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub listing_id: ListingId,
    pub requester_id: UserId,
    /// 对端，即发布者
    pub counterparty_id: UserId,
    pub status: RoomStatus,
    pub last_message_summary: Option<String>,
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChatRoom {
    pub fn open(
        id: RoomId,
        listing_id: ListingId,
        requester_id: UserId,
        counterparty_id: UserId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if requester_id == counterparty_id {
            return Err(DomainError::invalid_argument(
                "listing_id",
                "cannot open a chat room on your own listing",
            ));
        }
        Ok(Self {
            id,
            listing_id,
            requester_id,
            counterparty_id,
            status: RoomStatus::Active,
            last_message_summary: None,
            last_message_at: None,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.requester_id == user_id || self.counterparty_id == user_id
    }

    /// 返回房间中除 `user_id` 之外的另一位成员
    pub fn counterpart_of(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.requester_id {
            Some(self.counterparty_id)
        } else if user_id == self.counterparty_id {
            Some(self.requester_id)
        } else {
            None
        }
    }

    pub fn record_message(&mut self, summary: impl Into<String>, at: Timestamp) {
        self.last_message_summary = Some(summary.into());
        self.last_message_at = Some(at);
        self.updated_at = at;
    }

    pub fn close(&mut self, now: Timestamp) {
        self.status = RoomStatus::Closed;
        self.updated_at = now;
    }
}

/// 条件插入的结果：新建或者并发下已存在的房间
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomInsertOutcome {
    Created(ChatRoom),
    Existing(ChatRoom),
}

impl RoomInsertOutcome {
    pub fn into_room(self) -> ChatRoom {
        match self {
            RoomInsertOutcome::Created(room) | RoomInsertOutcome::Existing(room) => room,
        }
    }
}
