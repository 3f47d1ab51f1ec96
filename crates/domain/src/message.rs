use std::collections::BTreeSet;

use crate::value_objects::{AttachmentRef, MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 通知预览的字符预算
pub const NOTIFICATION_PREVIEW_CHARS: usize = 30;
/// 房间最后一条消息摘要的字符预算
pub const ROOM_SUMMARY_CHARS: usize = 100;

const ELLIPSIS: &str = "...";
const IMAGE_SUMMARY: &str = "[image]";

/// 按字符截断文本，超出预算时以省略号结尾（总长度不超过预算）。
pub fn preview(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let keep = budget.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { content: MessageContent },
    Image { attachment: AttachmentRef },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Text { .. } => "TEXT",
            MessageBody::Image { .. } => "IMAGE",
        }
    }

    /// 用于摘要和通知的原始文本
    pub fn summary_source(&self) -> &str {
        match self {
            MessageBody::Text { content } => content.as_str(),
            MessageBody::Image { .. } => IMAGE_SUMMARY,
        }
    }

    pub fn summary(&self, budget: usize) -> String {
        preview(self.summary_source(), budget)
    }
}

/// 尚未分配序号的待持久化消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
    pub read_by: BTreeSet<UserId>,
}

impl Message {
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            room_id: new.room_id,
            sender_id: new.sender_id,
            body: new.body,
            created_at: new.created_at,
            read_by: BTreeSet::new(),
        }
    }

    pub fn is_read_by(&self, user_id: UserId) -> bool {
        self.read_by.contains(&user_id)
    }

    /// 记录已读；自己发送的消息不计入。返回是否新增了已读记录。
    pub fn mark_read_by(&mut self, reader: UserId) -> bool {
        if reader == self.sender_id {
            return false;
        }
        self.read_by.insert(reader)
    }
}

/// 分页参数（页码从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 50;
    pub const MAX_SIZE: u32 = 200;

    pub fn new(number: Option<u32>, size: Option<u32>) -> Option<Self> {
        if number.is_none() && size.is_none() {
            return None;
        }
        Some(Self {
            number: number.unwrap_or(1).max(1),
            size: size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}
