use std::fmt;

use async_trait::async_trait;
use domain::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dto::{LocationDto, MessageDto, NotificationDto};

/// 扇出主题：`room.<id>`、`location.<id>`、`user.<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Room(RoomId),
    Location(RoomId),
    User(UserId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Room(id) => write!(f, "room.{id}"),
            Topic::Location(id) => write!(f, "location.{id}"),
            Topic::User(id) => write!(f, "user.{id}"),
        }
    }
}

/// 订阅者（即一个实时连接）的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutEvent {
    ChatMessage { message: MessageDto },
    Location { ping: LocationDto },
    Notification { notification: NotificationDto },
    Subscribed { room_id: RoomId },
    Unsubscribed { room_id: RoomId },
    Pong,
    Error { code: u16, message: String },
}

/// 出站队列中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: String,
    pub event: FanoutEvent,
}

pub type OutboundSender = mpsc::Sender<Delivery>;

/// 一次广播的投递结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// 入队超时而被丢弃的订阅者数
    pub dropped: usize,
    /// 已关闭并被移除的订阅者数
    pub pruned: usize,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn subscribe(&self, topic: Topic, subscriber: SubscriberId, outbound: OutboundSender);
    async fn unsubscribe(&self, topic: Topic, subscriber: SubscriberId);
    /// 从所有主题移除订阅者
    async fn remove_subscriber(&self, subscriber: SubscriberId);
    async fn broadcast(
        &self,
        topic: Topic,
        event: FanoutEvent,
    ) -> Result<BroadcastReport, BroadcastError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_render_channel_names() {
        let room = RoomId::generate();
        let user = UserId::generate();
        assert_eq!(Topic::Room(room).to_string(), format!("room.{room}"));
        assert_eq!(Topic::Location(room).to_string(), format!("location.{room}"));
        assert_eq!(Topic::User(user).to_string(), format!("user.{user}"));
    }

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(FanoutEvent::Error {
            code: 403,
            message: "nope".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], 403);
    }
}
