//! 实时连接入口
//!
//! 握手时校验凭证（失败即拒绝连接）；连接内的单个坏帧只丢弃并记录，不关闭连接。
//! 除连接 → 主体的注册表外不持有其它状态。

use std::sync::Arc;

use dashmap::DashMap;
use domain::{RoomId, UserId};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    broadcaster::{Delivery, FanoutEvent, MessageBroadcaster, OutboundSender, SubscriberId, Topic},
    error::ApplicationError,
    services::{LocationBroadcaster, MessageBroker, RoomRegistry, SendMessageRequest},
    session::{AuthError, SessionValidator},
};

/// 客户端帧，按 `type` 字段区分
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        room_id: RoomId,
    },
    Unsubscribe {
        room_id: RoomId,
    },
    SendMessage {
        room_id: RoomId,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        attachment: Option<String>,
    },
    PublishLocation {
        room_id: RoomId,
        latitude: f64,
        longitude: f64,
    },
    Ping,
}

/// 帧外层：可选的逐帧凭证
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub frame: ClientFrame,
}

/// 单个连接的处理上下文
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: SubscriberId,
    pub subject: UserId,
    outbound: OutboundSender,
}

impl ConnectionContext {
    pub fn outbound(&self) -> &OutboundSender {
        &self.outbound
    }
}

/// 活跃连接 → 主体
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<SubscriberId, UserId>,
}

impl ConnectionRegistry {
    pub fn register(&self, connection_id: SubscriberId, subject: UserId) {
        self.connections.insert(connection_id, subject);
    }

    pub fn unregister(&self, connection_id: SubscriberId) -> Option<UserId> {
        self.connections
            .remove(&connection_id)
            .map(|(_, subject)| subject)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

pub struct ConnectionGateDependencies {
    pub sessions: Arc<SessionValidator>,
    pub rooms: Arc<RoomRegistry>,
    pub messages: Arc<MessageBroker>,
    pub locations: Arc<LocationBroadcaster>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub queue_capacity: usize,
}

pub struct ConnectionGate {
    deps: ConnectionGateDependencies,
    registry: ConnectionRegistry,
}

impl ConnectionGate {
    pub fn new(deps: ConnectionGateDependencies) -> Self {
        Self {
            deps,
            registry: ConnectionRegistry::default(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// 握手阶段的凭证校验
    pub fn authenticate(&self, credential: Option<&str>) -> Result<UserId, ApplicationError> {
        let credential = credential
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Missing)?;
        let session = self.deps.sessions.validate(credential)?;
        Ok(session.subject)
    }

    /// 注册连接并订阅该主体的通知主题
    pub async fn open(&self, subject: UserId) -> (ConnectionContext, mpsc::Receiver<Delivery>) {
        let (outbound, inbound) = mpsc::channel(self.deps.queue_capacity.max(1));
        let connection_id = SubscriberId::generate();

        self.registry.register(connection_id, subject);
        self.deps
            .broadcaster
            .subscribe(Topic::User(subject), connection_id, outbound.clone())
            .await;

        tracing::info!(
            connection_id = %connection_id,
            user_id = %subject,
            active = self.registry.len(),
            "实时连接已建立"
        );

        (
            ConnectionContext {
                connection_id,
                subject,
                outbound,
            },
            inbound,
        )
    }

    pub async fn connect(
        &self,
        credential: Option<&str>,
    ) -> Result<(ConnectionContext, mpsc::Receiver<Delivery>), ApplicationError> {
        let subject = self.authenticate(credential)?;
        Ok(self.open(subject).await)
    }

    /// 订阅房间的消息与位置主题，要求成员身份
    pub async fn subscribe_room(
        &self,
        ctx: &ConnectionContext,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        self.deps.rooms.authorize_member(room_id, ctx.subject).await?;
        for topic in [Topic::Room(room_id), Topic::Location(room_id)] {
            self.deps
                .broadcaster
                .subscribe(topic, ctx.connection_id, ctx.outbound.clone())
                .await;
        }
        tracing::debug!(connection_id = %ctx.connection_id, room_id = %room_id, "已订阅房间");
        Ok(())
    }

    pub async fn unsubscribe_room(&self, ctx: &ConnectionContext, room_id: RoomId) {
        for topic in [Topic::Room(room_id), Topic::Location(room_id)] {
            self.deps
                .broadcaster
                .unsubscribe(topic, ctx.connection_id)
                .await;
        }
    }

    /// 处理一条文本帧，返回需要回给该连接的事件
    pub async fn handle_text(&self, ctx: &ConnectionContext, raw: &str) -> Option<FanoutEvent> {
        let inbound: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(connection_id = %ctx.connection_id, error = %err, "丢弃格式错误的帧");
                return Some(FanoutEvent::Error {
                    code: 400,
                    message: format!("malformed frame: {err}"),
                });
            }
        };

        if let Some(token) = inbound.token.as_deref() {
            if let Err(err) = self.check_frame_credential(ctx, token) {
                tracing::warn!(connection_id = %ctx.connection_id, error = %err, "丢弃凭证无效的帧");
                return Some(error_event(&err));
            }
        }

        match self.dispatch(ctx, inbound.frame).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(
                    connection_id = %ctx.connection_id,
                    user_id = %ctx.subject,
                    error = %err,
                    "帧处理失败，已丢弃"
                );
                Some(error_event(&err))
            }
        }
    }

    fn check_frame_credential(
        &self,
        ctx: &ConnectionContext,
        token: &str,
    ) -> Result<(), ApplicationError> {
        let session = self.deps.sessions.validate(token)?;
        if session.subject != ctx.subject {
            return Err(AuthError::Invalid(
                "credential does not belong to this connection".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        ctx: &ConnectionContext,
        frame: ClientFrame,
    ) -> Result<Option<FanoutEvent>, ApplicationError> {
        match frame {
            ClientFrame::Subscribe { room_id } => {
                self.subscribe_room(ctx, room_id).await?;
                Ok(Some(FanoutEvent::Subscribed { room_id }))
            }
            ClientFrame::Unsubscribe { room_id } => {
                self.unsubscribe_room(ctx, room_id).await;
                Ok(Some(FanoutEvent::Unsubscribed { room_id }))
            }
            ClientFrame::SendMessage {
                room_id,
                content,
                attachment,
            } => {
                let request =
                    SendMessageRequest::from_parts(room_id, ctx.subject, content, attachment)?;
                self.deps.messages.send(request).await?;
                Ok(None)
            }
            ClientFrame::PublishLocation {
                room_id,
                latitude,
                longitude,
            } => {
                self.deps
                    .locations
                    .publish(ctx.subject, room_id, latitude, longitude)
                    .await?;
                Ok(None)
            }
            ClientFrame::Ping => Ok(Some(FanoutEvent::Pong)),
        }
    }

    /// 连接关闭：移出注册表和所有扇出主题
    pub async fn close(&self, ctx: &ConnectionContext) {
        self.registry.unregister(ctx.connection_id);
        self.deps
            .broadcaster
            .remove_subscriber(ctx.connection_id)
            .await;
        tracing::info!(
            connection_id = %ctx.connection_id,
            user_id = %ctx.subject,
            active = self.registry.len(),
            "实时连接已关闭"
        );
    }
}

fn error_event(err: &ApplicationError) -> FanoutEvent {
    FanoutEvent::Error {
        code: err.status_code(),
        message: err.to_string(),
    }
}
