use application::{ConnectionContext, Delivery, FanoutEvent, Topic};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use domain::RoomId;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{auth::extract_bearer, error::ApiError, extract::ApiQuery, state::AppState};

/// 握手参数：凭证可走 `Authorization` 头或 `access_token` 查询参数
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub access_token: Option<String>,
    pub room_id: Option<RoomId>,
}

/// 升级前完成认证，失败直接返回 401，不建立连接
pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ConnectQuery>,
) -> Result<Response, ApiError> {
    let credential = extract_bearer(&headers).or(query.access_token.as_deref());
    let subject = state.core.gate.authenticate(credential).map_err(|err| {
        tracing::warn!(error = %err, "WebSocket 握手认证失败");
        ApiError::from(err)
    })?;

    if let Some(room_id) = query.room_id {
        state.core.rooms.authorize_member(room_id, subject).await?;
    }

    Ok(ws.on_upgrade(move |socket| async move {
        let connection = WebSocketConnection::open(socket, state, subject, query.room_id).await;
        connection.run().await;
    }))
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 单个 WebSocket 连接
///
/// 发送任务独占 socket 的写半部分，合并广播投递与直接回复；
/// 接收循环在当前任务内顺序处理客户端帧。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    ctx: ConnectionContext,
    deliveries: mpsc::Receiver<Delivery>,
}

impl WebSocketConnection {
    pub async fn open(
        socket: WebSocket,
        state: AppState,
        subject: domain::UserId,
        room_id: Option<RoomId>,
    ) -> Self {
        let (ctx, deliveries) = state.core.gate.open(subject).await;
        if let Some(room_id) = room_id {
            if let Err(err) = state.core.gate.subscribe_room(&ctx, room_id).await {
                tracing::warn!(room_id = %room_id, error = %err, "自动订阅房间失败");
            }
        }
        Self {
            socket,
            state,
            ctx,
            deliveries,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            ctx,
            mut deliveries,
        } = self;
        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);
        let reply_topic = Topic::User(ctx.subject).to_string();

        let send_task = tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendText(text) => WsMessage::Text(text.into()),
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(delivery) = deliveries.recv() => match serde_json::to_string(&delivery) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, "序列化投递失败");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(outgoing).await.is_err() {
                    tracing::debug!("WebSocket 写入失败，发送任务结束");
                    break;
                }
            }
        });

        // 已接收的帧在本任务内处理完毕，断开连接不会打断进行中的发送
        while let Some(Ok(message)) = incoming.next().await {
            let reply = match message {
                WsMessage::Text(text) => state.core.gate.handle_text(&ctx, text.as_str()).await,
                WsMessage::Binary(_) => Some(FanoutEvent::Error {
                    code: 400,
                    message: "binary frames are not supported".to_string(),
                }),
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                        break;
                    }
                    None
                }
                WsMessage::Pong(_) => None,
                WsMessage::Close(_) => {
                    tracing::debug!(connection_id = %ctx.connection_id, "收到关闭帧");
                    break;
                }
            };

            if let Some(event) = reply {
                let delivery = Delivery {
                    topic: reply_topic.clone(),
                    event,
                };
                match serde_json::to_string(&delivery) {
                    Ok(json) => {
                        if cmd_tx.send(WsCommand::SendText(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "序列化回复失败"),
                }
            }
        }

        state.core.gate.close(&ctx).await;
        drop(cmd_tx);
        send_task.abort();
    }
}
