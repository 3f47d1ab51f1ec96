#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{CoreServices, SystemClock};
use config::AppConfig;
use domain::{Listing, ListingId, UserId};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{InMemoryAttachmentStore, InMemoryStore, Infrastructure, StorageBackend};
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 绑定在随机端口上的测试服务（进程内存储）
pub struct TestApp {
    pub base_http: String,
    pub base_ws: String,
    pub core: CoreServices,
    pub store: InMemoryStore,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = AppConfig::default();
        let infrastructure = Infrastructure::in_memory(&config);
        let store = match &infrastructure.storage {
            StorageBackend::Memory(store) => store.clone(),
            StorageBackend::Postgres(_) => unreachable!("in-memory backend expected"),
        };
        let core = infrastructure.assemble(
            &config,
            Arc::new(InMemoryAttachmentStore::new()),
            Arc::new(SystemClock),
        );

        let app = router(AppState::new(core.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_http: format!("http://{addr}"),
            base_ws: format!("ws://{addr}"),
            core,
            store,
            client: reqwest::Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn token_for(&self, user: UserId) -> String {
        self.core.sessions.issue(user).expect("issue token").token
    }

    pub async fn seed_listing(&self, owner: UserId, capacity: u32) -> ListingId {
        let listing = Listing {
            id: ListingId::generate(),
            owner_id: owner,
            title: "board game night".to_string(),
            capacity,
            participants: 0,
            visible: true,
        };
        let id = listing.id;
        self.store.upsert_listing(listing).await;
        id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_http, path)
    }

    pub async fn post_json(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("send request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    pub async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("send request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    pub async fn put(&self, path: &str, token: &str) -> (u16, Value) {
        let response = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("send request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    /// 打开房间，返回 room_id
    pub async fn open_room(&self, listing: ListingId, requester_token: &str) -> String {
        let (status, body) = self
            .post_json(
                "/chat/rooms",
                requester_token,
                serde_json::json!({ "listing_id": listing }),
            )
            .await;
        assert_eq!(status, 200, "open room failed: {body}");
        body["data"]["room_id"].as_str().expect("room id").to_string()
    }

    pub async fn connect_ws(&self, token: &str) -> WsClient {
        let url = format!("{}/ws?access_token={token}", self.base_ws);
        let (mut stream, _) = connect_async(url).await.expect("websocket connect");
        // 等到服务端完成注册再返回
        stream
            .send(Message::Text(r#"{"type":"ping"}"#.into()))
            .await
            .expect("send ping");
        next_event(&mut stream, "pong").await.expect("pong");
        stream
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// 读取下一条 JSON 文本帧，超时返回 None
pub async fn next_frame(stream: &mut WsClient) -> Option<Value> {
    loop {
        let message = timeout(Duration::from_secs(2), stream.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
}

/// 跳过不关心的帧，直到事件类型匹配
pub async fn next_event(stream: &mut WsClient, event_type: &str) -> Option<Value> {
    loop {
        let frame = next_frame(stream).await?;
        if frame["event"]["type"] == event_type {
            return Some(frame);
        }
    }
}
