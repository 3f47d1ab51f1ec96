//! 跨 crate 场景测试的公共装配
//!
//! 协调核心跑在进程内存储和手动时钟之上，不依赖外部服务。

use std::sync::Arc;

use application::{
    CoreServices, CoreSettings, LocalMessageBroadcaster, ManualClock, MessageBroadcaster,
    Repositories, RevocationStore, SessionValidator,
};
use chrono::Utc;
use config::JwtConfig;
use domain::{Listing, ListingId, NotificationRepository, UserId};
use infrastructure::{InMemoryAttachmentStore, InMemoryStore};

pub struct Harness {
    pub core: CoreServices,
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|repositories| repositories)
    }

    /// 替换通知存储，用来模拟通知写入失败
    pub fn with_notifications(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self::build(move |mut repositories| {
            repositories.notifications = notifications;
            repositories
        })
    }

    fn build(customize: impl FnOnce(Repositories) -> Repositories) -> Self {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = Arc::new(SessionValidator::new(
            &JwtConfig {
                secret: "scenario-test-secret-with-at-least-32-chars".to_string(),
                expiration_hours: 1,
            },
            Arc::new(RevocationStore::new()),
        ));
        let broadcaster: Arc<dyn MessageBroadcaster> = Arc::new(LocalMessageBroadcaster::default());

        let core = CoreServices::assemble(
            customize(store.repositories()),
            broadcaster,
            sessions,
            Arc::new(InMemoryAttachmentStore::new()),
            clock.clone(),
            CoreSettings::default(),
        );

        Self { core, store, clock }
    }

    pub async fn seed_listing(&self, owner_id: UserId, capacity: u32) -> Listing {
        let listing = Listing {
            id: ListingId::generate(),
            owner_id,
            title: "sunset kayak tour".to_string(),
            capacity,
            participants: 0,
            visible: true,
        };
        self.store.upsert_listing(listing.clone()).await;
        listing
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
