use std::sync::Arc;

use application::{
    AttachmentStore, Clock, CoreServices, CoreSettings, LocalMessageBroadcaster,
    MessageBroadcaster, Repositories, RevocationStore, SessionValidator,
};
use config::AppConfig;
use thiserror::Error;

use crate::{
    memory::InMemoryStore,
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 存储后端
#[derive(Clone)]
pub enum StorageBackend {
    Memory(InMemoryStore),
    Postgres(PgStorage),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub storage: StorageBackend,
    pub repositories: Repositories,
    pub broadcaster: Arc<LocalMessageBroadcaster>,
}

impl Infrastructure {
    /// 进程内存储，不需要外部依赖
    pub fn in_memory(config: &AppConfig) -> Self {
        let store = InMemoryStore::new();
        Self {
            repositories: store.repositories(),
            storage: StorageBackend::Memory(store),
            broadcaster: Arc::new(LocalMessageBroadcaster::new(
                config.broadcast.enqueue_timeout(),
            )),
        }
    }

    /// 连接 PostgreSQL 并执行迁移
    pub async fn connect(database_url: &str, config: &AppConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(database_url, config.database.max_connections).await?;
        MIGRATOR.run(&pool).await?;

        let storage = PgStorage::new(pool);
        Ok(Self {
            repositories: storage.repositories(),
            storage: StorageBackend::Postgres(storage),
            broadcaster: Arc::new(LocalMessageBroadcaster::new(
                config.broadcast.enqueue_timeout(),
            )),
        })
    }

    /// 配置了数据库地址时使用 PostgreSQL，否则使用内存存储
    pub async fn from_config(config: &AppConfig) -> Result<Self, InfrastructureError> {
        match config.database.url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => {
                tracing::info!("使用 PostgreSQL 存储");
                Self::connect(url, config).await
            }
            None => {
                tracing::warn!("未配置 database.url，使用进程内存储（重启后数据丢失）");
                Ok(Self::in_memory(config))
            }
        }
    }

    /// 组装协调核心；吊销表由返回的 `CoreServices::sessions` 持有
    pub fn assemble(
        &self,
        config: &AppConfig,
        attachments: Arc<dyn AttachmentStore>,
        clock: Arc<dyn Clock>,
    ) -> CoreServices {
        let revocations = Arc::new(RevocationStore::new());
        let sessions = Arc::new(SessionValidator::new(&config.jwt, revocations));
        let broadcaster: Arc<dyn MessageBroadcaster> = self.broadcaster.clone();

        CoreServices::assemble(
            self.repositories.clone(),
            broadcaster,
            sessions,
            attachments,
            clock,
            CoreSettings {
                subscriber_queue_capacity: config.broadcast.subscriber_queue_capacity,
            },
        )
    }
}
