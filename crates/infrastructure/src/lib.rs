//! 基础设施层实现。
//!
//! 提供 PostgreSQL 与进程内两套持久化网关、本地附件存储，实现领域/应用层定义的接口。

pub mod attachments;
pub mod builder;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use attachments::{InMemoryAttachmentStore, LocalAttachmentStore};
pub use builder::{Infrastructure, InfrastructureError, StorageBackend};
pub use memory::InMemoryStore;
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgApprovalRepository, PgChatRoomRepository, PgListingRepository,
    PgLocationRepository, PgMessageRepository, PgNotificationRepository, PgStorage,
};
