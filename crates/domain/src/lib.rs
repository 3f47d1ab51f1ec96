//! 房间协调核心领域模型
//!
//! 包含聊天室、消息、加入申请、位置与通知等核心实体，以及持久化网关的调用契约。

pub mod approval;
pub mod chat_room;
pub mod errors;
pub mod listing;
pub mod location;
pub mod message;
pub mod notification;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use approval::*;
pub use chat_room::*;
pub use errors::*;
pub use listing::*;
pub use location::*;
pub use message::*;
pub use notification::*;
pub use repository::*;
pub use value_objects::*;
