//! 应用层实现。
//!
//! 这里提供实时协调核心的用例服务：会话校验与吊销、房间注册、加入审批、
//! 消息与位置的持久化后广播、通知扇出，以及实时连接的入口闸门。

pub mod attachments;
pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod gate;
pub mod local_broadcast;
pub mod services;
pub mod session;

pub use attachments::{AttachmentStore, AttachmentUpload};
pub use broadcaster::{
    BroadcastError, BroadcastReport, Delivery, FanoutEvent, MessageBroadcaster, OutboundSender,
    SubscriberId, Topic,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{
    ApprovalDto, ListingDto, LocationDto, MessageDto, NotificationDto, RoomDetailDto,
    RoomSummaryDto,
};
pub use error::ApplicationError;
pub use gate::{ClientFrame, ConnectionContext, ConnectionGate, ConnectionRegistry, InboundFrame};
pub use local_broadcast::LocalMessageBroadcaster;
pub use services::{
    ApprovalOutcome, ApprovalWorkflow, CoreServices, CoreSettings, LocationBroadcaster, MessageBroker,
    NotificationFanout, NotifyRequest, Repositories, RoomRegistry, SendMessageRequest,
};
pub use session::{AuthError, Claims, IssuedCredential, RevocationStore, Session, SessionValidator};
