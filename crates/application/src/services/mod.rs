mod approval_workflow;
mod keyed_lock;
mod location_broadcaster;
mod message_broker;
mod notification_fanout;
mod room_registry;

use std::sync::Arc;

use chrono::SubsecRound;
use domain::{
    ApprovalRepository, ChatRoomRepository, ListingRepository, LocationRepository,
    MessageRepository, NotificationRepository, Timestamp,
};

pub use approval_workflow::{ApprovalOutcome, ApprovalWorkflow, ApprovalWorkflowDependencies};
pub use location_broadcaster::{LocationBroadcaster, LocationBroadcasterDependencies};
pub use message_broker::{MessageBroker, MessageBrokerDependencies, SendMessageRequest};
pub use notification_fanout::{
    NotificationFanout, NotificationFanoutDependencies, NotifyRequest,
};
pub use room_registry::{RoomRegistry, RoomRegistryDependencies};

use crate::{
    attachments::AttachmentStore,
    broadcaster::MessageBroadcaster,
    clock::Clock,
    gate::{ConnectionGate, ConnectionGateDependencies},
    session::SessionValidator,
};

/// 房间内最近一次提交时间，首次进入临界区时从存储加载
#[derive(Debug, Default)]
pub(crate) struct CommitSequence {
    pub(crate) loaded: bool,
    pub(crate) last: Option<Timestamp>,
}

/// 房间内的提交时间严格递增：时钟停滞或回拨时在上一次基础上加 1 微秒。
///
/// 先截断到微秒，与 `TIMESTAMPTZ` 的存储精度一致。
pub(crate) fn next_commit_time(now: Timestamp, previous: Option<Timestamp>) -> Timestamp {
    let now = now.trunc_subsecs(6);
    match previous {
        Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// 持久化网关
#[derive(Clone)]
pub struct Repositories {
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub listings: Arc<dyn ListingRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub locations: Arc<dyn LocationRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

#[derive(Debug, Clone, Copy)]
pub struct CoreSettings {
    /// 每个实时连接的出站队列容量
    pub subscriber_queue_capacity: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
        }
    }
}

/// 协调核心的全部组件，按依赖顺序构造
#[derive(Clone)]
pub struct CoreServices {
    pub sessions: Arc<SessionValidator>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub notifications: Arc<NotificationFanout>,
    pub rooms: Arc<RoomRegistry>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub messages: Arc<MessageBroker>,
    pub locations: Arc<LocationBroadcaster>,
    pub gate: Arc<ConnectionGate>,
}

impl CoreServices {
    pub fn assemble(
        repositories: Repositories,
        broadcaster: Arc<dyn MessageBroadcaster>,
        sessions: Arc<SessionValidator>,
        attachments: Arc<dyn AttachmentStore>,
        clock: Arc<dyn Clock>,
        settings: CoreSettings,
    ) -> Self {
        let notifications = Arc::new(NotificationFanout::new(NotificationFanoutDependencies {
            notification_repository: repositories.notifications.clone(),
            broadcaster: broadcaster.clone(),
            clock: clock.clone(),
        }));

        let rooms = Arc::new(RoomRegistry::new(RoomRegistryDependencies {
            room_repository: repositories.rooms.clone(),
            listing_repository: repositories.listings.clone(),
            approval_repository: repositories.approvals.clone(),
            message_repository: repositories.messages.clone(),
            notifications: notifications.clone(),
            clock: clock.clone(),
        }));

        let approvals = Arc::new(ApprovalWorkflow::new(ApprovalWorkflowDependencies {
            listing_repository: repositories.listings.clone(),
            approval_repository: repositories.approvals.clone(),
            rooms: rooms.clone(),
            notifications: notifications.clone(),
            clock: clock.clone(),
        }));

        let messages = Arc::new(MessageBroker::new(MessageBrokerDependencies {
            message_repository: repositories.messages.clone(),
            rooms: rooms.clone(),
            broadcaster: broadcaster.clone(),
            notifications: notifications.clone(),
            attachments,
            clock: clock.clone(),
        }));

        let locations = Arc::new(LocationBroadcaster::new(LocationBroadcasterDependencies {
            location_repository: repositories.locations.clone(),
            rooms: rooms.clone(),
            broadcaster: broadcaster.clone(),
            notifications: notifications.clone(),
            clock,
        }));

        let gate = Arc::new(ConnectionGate::new(ConnectionGateDependencies {
            sessions: sessions.clone(),
            rooms: rooms.clone(),
            messages: messages.clone(),
            locations: locations.clone(),
            broadcaster: broadcaster.clone(),
            queue_capacity: settings.subscriber_queue_capacity,
        }));

        Self {
            sessions,
            broadcaster,
            notifications,
            rooms,
            approvals,
            messages,
            locations,
            gate,
        }
    }
}
