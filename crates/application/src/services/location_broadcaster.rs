//! 实时位置的持久化与广播
use std::sync::Arc;

use domain::{
    Coordinates, DomainError, LocationPing, LocationRepository, NewLocationPing,
    NotificationCategory, RoomId, UserId,
};

use crate::{
    broadcaster::{FanoutEvent, MessageBroadcaster, Topic},
    clock::Clock,
    dto::LocationDto,
    error::ApplicationError,
    services::{
        keyed_lock::KeyedLocks,
        next_commit_time,
        notification_fanout::{NotificationFanout, NotifyRequest},
        room_registry::RoomRegistry,
        CommitSequence,
    },
};

const LOCATION_UPDATED: &str = "location updated";

pub struct LocationBroadcasterDependencies {
    pub location_repository: Arc<dyn LocationRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub notifications: Arc<NotificationFanout>,
    pub clock: Arc<dyn Clock>,
}

pub struct LocationBroadcaster {
    deps: LocationBroadcasterDependencies,
    room_sequences: KeyedLocks<RoomId, CommitSequence>,
}

impl LocationBroadcaster {
    pub fn new(deps: LocationBroadcasterDependencies) -> Self {
        Self {
            deps,
            room_sequences: KeyedLocks::new(),
        }
    }

    pub async fn publish(
        &self,
        sender_id: UserId,
        room_id: RoomId,
        latitude: f64,
        longitude: f64,
    ) -> Result<LocationPing, ApplicationError> {
        let room = self.deps.rooms.authorize_member(room_id, sender_id).await?;
        if !room.is_active() {
            return Err(DomainError::RoomClosed.into());
        }
        let coordinates = Coordinates::new(latitude, longitude)?;

        let ping = {
            let mut sequence = self.room_sequences.lock(room_id).await;
            if !sequence.loaded {
                sequence.last = self
                    .deps
                    .location_repository
                    .latest_captured_at(room_id)
                    .await?;
                sequence.loaded = true;
            }

            let captured_at = next_commit_time(self.deps.clock.now(), sequence.last);
            let ping = self
                .deps
                .location_repository
                .append(NewLocationPing {
                    room_id,
                    sender_id,
                    coordinates,
                    captured_at,
                })
                .await?;
            sequence.last = Some(ping.captured_at);

            let event = FanoutEvent::Location {
                ping: LocationDto::from(&ping),
            };
            if let Err(err) = self
                .deps
                .broadcaster
                .broadcast(Topic::Location(room_id), event)
                .await
            {
                tracing::error!(room_id = %room_id, error = %err, "位置已保存，但广播失败");
            }
            ping
        };

        if let Some(recipient_id) = room.counterpart_of(sender_id) {
            self.deps
                .notifications
                .notify_quietly(NotifyRequest {
                    recipient_id,
                    message: LOCATION_UPDATED.to_string(),
                    category: NotificationCategory::LocationShare,
                    related_room_id: Some(room_id),
                    related_listing_id: Some(room.listing_id),
                })
                .await;
        }

        Ok(ping)
    }

    /// 每个发送者最新的一条位置
    pub async fn recent(&self, room_id: RoomId) -> Result<Vec<LocationPing>, ApplicationError> {
        Ok(self
            .deps
            .location_repository
            .latest_per_sender(room_id)
            .await?)
    }

    pub async fn last(
        &self,
        room_id: RoomId,
        sender_id: UserId,
    ) -> Result<LocationPing, ApplicationError> {
        self.deps
            .location_repository
            .latest_for(room_id, sender_id)
            .await?
            .ok_or_else(|| DomainError::LocationNotFound.into())
    }
}
