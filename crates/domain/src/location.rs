use std::collections::HashMap;

use crate::value_objects::{Coordinates, LocationPingId, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct NewLocationPing {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub coordinates: Coordinates,
    pub captured_at: Timestamp,
}

/// 追加写入的位置上报记录
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocationPing {
    pub id: LocationPingId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: Timestamp,
}

impl LocationPing {
    pub fn from_new(id: LocationPingId, new: NewLocationPing) -> Self {
        Self {
            id,
            room_id: new.room_id,
            sender_id: new.sender_id,
            latitude: new.coordinates.latitude,
            longitude: new.coordinates.longitude,
            captured_at: new.captured_at,
        }
    }
}

/// 每个发送者只保留 captured_at 最新的一条，结果按发送者排序。
pub fn latest_per_sender<I>(pings: I) -> Vec<LocationPing>
where
    I: IntoIterator<Item = LocationPing>,
{
    let mut latest: HashMap<UserId, LocationPing> = HashMap::new();
    for ping in pings {
        match latest.get(&ping.sender_id) {
            Some(current)
                if (current.captured_at, current.id) >= (ping.captured_at, ping.id) => {}
            _ => {
                latest.insert(ping.sender_id, ping);
            }
        }
    }
    let mut result: Vec<LocationPing> = latest.into_values().collect();
    result.sort_by_key(|ping| ping.sender_id);
    result
}
