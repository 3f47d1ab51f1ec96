//! 进程内存储
//!
//! 未配置数据库时使用，也是集成测试的默认后端。所有仓储共享一份状态，
//! 每个操作在单次写锁内完成，语义与 PostgreSQL 实现保持一致。

use std::{collections::HashMap, sync::Arc};

use application::Repositories;
use domain::{
    latest_per_sender, ApprovalRepository, ApprovalRequest, ChatRoom, ChatRoomRepository, Listing,
    ListingId, ListingRepository, LocationPing, LocationPingId, LocationRepository, Message,
    MessageId, MessageRepository, NewLocationPing, NewMessage, NewNotification, Notification,
    NotificationId, NotificationRepository, Page, RepositoryError, RepositoryFuture, RoomId,
    RoomInsertOutcome, RoomStatus, Timestamp, UserId,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    listings: HashMap<ListingId, Listing>,
    approvals: HashMap<(ListingId, UserId), ApprovalRequest>,
    rooms: HashMap<RoomId, ChatRoom>,
    messages: HashMap<RoomId, Vec<Message>>,
    locations: HashMap<RoomId, Vec<LocationPing>>,
    notifications: Vec<Notification>,
    next_message_id: i64,
    next_location_id: i64,
    next_notification_id: i64,
}

impl MemoryState {
    fn active_room(&self, listing_id: ListingId, requester_id: UserId) -> Option<&ChatRoom> {
        self.rooms.values().find(|room| {
            room.listing_id == listing_id
                && room.requester_id == requester_id
                && room.status == RoomStatus::Active
        })
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或覆盖一条发布（发布目录由外部系统维护）
    pub async fn upsert_listing(&self, listing: Listing) {
        self.state
            .write()
            .await
            .listings
            .insert(listing.id, listing);
    }

    pub async fn listing(&self, id: ListingId) -> Option<Listing> {
        self.state.read().await.listings.get(&id).cloned()
    }

    pub fn repositories(&self) -> Repositories {
        let store = Arc::new(self.clone());
        Repositories {
            rooms: store.clone(),
            messages: store.clone(),
            listings: store.clone(),
            approvals: store.clone(),
            locations: store.clone(),
            notifications: store,
        }
    }
}

impl ChatRoomRepository for InMemoryStore {
    fn find_by_id(&self, id: RoomId) -> RepositoryFuture<Option<ChatRoom>> {
        let state = self.state.clone();
        Box::pin(async move { Ok(state.read().await.rooms.get(&id).cloned()) })
    }

    fn find_active_by_pair(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ChatRoom>> {
        let state = self.state.clone();
        Box::pin(async move {
            Ok(state
                .read()
                .await
                .active_room(listing_id, requester_id)
                .cloned())
        })
    }

    fn insert_if_absent(&self, room: ChatRoom) -> RepositoryFuture<RoomInsertOutcome> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            if let Some(existing) = state.active_room(room.listing_id, room.requester_id) {
                return Ok(RoomInsertOutcome::Existing(existing.clone()));
            }
            if state.rooms.contains_key(&room.id) {
                return Err(RepositoryError::Conflict);
            }
            state.rooms.insert(room.id, room.clone());
            Ok(RoomInsertOutcome::Created(room))
        })
    }

    fn record_activity(
        &self,
        id: RoomId,
        summary: String,
        at: Timestamp,
    ) -> RepositoryFuture<()> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let room = state.rooms.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            room.record_message(summary, at);
            Ok(())
        })
    }

    fn close(&self, id: RoomId, at: Timestamp) -> RepositoryFuture<()> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let room = state.rooms.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            room.close(at);
            Ok(())
        })
    }

    fn list_for_user(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> RepositoryFuture<Vec<ChatRoom>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut rooms: Vec<ChatRoom> = state
                .rooms
                .values()
                .filter(|room| room.is_member(user_id))
                .filter(|room| !active_only || room.is_active())
                .cloned()
                .collect();
            rooms.sort_by(|a, b| {
                let a_at = a.last_message_at.unwrap_or(a.created_at);
                let b_at = b.last_message_at.unwrap_or(b.created_at);
                b_at.cmp(&a_at)
            });
            Ok(rooms)
        })
    }
}

impl MessageRepository for InMemoryStore {
    fn append(&self, message: NewMessage) -> RepositoryFuture<Message> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let id = MessageId(next_id(&mut state.next_message_id));
            let message = Message::from_new(id, message);
            let room_messages = state.messages.entry(message.room_id).or_default();
            // 保持 (created_at, id) 升序
            let position = room_messages
                .partition_point(|existing| existing.created_at <= message.created_at);
            room_messages.insert(position, message.clone());
            Ok(message)
        })
    }

    fn list_by_room(&self, room_id: RoomId, page: Option<Page>) -> RepositoryFuture<Vec<Message>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let Some(messages) = state.messages.get(&room_id) else {
                return Ok(Vec::new());
            };
            let listed = match page {
                Some(page) => messages
                    .iter()
                    .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                    .take(page.size as usize)
                    .cloned()
                    .collect(),
                None => messages.clone(),
            };
            Ok(listed)
        })
    }

    fn latest_created_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>> {
        let state = self.state.clone();
        Box::pin(async move {
            Ok(state
                .read()
                .await
                .messages
                .get(&room_id)
                .and_then(|messages| messages.last())
                .map(|message| message.created_at))
        })
    }

    fn mark_read(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let marked = state
                .messages
                .get_mut(&room_id)
                .map(|messages| {
                    messages
                        .iter_mut()
                        .map(|message| message.mark_read_by(reader))
                        .filter(|marked| *marked)
                        .count() as u64
                })
                .unwrap_or(0);
            Ok(marked)
        })
    }

    fn count_unread(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let unread = state
                .messages
                .get(&room_id)
                .map(|messages| {
                    messages
                        .iter()
                        .filter(|message| message.sender_id != reader && !message.is_read_by(reader))
                        .count() as u64
                })
                .unwrap_or(0);
            Ok(unread)
        })
    }
}

impl ListingRepository for InMemoryStore {
    fn find_by_id(&self, id: ListingId) -> RepositoryFuture<Option<Listing>> {
        let state = self.state.clone();
        Box::pin(async move { Ok(state.read().await.listings.get(&id).cloned()) })
    }
}

impl ApprovalRepository for InMemoryStore {
    fn find(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ApprovalRequest>> {
        let state = self.state.clone();
        Box::pin(async move {
            Ok(state
                .read()
                .await
                .approvals
                .get(&(listing_id, requester_id))
                .cloned())
        })
    }

    fn create_if_absent(
        &self,
        request: ApprovalRequest,
    ) -> RepositoryFuture<(ApprovalRequest, bool)> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let key = (request.listing_id, request.requester_id);
            if let Some(existing) = state.approvals.get(&key) {
                return Ok((existing.clone(), false));
            }
            state.approvals.insert(key, request.clone());
            Ok((request, true))
        })
    }

    fn commit_approval(
        &self,
        request: ApprovalRequest,
        listing: Listing,
        expected_participants: u32,
    ) -> RepositoryFuture<()> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let key = (request.listing_id, request.requester_id);

            let pending = state
                .approvals
                .get(&key)
                .is_some_and(ApprovalRequest::is_pending);
            let counter_matches = state
                .listings
                .get(&listing.id)
                .is_some_and(|current| current.participants == expected_participants);
            if !pending || !counter_matches {
                return Err(RepositoryError::Conflict);
            }

            state.approvals.insert(key, request);
            state.listings.insert(listing.id, listing);
            Ok(())
        })
    }

    fn commit_rejection(&self, request: ApprovalRequest) -> RepositoryFuture<()> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            match state
                .approvals
                .get_mut(&(request.listing_id, request.requester_id))
            {
                Some(current) if current.is_pending() => {
                    *current = request;
                    Ok(())
                }
                _ => Err(RepositoryError::Conflict),
            }
        })
    }
}

impl LocationRepository for InMemoryStore {
    fn append(&self, ping: NewLocationPing) -> RepositoryFuture<LocationPing> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let id = LocationPingId(next_id(&mut state.next_location_id));
            let ping = LocationPing::from_new(id, ping);
            state
                .locations
                .entry(ping.room_id)
                .or_default()
                .push(ping.clone());
            Ok(ping)
        })
    }

    fn latest_per_sender(&self, room_id: RoomId) -> RepositoryFuture<Vec<LocationPing>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let pings = state.locations.get(&room_id).cloned().unwrap_or_default();
            Ok(latest_per_sender(pings))
        })
    }

    fn latest_for(
        &self,
        room_id: RoomId,
        sender_id: UserId,
    ) -> RepositoryFuture<Option<LocationPing>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state.locations.get(&room_id).and_then(|pings| {
                pings
                    .iter()
                    .filter(|ping| ping.sender_id == sender_id)
                    .max_by_key(|ping| (ping.captured_at, ping.id))
                    .cloned()
            }))
        })
    }

    fn latest_captured_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            Ok(state
                .locations
                .get(&room_id)
                .and_then(|pings| pings.iter().map(|ping| ping.captured_at).max()))
        })
    }
}

impl NotificationRepository for InMemoryStore {
    fn insert(&self, notification: NewNotification) -> RepositoryFuture<Notification> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let id = NotificationId(next_id(&mut state.next_notification_id));
            let notification = Notification::from_new(id, notification);
            state.notifications.push(notification.clone());
            Ok(notification)
        })
    }

    fn list_for_recipient(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> RepositoryFuture<Vec<Notification>> {
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut listed: Vec<Notification> = state
                .notifications
                .iter()
                .filter(|notification| notification.recipient_id == recipient_id)
                .filter(|notification| !unread_only || !notification.read)
                .cloned()
                .collect();
            listed.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(listed)
        })
    }

    fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> RepositoryFuture<bool> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            match state
                .notifications
                .iter_mut()
                .find(|notification| notification.id == id)
            {
                Some(notification) if notification.recipient_id == recipient_id => {
                    notification.read = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}
