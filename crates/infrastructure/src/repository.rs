use std::sync::Arc;

use application::Repositories;
use domain::{
    ApprovalRepository, ApprovalRequest, ApprovalStatus, AttachmentRef, ChatRoom,
    ChatRoomRepository, Listing, ListingId, ListingRepository, LocationPing, LocationPingId,
    LocationRepository, Message, MessageBody, MessageContent, MessageId, MessageRepository,
    NewLocationPing, NewMessage, NewNotification, Notification, NotificationCategory,
    NotificationId, NotificationRepository, Page, RepositoryError, RepositoryFuture, RoomId,
    RoomInsertOutcome, RoomStatus, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_i32(value: u32, field: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{field} out of range: {value}")))
}

fn to_u32(value: i32, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| invalid_data(format!("negative {field}: {value}")))
}

const ROOM_COLUMNS: &str = "id, listing_id, requester_id, counterparty_id, status, \
     last_message_summary, last_message_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    listing_id: Uuid,
    requester_id: Uuid,
    counterparty_id: Uuid,
    status: String,
    last_message_summary: Option<String>,
    last_message_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<RoomRecord> for ChatRoom {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        let status = RoomStatus::parse(&value.status)
            .map_err(|_| invalid_data(format!("unknown room status: {}", value.status)))?;
        Ok(ChatRoom {
            id: RoomId::from(value.id),
            listing_id: ListingId::from(value.listing_id),
            requester_id: UserId::from(value.requester_id),
            counterparty_id: UserId::from(value.counterparty_id),
            status,
            last_message_summary: value.last_message_summary,
            last_message_at: value.last_message_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: Uuid,
    sender_id: Uuid,
    kind: String,
    content: Option<String>,
    attachment: Option<String>,
    created_at: Timestamp,
    read_by: Vec<Uuid>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = message_body(&value.kind, value.content, value.attachment)?;
        Ok(Message {
            id: MessageId(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: UserId::from(value.sender_id),
            body,
            created_at: value.created_at,
            read_by: value.read_by.into_iter().map(UserId::from).collect(),
        })
    }
}

fn message_body(
    kind: &str,
    content: Option<String>,
    attachment: Option<String>,
) -> Result<MessageBody, RepositoryError> {
    match (kind, content, attachment) {
        ("TEXT", Some(content), _) => Ok(MessageBody::Text {
            content: MessageContent::parse(content).map_err(|err| invalid_data(err.to_string()))?,
        }),
        ("IMAGE", _, Some(attachment)) => Ok(MessageBody::Image {
            attachment: AttachmentRef::parse(attachment)
                .map_err(|err| invalid_data(err.to_string()))?,
        }),
        (kind, _, _) => Err(invalid_data(format!("malformed message row of kind {kind}"))),
    }
}

fn body_columns(body: &MessageBody) -> (Option<&str>, Option<&str>) {
    match body {
        MessageBody::Text { content } => (Some(content.as_str()), None),
        MessageBody::Image { attachment } => (None, Some(attachment.as_str())),
    }
}

#[derive(Debug, FromRow)]
struct ListingRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    capacity: i32,
    participants: i32,
    visible: bool,
}

impl TryFrom<ListingRecord> for Listing {
    type Error = RepositoryError;

    fn try_from(value: ListingRecord) -> Result<Self, Self::Error> {
        Ok(Listing {
            id: ListingId::from(value.id),
            owner_id: UserId::from(value.owner_id),
            title: value.title,
            capacity: to_u32(value.capacity, "capacity")?,
            participants: to_u32(value.participants, "participants")?,
            visible: value.visible,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApprovalRecord {
    listing_id: Uuid,
    requester_id: Uuid,
    status: String,
    decided_by: Option<Uuid>,
    decided_at: Option<Timestamp>,
    requested_at: Timestamp,
}

impl TryFrom<ApprovalRecord> for ApprovalRequest {
    type Error = RepositoryError;

    fn try_from(value: ApprovalRecord) -> Result<Self, Self::Error> {
        let status = ApprovalStatus::parse(&value.status)
            .map_err(|_| invalid_data(format!("unknown approval status: {}", value.status)))?;
        Ok(ApprovalRequest {
            listing_id: ListingId::from(value.listing_id),
            requester_id: UserId::from(value.requester_id),
            status,
            decided_by: value.decided_by.map(UserId::from),
            decided_at: value.decided_at,
            requested_at: value.requested_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LocationRecord {
    id: i64,
    room_id: Uuid,
    sender_id: Uuid,
    latitude: f64,
    longitude: f64,
    captured_at: Timestamp,
}

impl From<LocationRecord> for LocationPing {
    fn from(value: LocationRecord) -> Self {
        LocationPing {
            id: LocationPingId(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: UserId::from(value.sender_id),
            latitude: value.latitude,
            longitude: value.longitude,
            captured_at: value.captured_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRecord {
    id: i64,
    recipient_id: Uuid,
    message: String,
    category: String,
    related_room_id: Option<Uuid>,
    related_listing_id: Option<Uuid>,
    created_at: Timestamp,
    read: bool,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = RepositoryError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        let category = NotificationCategory::parse(&value.category).map_err(|_| {
            invalid_data(format!("unknown notification category: {}", value.category))
        })?;
        Ok(Notification {
            id: NotificationId(value.id),
            recipient_id: UserId::from(value.recipient_id),
            message: value.message,
            category,
            related_room_id: value.related_room_id.map(RoomId::from),
            related_listing_id: value.related_listing_id.map(ListingId::from),
            created_at: value.created_at,
            read: value.read,
        })
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_active_room(
    pool: &PgPool,
    listing_id: ListingId,
    requester_id: UserId,
) -> Result<Option<ChatRoom>, RepositoryError> {
    let record = sqlx::query_as::<_, RoomRecord>(&format!(
        "SELECT {ROOM_COLUMNS} FROM chat_rooms \
         WHERE listing_id = $1 AND requester_id = $2 AND status = 'ACTIVE'"
    ))
    .bind(Uuid::from(listing_id))
    .bind(Uuid::from(requester_id))
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_err)?;

    record.map(ChatRoom::try_from).transpose()
}

impl ChatRoomRepository for PgChatRoomRepository {
    fn find_by_id(&self, id: RoomId) -> RepositoryFuture<Option<ChatRoom>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let record = sqlx::query_as::<_, RoomRecord>(&format!(
                "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = $1"
            ))
            .bind(Uuid::from(id))
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            record.map(ChatRoom::try_from).transpose()
        })
    }

    fn find_active_by_pair(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ChatRoom>> {
        let pool = self.pool.clone();
        Box::pin(async move { fetch_active_room(&pool, listing_id, requester_id).await })
    }

    fn insert_if_absent(&self, room: ChatRoom) -> RepositoryFuture<RoomInsertOutcome> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let inserted = sqlx::query_as::<_, RoomRecord>(&format!(
                r#"
                INSERT INTO chat_rooms ({ROOM_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (listing_id, requester_id) WHERE status = 'ACTIVE' DO NOTHING
                RETURNING {ROOM_COLUMNS}
                "#
            ))
            .bind(Uuid::from(room.id))
            .bind(Uuid::from(room.listing_id))
            .bind(Uuid::from(room.requester_id))
            .bind(Uuid::from(room.counterparty_id))
            .bind(room.status.as_str())
            .bind(room.last_message_summary.as_deref())
            .bind(room.last_message_at)
            .bind(room.created_at)
            .bind(room.updated_at)
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            if let Some(record) = inserted {
                return Ok(RoomInsertOutcome::Created(ChatRoom::try_from(record)?));
            }

            // 冲突：返回占用该键的 ACTIVE 房间
            match fetch_active_room(&pool, room.listing_id, room.requester_id).await? {
                Some(existing) => Ok(RoomInsertOutcome::Existing(existing)),
                None => Err(RepositoryError::Conflict),
            }
        })
    }

    fn record_activity(
        &self,
        id: RoomId,
        summary: String,
        at: Timestamp,
    ) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE chat_rooms
                SET last_message_summary = $2, last_message_at = $3, updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(Uuid::from(id))
            .bind(summary)
            .bind(at)
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        })
    }

    fn close(&self, id: RoomId, at: Timestamp) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE chat_rooms SET status = 'CLOSED', updated_at = $2 WHERE id = $1",
            )
            .bind(Uuid::from(id))
            .bind(at)
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        })
    }

    fn list_for_user(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> RepositoryFuture<Vec<ChatRoom>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let records = sqlx::query_as::<_, RoomRecord>(&format!(
                r#"
                SELECT {ROOM_COLUMNS} FROM chat_rooms
                WHERE (requester_id = $1 OR counterparty_id = $1)
                  AND ($2 = FALSE OR status = 'ACTIVE')
                ORDER BY COALESCE(last_message_at, created_at) DESC
                "#
            ))
            .bind(Uuid::from(user_id))
            .bind(active_only)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            records.into_iter().map(ChatRoom::try_from).collect()
        })
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MessageRepository for PgMessageRepository {
    fn append(&self, message: NewMessage) -> RepositoryFuture<Message> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let (content, attachment) = body_columns(&message.body);
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO messages (room_id, sender_id, kind, content, attachment, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                "#,
            )
            .bind(Uuid::from(message.room_id))
            .bind(Uuid::from(message.sender_id))
            .bind(message.body.kind())
            .bind(content)
            .bind(attachment)
            .bind(message.created_at)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(Message::from_new(MessageId(id), message))
        })
    }

    fn list_by_room(&self, room_id: RoomId, page: Option<Page>) -> RepositoryFuture<Vec<Message>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let limit = page.map(|page| i64::from(page.size));
            let offset = page
                .map(|page| i64::try_from(page.offset()).unwrap_or(i64::MAX))
                .unwrap_or(0);

            let records = sqlx::query_as::<_, MessageRecord>(
                r#"
                SELECT m.id, m.room_id, m.sender_id, m.kind, m.content, m.attachment, m.created_at,
                       COALESCE(
                           array_agg(r.user_id) FILTER (WHERE r.user_id IS NOT NULL),
                           '{}'::uuid[]
                       ) AS read_by
                FROM messages m
                LEFT JOIN message_reads r ON r.message_id = m.id
                WHERE m.room_id = $1
                GROUP BY m.id
                ORDER BY m.created_at ASC, m.id ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(Uuid::from(room_id))
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            records.into_iter().map(Message::try_from).collect()
        })
    }

    fn latest_created_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_scalar::<_, Option<Timestamp>>(
                "SELECT MAX(created_at) FROM messages WHERE room_id = $1",
            )
            .bind(Uuid::from(room_id))
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)
        })
    }

    fn mark_read(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO message_reads (message_id, user_id)
                SELECT id, $2 FROM messages
                WHERE room_id = $1 AND sender_id <> $2
                ON CONFLICT (message_id, user_id) DO NOTHING
                "#,
            )
            .bind(Uuid::from(room_id))
            .bind(Uuid::from(reader))
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(result.rows_affected())
        })
    }

    fn count_unread(&self, room_id: RoomId, reader: UserId) -> RepositoryFuture<u64> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM messages m
                WHERE m.room_id = $1
                  AND m.sender_id <> $2
                  AND NOT EXISTS (
                      SELECT 1 FROM message_reads r
                      WHERE r.message_id = m.id AND r.user_id = $2
                  )
                "#,
            )
            .bind(Uuid::from(room_id))
            .bind(Uuid::from(reader))
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(u64::try_from(count).unwrap_or_default())
        })
    }
}

#[derive(Clone)]
pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ListingRepository for PgListingRepository {
    fn find_by_id(&self, id: ListingId) -> RepositoryFuture<Option<Listing>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let record = sqlx::query_as::<_, ListingRecord>(
                r#"
                SELECT id, owner_id, title, capacity, participants, visible
                FROM listings WHERE id = $1
                "#,
            )
            .bind(Uuid::from(id))
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            record.map(Listing::try_from).transpose()
        })
    }
}

#[derive(Clone)]
pub struct PgApprovalRepository {
    pool: PgPool,
}

impl PgApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const APPROVAL_COLUMNS: &str =
    "listing_id, requester_id, status, decided_by, decided_at, requested_at";

impl ApprovalRepository for PgApprovalRepository {
    fn find(
        &self,
        listing_id: ListingId,
        requester_id: UserId,
    ) -> RepositoryFuture<Option<ApprovalRequest>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let record = sqlx::query_as::<_, ApprovalRecord>(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approval_requests \
                 WHERE listing_id = $1 AND requester_id = $2"
            ))
            .bind(Uuid::from(listing_id))
            .bind(Uuid::from(requester_id))
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            record.map(ApprovalRequest::try_from).transpose()
        })
    }

    fn create_if_absent(
        &self,
        request: ApprovalRequest,
    ) -> RepositoryFuture<(ApprovalRequest, bool)> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let inserted = sqlx::query_as::<_, ApprovalRecord>(&format!(
                r#"
                INSERT INTO approval_requests ({APPROVAL_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (listing_id, requester_id) DO NOTHING
                RETURNING {APPROVAL_COLUMNS}
                "#
            ))
            .bind(Uuid::from(request.listing_id))
            .bind(Uuid::from(request.requester_id))
            .bind(request.status.as_str())
            .bind(request.decided_by.map(Uuid::from))
            .bind(request.decided_at)
            .bind(request.requested_at)
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            if let Some(record) = inserted {
                return Ok((ApprovalRequest::try_from(record)?, true));
            }

            let existing = sqlx::query_as::<_, ApprovalRecord>(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approval_requests \
                 WHERE listing_id = $1 AND requester_id = $2"
            ))
            .bind(Uuid::from(request.listing_id))
            .bind(Uuid::from(request.requester_id))
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok((ApprovalRequest::try_from(existing)?, false))
        })
    }

    fn commit_approval(
        &self,
        request: ApprovalRequest,
        listing: Listing,
        expected_participants: u32,
    ) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(map_sqlx_err)?;

            let updated = sqlx::query(
                r#"
                UPDATE approval_requests
                SET status = $3, decided_by = $4, decided_at = $5
                WHERE listing_id = $1 AND requester_id = $2 AND status = 'PENDING'
                "#,
            )
            .bind(Uuid::from(request.listing_id))
            .bind(Uuid::from(request.requester_id))
            .bind(request.status.as_str())
            .bind(request.decided_by.map(Uuid::from))
            .bind(request.decided_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
            if updated.rows_affected() != 1 {
                tx.rollback().await.map_err(map_sqlx_err)?;
                return Err(RepositoryError::Conflict);
            }

            let updated = sqlx::query(
                r#"
                UPDATE listings SET participants = $2, visible = $3
                WHERE id = $1 AND participants = $4
                "#,
            )
            .bind(Uuid::from(listing.id))
            .bind(to_i32(listing.participants, "participants")?)
            .bind(listing.visible)
            .bind(to_i32(expected_participants, "participants")?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
            if updated.rows_affected() != 1 {
                tx.rollback().await.map_err(map_sqlx_err)?;
                return Err(RepositoryError::Conflict);
            }

            tx.commit().await.map_err(map_sqlx_err)
        })
    }

    fn commit_rejection(&self, request: ApprovalRequest) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let updated = sqlx::query(
                r#"
                UPDATE approval_requests
                SET status = $3, decided_by = $4, decided_at = $5
                WHERE listing_id = $1 AND requester_id = $2 AND status = 'PENDING'
                "#,
            )
            .bind(Uuid::from(request.listing_id))
            .bind(Uuid::from(request.requester_id))
            .bind(request.status.as_str())
            .bind(request.decided_by.map(Uuid::from))
            .bind(request.decided_at)
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

            if updated.rows_affected() != 1 {
                return Err(RepositoryError::Conflict);
            }
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct PgLocationRepository {
    pool: PgPool,
}

impl PgLocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl LocationRepository for PgLocationRepository {
    fn append(&self, ping: NewLocationPing) -> RepositoryFuture<LocationPing> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO location_pings (room_id, sender_id, latitude, longitude, captured_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(Uuid::from(ping.room_id))
            .bind(Uuid::from(ping.sender_id))
            .bind(ping.coordinates.latitude)
            .bind(ping.coordinates.longitude)
            .bind(ping.captured_at)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(LocationPing::from_new(LocationPingId(id), ping))
        })
    }

    fn latest_per_sender(&self, room_id: RoomId) -> RepositoryFuture<Vec<LocationPing>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let records = sqlx::query_as::<_, LocationRecord>(
                r#"
                SELECT DISTINCT ON (sender_id)
                       id, room_id, sender_id, latitude, longitude, captured_at
                FROM location_pings
                WHERE room_id = $1
                ORDER BY sender_id, captured_at DESC, id DESC
                "#,
            )
            .bind(Uuid::from(room_id))
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(records.into_iter().map(LocationPing::from).collect())
        })
    }

    fn latest_for(
        &self,
        room_id: RoomId,
        sender_id: UserId,
    ) -> RepositoryFuture<Option<LocationPing>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let record = sqlx::query_as::<_, LocationRecord>(
                r#"
                SELECT id, room_id, sender_id, latitude, longitude, captured_at
                FROM location_pings
                WHERE room_id = $1 AND sender_id = $2
                ORDER BY captured_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(Uuid::from(room_id))
            .bind(Uuid::from(sender_id))
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(record.map(LocationPing::from))
        })
    }

    fn latest_captured_at(&self, room_id: RoomId) -> RepositoryFuture<Option<Timestamp>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_scalar::<_, Option<Timestamp>>(
                "SELECT MAX(captured_at) FROM location_pings WHERE room_id = $1",
            )
            .bind(Uuid::from(room_id))
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)
        })
    }
}

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NotificationRepository for PgNotificationRepository {
    fn insert(&self, notification: NewNotification) -> RepositoryFuture<Notification> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO notifications
                    (recipient_id, message, category, related_room_id, related_listing_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                "#,
            )
            .bind(Uuid::from(notification.recipient_id))
            .bind(notification.message.as_str())
            .bind(notification.category.as_str())
            .bind(notification.related_room_id.map(Uuid::from))
            .bind(notification.related_listing_id.map(Uuid::from))
            .bind(notification.created_at)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(Notification::from_new(NotificationId(id), notification))
        })
    }

    fn list_for_recipient(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> RepositoryFuture<Vec<Notification>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let records = sqlx::query_as::<_, NotificationRecord>(
                r#"
                SELECT id, recipient_id, message, category, related_room_id,
                       related_listing_id, created_at, read
                FROM notifications
                WHERE recipient_id = $1 AND ($2 = FALSE OR read = FALSE)
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .bind(Uuid::from(recipient_id))
            .bind(unread_only)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_err)?;

            records.into_iter().map(Notification::try_from).collect()
        })
    }

    fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> RepositoryFuture<bool> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2",
            )
            .bind(id.0)
            .bind(Uuid::from(recipient_id))
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

            Ok(result.rows_affected() > 0)
        })
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub listing_repository: Arc<PgListingRepository>,
    pub approval_repository: Arc<PgApprovalRepository>,
    pub location_repository: Arc<PgLocationRepository>,
    pub notification_repository: Arc<PgNotificationRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            listing_repository: Arc::new(PgListingRepository::new(pool.clone())),
            approval_repository: Arc::new(PgApprovalRepository::new(pool.clone())),
            location_repository: Arc::new(PgLocationRepository::new(pool.clone())),
            notification_repository: Arc::new(PgNotificationRepository::new(pool.clone())),
            pool,
        }
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            rooms: self.room_repository.clone(),
            messages: self.message_repository.clone(),
            listings: self.listing_repository.clone(),
            approvals: self.approval_repository.clone(),
            locations: self.location_repository.clone(),
            notifications: self.notification_repository.clone(),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
