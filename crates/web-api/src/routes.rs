use application::{
    attachments::MAX_ATTACHMENT_BYTES, ApprovalDto, AttachmentUpload, ListingDto, LocationDto,
    MessageDto, NotificationDto, RoomDetailDto, RoomSummaryDto, SendMessageRequest,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use domain::{
    DomainError, ListingId, MessageBody, MessageContent, NotificationId, Page, RoomId, UserId,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    auth::AuthUser,
    error::ApiError,
    extract::{ApiJson, ApiMultipart, ApiPath, ApiQuery},
    response::ApiResponse,
    state::AppState,
    ws_connection::websocket_upgrade,
};

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    listing_id: ListingId,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
}

#[derive(Debug, Serialize)]
struct ApprovalResult {
    request: ApprovalDto,
    listing: ListingDto,
}

#[derive(Debug, Serialize)]
struct MarkReadResult {
    marked: u64,
}

#[derive(Debug, Serialize)]
struct LogoutResult {
    revoked: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/chat/rooms", post(create_room).get(list_rooms))
        .route("/chat/rooms/active", get(list_active_rooms))
        .route("/chat/rooms/listing/{listing_id}", get(room_for_listing))
        .route("/chat/rooms/{room_id}", get(room_detail))
        .route("/chat/rooms/{room_id}/approve", post(approve_join))
        .route("/chat/rooms/{room_id}/reject", post(reject_join))
        .route(
            "/chat/rooms/{room_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/chat/rooms/{room_id}/messages/read", put(mark_read))
        .route(
            "/chat/rooms/{room_id}/images",
            post(send_image).layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BYTES + 64 * 1024)),
        )
        .route("/chat/rooms/{room_id}/locations", get(recent_locations))
        .route(
            "/chat/rooms/{room_id}/locations/{user_id}",
            get(last_location),
        )
        .route("/listings/{listing_id}/requests", post(request_join))
        .route("/notifications", get(list_notifications))
        .route("/notifications/{notification_id}/read", put(mark_notification_read))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<LogoutResult>, ApiError> {
    let revoked = state
        .core
        .sessions
        .revoke(&user.token)
        .map_err(application::ApplicationError::from)?;
    tracing::info!(user_id = %user.user_id, "用户已登出");
    Ok(ApiResponse::with_message("logged out", LogoutResult { revoked }))
}

async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateRoomPayload>,
) -> Result<ApiResponse<RoomSummaryDto>, ApiError> {
    let rooms = &state.core.rooms;
    let room = rooms
        .resolve_or_create(payload.listing_id, user.user_id)
        .await?;
    Ok(ApiResponse::ok(rooms.summarize(&room, user.user_id).await?))
}

async fn list_rooms(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<RoomSummaryDto>>, ApiError> {
    let rooms = state.core.rooms.list_rooms(user.user_id, false).await?;
    Ok(ApiResponse::ok(rooms))
}

async fn list_active_rooms(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<RoomSummaryDto>>, ApiError> {
    let rooms = state.core.rooms.list_rooms(user.user_id, true).await?;
    Ok(ApiResponse::ok(rooms))
}

/// 调用者在某个物品下的进行中房间
async fn room_for_listing(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(listing_id): ApiPath<ListingId>,
) -> Result<ApiResponse<RoomSummaryDto>, ApiError> {
    let rooms = &state.core.rooms;
    let room = rooms
        .find_active(listing_id, user.user_id)
        .await?
        .ok_or_else(|| application::ApplicationError::from(DomainError::RoomNotFound))?;
    Ok(ApiResponse::ok(rooms.summarize(&room, user.user_id).await?))
}

/// 查看详情同时把对方的消息标记为已读
async fn room_detail(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<ApiResponse<RoomDetailDto>, ApiError> {
    state.core.messages.mark_read(room_id, user.user_id).await?;
    let detail = state.core.rooms.room_detail(room_id, user.user_id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn approve_join(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<ApiResponse<ApprovalResult>, ApiError> {
    let outcome = state
        .core
        .approvals
        .approve_for_room(room_id, user.user_id)
        .await?;
    Ok(ApiResponse::with_message(
        "approved",
        ApprovalResult {
            request: ApprovalDto::from(&outcome.request),
            listing: ListingDto::from(&outcome.listing),
        },
    ))
}

async fn reject_join(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<ApiResponse<ApprovalDto>, ApiError> {
    let request = state
        .core
        .approvals
        .reject_for_room(room_id, user.user_id)
        .await?;
    Ok(ApiResponse::with_message("rejected", ApprovalDto::from(&request)))
}

async fn request_join(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(listing_id): ApiPath<ListingId>,
) -> Result<ApiResponse<ApprovalDto>, ApiError> {
    let request = state
        .core
        .approvals
        .request_join(listing_id, user.user_id)
        .await?;
    Ok(ApiResponse::ok(ApprovalDto::from(&request)))
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Vec<MessageDto>>, ApiError> {
    let page = Page::new(query.page, query.size);
    let messages = state
        .core
        .messages
        .list_messages(room_id, user.user_id, page)
        .await?;
    Ok(ApiResponse::ok(
        messages.iter().map(MessageDto::from).collect(),
    ))
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
    ApiJson(payload): ApiJson<SendMessagePayload>,
) -> Result<ApiResponse<MessageDto>, ApiError> {
    let content = MessageContent::parse(payload.content).map_err(application::ApplicationError::from)?;
    let message = state
        .core
        .messages
        .send(SendMessageRequest {
            room_id,
            sender_id: user.user_id,
            body: MessageBody::Text { content },
        })
        .await?;
    Ok(ApiResponse::ok(MessageDto::from(&message)))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<ApiResponse<MarkReadResult>, ApiError> {
    let marked = state.core.messages.mark_read(room_id, user.user_id).await?;
    Ok(ApiResponse::ok(MarkReadResult { marked }))
}

async fn send_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> Result<ApiResponse<MessageDto>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(format!("failed to read image: {err}")))?;
        upload = Some(AttachmentUpload {
            owner_id: user.user_id,
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("multipart field `image` is required"))?;
    let message = state
        .core
        .messages
        .send_image(room_id, user.user_id, upload)
        .await?;
    Ok(ApiResponse::ok(MessageDto::from(&message)))
}

async fn recent_locations(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<ApiResponse<Vec<LocationDto>>, ApiError> {
    state.core.rooms.authorize_member(room_id, user.user_id).await?;
    let pings = state.core.locations.recent(room_id).await?;
    Ok(ApiResponse::ok(pings.iter().map(LocationDto::from).collect()))
}

async fn last_location(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((room_id, sender_id)): ApiPath<(RoomId, UserId)>,
) -> Result<ApiResponse<LocationDto>, ApiError> {
    state.core.rooms.authorize_member(room_id, user.user_id).await?;
    let ping = state.core.locations.last(room_id, sender_id).await?;
    Ok(ApiResponse::ok(LocationDto::from(&ping)))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<ApiResponse<Vec<NotificationDto>>, ApiError> {
    let notifications = state
        .core
        .notifications
        .list(user.user_id, query.unread_only)
        .await?;
    Ok(ApiResponse::ok(notifications))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(notification_id): ApiPath<i64>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .core
        .notifications
        .mark_read(NotificationId(notification_id), user.user_id)
        .await?;
    Ok(ApiResponse::empty("notification marked as read"))
}
