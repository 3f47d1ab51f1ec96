//! 消息、位置与通知的端到端场景（进程内存储）

use std::sync::Arc;

use application::{ApplicationError, FanoutEvent, SendMessageRequest, Topic};
use chrono::Duration;
use futures::future::join_all;
use domain::{
    ChatRoom, DomainError, MessageBody, MessageContent, MockNotificationRepository,
    NotificationCategory, RepositoryError, UserId,
};
use tests::Harness;

async fn open_room(harness: &Harness, owner: UserId, requester: UserId) -> ChatRoom {
    let listing = harness.seed_listing(owner, 4).await;
    harness
        .core
        .rooms
        .resolve_or_create(listing.id, requester)
        .await
        .unwrap()
}

fn text(room: &ChatRoom, sender_id: UserId, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        room_id: room.id,
        sender_id,
        body: MessageBody::Text {
            content: MessageContent::parse(content).unwrap(),
        },
    }
}

#[tokio::test]
async fn frozen_or_rewound_clock_keeps_send_order() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;

    for index in 0..5 {
        harness
            .core
            .messages
            .send(text(&room, requester, &format!("m{index}")))
            .await
            .unwrap();
    }
    harness.clock.advance(Duration::seconds(-30));
    harness
        .core
        .messages
        .send(text(&room, owner, "m5"))
        .await
        .unwrap();

    let history = harness
        .core
        .messages
        .list_messages(room.id, owner, None)
        .await
        .unwrap();
    let contents: Vec<_> = history
        .iter()
        .map(|message| message.body.summary_source().to_string())
        .collect();
    assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4", "m5"]);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].created_at < pair[1].created_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_are_delivered_in_commit_order() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;

    let (ctx, mut deliveries) = harness.core.gate.open(owner).await;
    harness.core.gate.subscribe_room(&ctx, room.id).await.unwrap();

    let tasks: Vec<_> = [owner, requester]
        .into_iter()
        .map(|sender| {
            let messages = harness.core.messages.clone();
            let room = room.clone();
            tokio::spawn(async move {
                for index in 0..20 {
                    messages
                        .send(text(&room, sender, &format!("{sender}-{index}")))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for joined in join_all(tasks).await {
        joined.unwrap();
    }

    let room_topic = Topic::Room(room.id).to_string();
    let mut delivered = Vec::new();
    while delivered.len() < 40 {
        let delivery = deliveries.recv().await.unwrap();
        if delivery.topic != room_topic {
            continue;
        }
        if let FanoutEvent::ChatMessage { message } = delivery.event {
            delivered.push(message);
        }
    }
    assert!(delivered
        .windows(2)
        .all(|pair| pair[0].created_at < pair[1].created_at));

    // 投递顺序与历史顺序一致
    let history = harness
        .core
        .messages
        .list_messages(room.id, owner, None)
        .await
        .unwrap();
    let history_ids: Vec<_> = history.iter().map(|message| message.id.0).collect();
    let delivered_ids: Vec<_> = delivered.iter().map(|message| message.id).collect();
    assert_eq!(history_ids, delivered_ids);
}

#[tokio::test]
async fn marking_read_is_idempotent() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;

    for content in ["one", "two", "three"] {
        harness
            .core
            .messages
            .send(text(&room, requester, content))
            .await
            .unwrap();
    }

    let summary = harness.core.rooms.summarize(&room, owner).await.unwrap();
    assert_eq!(summary.unread_count, 3);

    assert_eq!(harness.core.messages.mark_read(room.id, owner).await.unwrap(), 3);
    assert_eq!(harness.core.messages.mark_read(room.id, owner).await.unwrap(), 0);
    // 自己发的消息不算未读
    assert_eq!(harness.core.messages.mark_read(room.id, requester).await.unwrap(), 0);

    let summary = harness.core.rooms.summarize(&room, owner).await.unwrap();
    assert_eq!(summary.unread_count, 0);
}

#[tokio::test]
async fn closed_rooms_reject_messages_and_locations() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;
    harness.core.rooms.close(room.id).await.unwrap();

    let result = harness
        .core
        .messages
        .send(text(&room, requester, "anyone there?"))
        .await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::RoomClosed))
    ));

    let location = harness
        .core
        .locations
        .publish(requester, room.id, 37.56, 126.97)
        .await;
    assert!(matches!(
        location,
        Err(ApplicationError::Domain(DomainError::RoomClosed))
    ));
    assert!(harness.core.locations.recent(room.id).await.unwrap().is_empty());

    let outsider = harness
        .core
        .messages
        .list_messages(room.id, UserId::generate(), None)
        .await;
    assert!(matches!(
        outsider,
        Err(ApplicationError::Domain(DomainError::NotARoomMember))
    ));
}

#[tokio::test]
async fn subscribers_receive_messages_over_their_queue() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;

    let (ctx, mut deliveries) = harness.core.gate.open(owner).await;
    harness.core.gate.subscribe_room(&ctx, room.id).await.unwrap();

    harness
        .core
        .messages
        .send(text(&room, requester, "on my way"))
        .await
        .unwrap();

    let delivery = deliveries.recv().await.unwrap();
    assert_eq!(delivery.topic, Topic::Room(room.id).to_string());
    match delivery.event {
        FanoutEvent::ChatMessage { message } => {
            assert_eq!(message.content.as_deref(), Some("on my way"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // 随后是发给发布者本人的消息通知
    let delivery = deliveries.recv().await.unwrap();
    assert_eq!(delivery.topic, Topic::User(owner).to_string());
    assert!(matches!(delivery.event, FanoutEvent::Notification { .. }));

    harness.core.gate.close(&ctx).await;
    assert!(harness.core.gate.registry().is_empty());
}

#[tokio::test]
async fn latest_location_per_sender() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;
    let locations = &harness.core.locations;

    locations.publish(requester, room.id, 37.50, 127.00).await.unwrap();
    harness.clock.advance(Duration::seconds(5));
    locations.publish(requester, room.id, 37.51, 127.01).await.unwrap();
    locations.publish(owner, room.id, 35.10, 129.04).await.unwrap();

    let recent = locations.recent(room.id).await.unwrap();
    assert_eq!(recent.len(), 2);

    let last = locations.last(room.id, requester).await.unwrap();
    assert_eq!(last.latitude, 37.51);
    assert_eq!(last.longitude, 127.01);

    let invalid = locations.publish(requester, room.id, 91.0, 0.0).await;
    assert!(matches!(
        invalid,
        Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
    ));

    let missing = locations.last(room.id, UserId::generate()).await;
    assert!(matches!(
        missing,
        Err(ApplicationError::Domain(DomainError::LocationNotFound))
    ));

    let notifications = harness.core.notifications.list(owner, true).await.unwrap();
    assert!(notifications
        .iter()
        .any(|notification| notification.category == NotificationCategory::LocationShare));
}

#[tokio::test]
async fn notification_store_failure_does_not_fail_the_send() {
    let mut failing = MockNotificationRepository::new();
    failing
        .expect_insert()
        .returning(|_| -> domain::RepositoryFuture<domain::Notification> {
            Box::pin(async { Err(RepositoryError::storage("notification table unavailable")) })
        });
    let harness = Harness::with_notifications(Arc::new(failing));
    let owner = UserId::generate();
    let requester = UserId::generate();
    let room = open_room(&harness, owner, requester).await;

    let message = harness
        .core
        .messages
        .send(text(&room, requester, "still delivered"))
        .await
        .unwrap();

    let history = harness
        .core
        .messages
        .list_messages(room.id, requester, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, message.id);
}
