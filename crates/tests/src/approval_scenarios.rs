//! 加入审批与房间创建的并发场景

use application::ApplicationError;
use futures::future::join_all;
use domain::{
    ApprovalRepository, ApprovalStatus, DomainError, NotificationCategory, RoomStatus, UserId,
};
use tests::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_one_listing_admits_exactly_one_concurrent_approval() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let listing = harness.seed_listing(owner, 1).await;
    let first = UserId::generate();
    let second = UserId::generate();

    for requester in [first, second] {
        harness
            .core
            .approvals
            .request_join(listing.id, requester)
            .await
            .unwrap();
    }

    let listing_id = listing.id;
    let tasks = [first, second].map(|requester| {
        let approvals = harness.core.approvals.clone();
        tokio::spawn(async move { approvals.approve(listing_id, requester, owner).await })
    });
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    let loser = if outcomes[0].is_ok() { second } else { first };
    let failure = outcomes.iter().find_map(|outcome| outcome.as_ref().err());
    assert!(matches!(
        failure,
        Some(ApplicationError::Domain(DomainError::ListingFull))
    ));

    let stored = harness.store.listing(listing.id).await.unwrap();
    assert_eq!(stored.participants, 1);
    assert!(!stored.visible);

    let pending = ApprovalRepository::find(&harness.store, listing.id, loser)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, ApprovalStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_exceed_capacity() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let listing = harness.seed_listing(owner, 3).await;
    let requesters: Vec<_> = (0..8).map(|_| UserId::generate()).collect();

    for requester in &requesters {
        harness
            .core
            .approvals
            .request_join(listing.id, *requester)
            .await
            .unwrap();
    }

    let listing_id = listing.id;
    let tasks: Vec<_> = requesters
        .iter()
        .map(|requester| {
            let approvals = harness.core.approvals.clone();
            let requester = *requester;
            tokio::spawn(async move { approvals.approve(listing_id, requester, owner).await })
        })
        .collect();
    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 3);
    assert!(outcomes.iter().filter_map(|outcome| outcome.as_ref().err()).all(|err| matches!(
        err,
        ApplicationError::Domain(DomainError::ListingFull)
    )));

    let stored = harness.store.listing(listing.id).await.unwrap();
    assert_eq!(stored.participants, 3);
    assert!(!stored.visible);

    let mut approved = 0;
    for requester in &requesters {
        let request = ApprovalRepository::find(&harness.store, listing.id, *requester)
            .await
            .unwrap()
            .unwrap();
        if request.status == ApprovalStatus::Approved {
            approved += 1;
        }
    }
    assert_eq!(approved, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_room_creation_resolves_to_one_room() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let listing = harness.seed_listing(owner, 3).await;

    let listing_id = listing.id;
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let rooms = harness.core.rooms.clone();
            tokio::spawn(async move { rooms.resolve_or_create(listing_id, requester).await })
        })
        .collect();

    let mut room_ids: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();
    room_ids.dedup();
    assert_eq!(room_ids.len(), 1);

    // 只有真正创建的那一次会通知发布者
    let notifications = harness.core.notifications.list(owner, false).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].category, NotificationCategory::RoomCreated);
    assert_eq!(notifications[0].related_room_id, Some(room_ids[0]));
}

#[tokio::test]
async fn rejection_closes_the_room_and_a_new_one_can_be_opened() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let listing = harness.seed_listing(owner, 3).await;

    let room = harness
        .core
        .rooms
        .resolve_or_create(listing.id, requester)
        .await
        .unwrap();
    harness
        .core
        .approvals
        .request_join(listing.id, requester)
        .await
        .unwrap();

    let rejected = harness
        .core
        .approvals
        .reject_for_room(room.id, owner)
        .await
        .unwrap();
    assert_eq!(rejected.status, ApprovalStatus::Rejected);

    let closed = harness.core.rooms.find(room.id).await.unwrap();
    assert_eq!(closed.status, RoomStatus::Closed);

    // 人数不变
    let stored = harness.store.listing(listing.id).await.unwrap();
    assert_eq!(stored.participants, 0);

    let reopened = harness
        .core
        .rooms
        .resolve_or_create(listing.id, requester)
        .await
        .unwrap();
    assert_ne!(reopened.id, room.id);

    let notifications = harness
        .core
        .notifications
        .list(requester, false)
        .await
        .unwrap();
    assert_eq!(notifications[0].category, NotificationCategory::JoinRejected);
}

#[tokio::test]
async fn only_the_owner_decides_and_only_once() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let requester = UserId::generate();
    let listing = harness.seed_listing(owner, 2).await;
    harness
        .core
        .approvals
        .request_join(listing.id, requester)
        .await
        .unwrap();

    let stranger = harness
        .core
        .approvals
        .approve(listing.id, requester, UserId::generate())
        .await;
    assert!(matches!(
        stranger,
        Err(ApplicationError::Domain(DomainError::NotListingOwner))
    ));

    let outcome = harness
        .core
        .approvals
        .approve(listing.id, requester, owner)
        .await
        .unwrap();
    assert_eq!(outcome.request.status, ApprovalStatus::Approved);
    assert_eq!(outcome.listing.participants, 1);
    assert!(outcome.listing.visible);

    let again = harness
        .core
        .approvals
        .reject(listing.id, requester, owner)
        .await;
    assert!(matches!(
        again,
        Err(ApplicationError::Domain(DomainError::AlreadyDecided))
    ));
}

#[tokio::test]
async fn hidden_listing_stays_open_to_approved_requesters_only() {
    let harness = Harness::new();
    let owner = UserId::generate();
    let approved = UserId::generate();
    let listing = harness.seed_listing(owner, 1).await;

    harness
        .core
        .approvals
        .request_join(listing.id, approved)
        .await
        .unwrap();
    harness
        .core
        .approvals
        .approve(listing.id, approved, owner)
        .await
        .unwrap();

    assert!(harness
        .core
        .rooms
        .resolve_or_create(listing.id, approved)
        .await
        .is_ok());

    let latecomer = harness
        .core
        .rooms
        .resolve_or_create(listing.id, UserId::generate())
        .await;
    assert!(matches!(
        latecomer,
        Err(ApplicationError::Domain(DomainError::ListingClosed))
    ));
}
