mod support;

use domain::UserId;
use serde_json::json;

use support::TestApp;

#[tokio::test]
async fn room_approval_and_messaging_flow() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester = UserId::generate();
    let owner_token = app.token_for(owner);
    let requester_token = app.token_for(requester);
    let listing = app.seed_listing(owner, 1).await;

    // 申请加入
    let (status, body) = app
        .post_json(
            &format!("/listings/{listing}/requests"),
            &requester_token,
            json!({}),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["status"], "PENDING");

    // 重复打开返回同一个房间
    let room_id = app.open_room(listing, &requester_token).await;
    assert_eq!(app.open_room(listing, &requester_token).await, room_id);

    // 非发布者不能审批
    let (status, body) = app
        .post_json(
            &format!("/chat/rooms/{room_id}/approve"),
            &requester_token,
            json!({}),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 403);

    let (status, body) = app
        .post_json(
            &format!("/chat/rooms/{room_id}/approve"),
            &owner_token,
            json!({}),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["request"]["status"], "APPROVED");
    assert_eq!(body["data"]["listing"]["participants"], 1);
    assert_eq!(body["data"]["listing"]["visible"], false);

    // 再次审批
    let (status, body) = app
        .post_json(
            &format!("/chat/rooms/{room_id}/approve"),
            &owner_token,
            json!({}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error_code"], "ALREADY_DECIDED");

    let (status, _) = app
        .post_json(
            &format!("/chat/rooms/{room_id}/messages"),
            &requester_token,
            json!({ "content": "see you at seven" }),
        )
        .await;
    assert_eq!(status, 200);

    // 发布者的列表带未读数
    let (status, body) = app.get("/chat/rooms", &owner_token).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["unread_count"], 1);
    assert_eq!(body["data"][0]["last_message_summary"], "see you at seven");

    // 查看详情会标记已读
    let (status, body) = app
        .get(&format!("/chat/rooms/{room_id}"), &owner_token)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["room"]["unread_count"], 0);
    assert_eq!(body["data"]["approval_status"], "APPROVED");

    let (status, body) = app
        .get(&format!("/chat/rooms/{room_id}/messages?page=1&size=10"), &owner_token)
        .await;
    assert_eq!(status, 200);
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["read_by"][0], owner.to_string());

    let (status, body) = app
        .put(&format!("/chat/rooms/{room_id}/messages/read"), &owner_token)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["marked"], 0);
}

#[tokio::test]
async fn notifications_are_listed_and_marked_read() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester = UserId::generate();
    let owner_token = app.token_for(owner);
    let requester_token = app.token_for(requester);
    let listing = app.seed_listing(owner, 3).await;

    let room_id = app.open_room(listing, &requester_token).await;
    let long_text = "a".repeat(40);
    app.post_json(
        &format!("/chat/rooms/{room_id}/messages"),
        &requester_token,
        json!({ "content": long_text }),
    )
    .await;

    let (status, body) = app.get("/notifications", &owner_token).await;
    assert_eq!(status, 200);
    let notifications = body["data"].as_array().unwrap();
    assert_eq!(notifications.len(), 2);
    // 新的在前
    assert_eq!(notifications[0]["category"], "CHAT_MESSAGE");
    assert_eq!(
        notifications[0]["message"],
        format!("{}...", "a".repeat(27))
    );
    assert_eq!(notifications[1]["category"], "ROOM_CREATED");

    let id = notifications[0]["id"].as_i64().unwrap();
    let (status, _) = app
        .put(&format!("/notifications/{id}/read"), &owner_token)
        .await;
    assert_eq!(status, 200);

    // 别人的通知不可见
    let (status, body) = app
        .put(&format!("/notifications/{id}/read"), &requester_token)
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error_code"], "NOTIFICATION_NOT_FOUND");

    let (_, body) = app.get("/notifications?unread_only=true", &owner_token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn outsiders_and_anonymous_callers_are_rejected() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester_token = app.token_for(UserId::generate());
    let outsider_token = app.token_for(UserId::generate());
    let listing = app.seed_listing(owner, 2).await;
    let room_id = app.open_room(listing, &requester_token).await;

    let (status, body) = app
        .get(&format!("/chat/rooms/{room_id}/messages"), &outsider_token)
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error_code"], "NOT_ROOM_MEMBER");

    let response = app
        .client
        .get(app.url("/chat/rooms"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let (status, _) = app
        .get(&format!("/chat/rooms/{}", domain::RoomId::generate()), &outsider_token)
        .await;
    assert_eq!(status, 404);

    // 发布者不能在自己的发布下开房间
    let (status, _) = app
        .post_json(
            "/chat/rooms",
            &app.token_for(owner),
            json!({ "listing_id": listing }),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn logout_revokes_the_credential() {
    let app = TestApp::spawn().await;
    let user = UserId::generate();
    let token = app.token_for(user);

    let (status, _) = app.get("/chat/rooms", &token).await;
    assert_eq!(status, 200);

    let (status, body) = app.post_json("/auth/logout", &token, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["revoked"], true);

    let (status, body) = app.get("/chat/rooms", &token).await;
    assert_eq!(status, 401);
    assert_eq!(body["error_code"], "REVOKED_CREDENTIAL");

    // 已吊销的凭证不能再次登出
    let (status, _) = app.post_json("/auth/logout", &token, json!({})).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn image_upload_sends_an_image_message() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester_token = app.token_for(UserId::generate());
    let listing = app.seed_listing(owner, 2).await;
    let room_id = app.open_room(listing, &requester_token).await;

    let part = reqwest::multipart::Part::bytes(vec![0x89, 0x50, 0x4e, 0x47])
        .file_name("map.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("image", part);
    let response = app
        .client
        .post(app.url(&format!("/chat/rooms/{room_id}/images")))
        .bearer_auth(&requester_token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["kind"], "IMAGE");
    assert!(body["data"]["attachment"]
        .as_str()
        .unwrap()
        .ends_with(".png"));

    let (_, rooms) = app.get("/chat/rooms", &requester_token).await;
    assert_eq!(rooms["data"][0]["last_message_summary"], "[image]");
}

#[tokio::test]
async fn malformed_requests_get_the_error_envelope() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester_token = app.token_for(UserId::generate());
    let listing = app.seed_listing(owner, 2).await;
    let room_id = app.open_room(listing, &requester_token).await;

    // 缺字段
    let (status, body) = app.post_json("/chat/rooms", &requester_token, json!({})).await;
    assert_eq!(status, 400, "{body}");
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);
    assert!(body["data"].is_null());

    // 不是 JSON
    let response = app
        .client
        .post(app.url(&format!("/chat/rooms/{room_id}/messages")))
        .bearer_auth(&requester_token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "BAD_REQUEST");

    let (status, body) = app.get("/chat/rooms/not-a-uuid", &requester_token).await;
    assert_eq!(status, 400, "{body}");
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "BAD_REQUEST");

    let (status, body) = app
        .get(
            &format!("/chat/rooms/{room_id}/messages?page=first"),
            &requester_token,
        )
        .await;
    assert_eq!(status, 400, "{body}");
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn room_is_looked_up_by_listing() {
    let app = TestApp::spawn().await;
    let owner = UserId::generate();
    let requester_token = app.token_for(UserId::generate());
    let listing = app.seed_listing(owner, 2).await;

    let (status, body) = app
        .get(&format!("/chat/rooms/listing/{listing}"), &requester_token)
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error_code"], "ROOM_NOT_FOUND");

    let room_id = app.open_room(listing, &requester_token).await;
    let (status, body) = app
        .get(&format!("/chat/rooms/listing/{listing}"), &requester_token)
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["room_id"], room_id.as_str());

    // 其他人在同一物品下没有房间
    let (status, _) = app
        .get(
            &format!("/chat/rooms/listing/{listing}"),
            &app.token_for(UserId::generate()),
        )
        .await;
    assert_eq!(status, 404);
}
