//! 凭证校验、吊销与实时连接入口

use application::{ApplicationError, AuthError, FanoutEvent};
use domain::UserId;
use tests::Harness;

#[tokio::test]
async fn revoked_credential_cannot_open_a_stream() {
    let harness = Harness::new();
    let user = UserId::generate();
    let token = harness.core.sessions.issue(user).unwrap().token;

    let (ctx, _deliveries) = harness.core.gate.connect(Some(token.as_str())).await.unwrap();
    assert_eq!(ctx.subject, user);
    assert_eq!(harness.core.gate.registry().len(), 1);

    assert!(harness.core.sessions.revoke(&token).unwrap());
    // 已吊销的凭证重复登出不会再记录
    assert!(!harness.core.sessions.revoke(&token).unwrap());

    match harness.core.gate.connect(Some(token.as_str())).await {
        Err(err @ ApplicationError::Authentication(AuthError::Revoked)) => {
            assert_eq!(err.status_code(), 401);
            assert_eq!(err.error_code(), "REVOKED_CREDENTIAL");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("revoked credential opened a stream"),
    }

    // 已建立的连接不受影响，直到客户端断开
    assert_eq!(harness.core.gate.registry().len(), 1);
    harness.core.gate.close(&ctx).await;
    assert!(harness.core.gate.registry().is_empty());
}

#[tokio::test]
async fn missing_or_forged_credentials_are_rejected() {
    let harness = Harness::new();

    assert!(matches!(
        harness.core.gate.authenticate(None),
        Err(ApplicationError::Authentication(AuthError::Missing))
    ));
    assert!(matches!(
        harness.core.gate.authenticate(Some("")),
        Err(ApplicationError::Authentication(AuthError::Missing))
    ));
    assert!(matches!(
        harness.core.gate.authenticate(Some("header.payload.signature")),
        Err(ApplicationError::Authentication(AuthError::Invalid(_)))
    ));
}

#[tokio::test]
async fn revoking_one_credential_leaves_others_valid() {
    let harness = Harness::new();
    let user = UserId::generate();
    let first = harness.core.sessions.issue(user).unwrap().token;
    let second = harness.core.sessions.issue(user).unwrap().token;

    harness.core.sessions.revoke(&first).unwrap();

    assert!(harness.core.sessions.validate(&first).is_err());
    assert_eq!(harness.core.sessions.validate(&second).unwrap().subject, user);
}

#[tokio::test]
async fn bad_frames_are_answered_without_dropping_the_connection() {
    let harness = Harness::new();
    let user = UserId::generate();
    let (ctx, _deliveries) = harness.core.gate.open(user).await;

    let reply = harness.core.gate.handle_text(&ctx, "{\"type\":").await;
    assert!(matches!(reply, Some(FanoutEvent::Error { code: 400, .. })));

    let reply = harness
        .core
        .gate
        .handle_text(
            &ctx,
            &format!(
                r#"{{"type":"subscribe","room_id":"{}"}}"#,
                domain::RoomId::generate()
            ),
        )
        .await;
    assert!(matches!(reply, Some(FanoutEvent::Error { code: 404, .. })));

    let reply = harness.core.gate.handle_text(&ctx, r#"{"type":"ping"}"#).await;
    assert_eq!(reply, Some(FanoutEvent::Pong));
    assert_eq!(harness.core.gate.registry().len(), 1);
}
