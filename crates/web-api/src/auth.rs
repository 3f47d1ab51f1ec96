//! Bearer 凭证提取
//!
//! 控制面每次请求都重新校验签名、有效期与吊销状态。

use application::{ApplicationError, AuthError, Session};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use domain::UserId;

use crate::{error::ApiError, state::AppState};

/// 从 `Authorization: Bearer <token>` 头中取出凭证
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 已认证的调用者
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub session: Session,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::from(ApplicationError::from(AuthError::Missing)))?
            .to_string();

        let session = state
            .core
            .sessions
            .validate(&token)
            .map_err(ApplicationError::from)?;

        Ok(Self {
            user_id: session.subject,
            session,
            token,
        })
    }
}
