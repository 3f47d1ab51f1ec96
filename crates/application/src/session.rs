//! 会话凭证的签发、校验与吊销
//!
//! 吊销表是进程级的并发映射，登出时写入，凭证自然过期后由后台任务清理。

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use config::JwtConfig;
use dashmap::{mapref::entry::Entry, DashMap};
use domain::{Timestamp, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential: {0}")]
    Invalid(String),
    #[error("credential has been revoked")]
    Revoked,
    #[error("failed to issue credential: {0}")]
    Issue(String),
}

/// JWT Claims 结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// 凭证标识，吊销表的键
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// 校验通过的会话
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub subject: UserId,
    pub credential_id: Uuid,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: Timestamp,
}

/// 已吊销凭证表：凭证标识 → 凭证自身的过期时间
#[derive(Debug, Default)]
pub struct RevocationStore {
    entries: DashMap<String, Timestamp>,
}

impl RevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 幂等写入；返回是否为首次吊销
    pub fn revoke(&self, credential_id: impl Into<String>, expires_at: Timestamp) -> bool {
        match self.entries.entry(credential_id.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    pub fn is_revoked(&self, credential_id: &str, now: Timestamp) -> bool {
        self.entries
            .get(credential_id)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    /// 清理已过期的条目，返回清理数量
    pub fn evict_expired(&self, now: Timestamp) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 启动后台清理任务
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = self.evict_expired(Utc::now());
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = self.len(), "清理过期的吊销条目");
                }
            }
        })
    }
}

/// 凭证校验器：签名/过期校验与吊销检查相互独立，任一失败即拒绝
pub struct SessionValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: chrono::Duration,
    revocations: Arc<RevocationStore>,
}

impl SessionValidator {
    pub fn new(config: &JwtConfig, revocations: Arc<RevocationStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            ttl: chrono::Duration::hours(config.expiration_hours),
            revocations,
        }
    }

    pub fn revocations(&self) -> &Arc<RevocationStore> {
        &self.revocations
    }

    /// 生成 JWT token
    pub fn issue(&self, subject: UserId) -> Result<IssuedCredential, AuthError> {
        self.issue_with_ttl(subject, self.ttl)
    }

    pub fn issue_with_ttl(
        &self,
        subject: UserId,
        ttl: chrono::Duration,
    ) -> Result<IssuedCredential, AuthError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: subject.into(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Issue(err.to_string()))?;
        Ok(IssuedCredential { token, expires_at })
    }

    pub fn validate(&self, credential: &str) -> Result<Session, AuthError> {
        let claims = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| AuthError::Invalid(err.to_string()))?;

        if self
            .revocations
            .is_revoked(&claims.jti.to_string(), Utc::now())
        {
            return Err(AuthError::Revoked);
        }

        Ok(Session {
            subject: UserId::from(claims.sub),
            credential_id: claims.jti,
            expires_at: timestamp_from_secs(claims.exp)?,
        })
    }

    /// 吊销凭证（登出）。签名必须有效；已自然过期的凭证无需记录。
    pub fn revoke(&self, credential: &str) -> Result<bool, AuthError> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        let claims = decode::<Claims>(credential, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| AuthError::Invalid(err.to_string()))?;

        let expires_at = timestamp_from_secs(claims.exp)?;
        if expires_at <= Utc::now() {
            return Ok(false);
        }

        let inserted = self.revocations.revoke(claims.jti.to_string(), expires_at);
        if inserted {
            tracing::info!(user_id = %claims.sub, "凭证已吊销");
        }
        Ok(inserted)
    }
}

fn timestamp_from_secs(secs: i64) -> Result<Timestamp, AuthError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Invalid("expiry out of range".to_string()))
}
