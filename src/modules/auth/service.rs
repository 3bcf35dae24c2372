use super::dto::TokenClaims;
use crate::infrastructure::redis::client::RedisService;
use anyhow::{anyhow, Result};
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, DecodingKey, Validation};
use redis::AsyncCommands;

pub struct AuthService;

impl AuthService {
    pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|auth_header| auth_header.to_str().ok())
            .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    }

    pub fn verify_access_token(secret: &str, token: &str) -> Result<TokenClaims> {
        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| anyhow!("Invalid token: {}", e))
    }

    /// Tokens revoked on logout are parked in Redis until they expire.
    pub async fn is_blocked(redis: &RedisService, token: &str) -> Result<bool> {
        let mut conn = redis.get_conn().await?;
        let blocked: bool = conn.exists(format!("blocked_token:{}", token)).await?;
        Ok(blocked)
    }
}
