use serde::{Deserialize, Serialize};

/// Claims of access tokens issued by the account service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub sub: i64,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// Caller identity attached by the optional auth middleware.
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<TokenClaims>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|c| c.sub)
    }
}
