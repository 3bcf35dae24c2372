use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamTokenResponse {
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestQuery {
    /// Optional media key the token is restricted to.
    pub content_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// Stream token, for players that cannot send headers.
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StreamClaims {
    pub sub: String,
    /// Media key this token is bound to; unbound tokens open every key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    pub exp: u64,
    pub iat: u64,
}
