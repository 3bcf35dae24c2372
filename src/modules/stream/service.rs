use super::dto::StreamClaims;
use crate::common::media_key::MediaKey;
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;

pub const STREAM_SUBJECT: &str = "stream-client";

#[derive(Debug, Error, PartialEq)]
pub enum StreamError {
    #[error("Missing stream token")]
    MissingToken,
    #[error("Invalid or expired stream token")]
    InvalidToken,
    #[error("Stream token is not valid for this content")]
    WrongContent,
    #[error("Invalid file path")]
    InvalidPath,
    #[error("Failed to sign stream token")]
    Signing,
}

pub struct StreamTokenService<'a> {
    pub secret: &'a str,
    pub ttl_secs: u64,
}

impl StreamTokenService<'_> {
    pub fn issue(&self, content: Option<MediaKey>) -> Result<String, StreamError> {
        self.issue_at(content, get_current_timestamp())
    }

    pub fn issue_at(&self, content: Option<MediaKey>, now: u64) -> Result<String, StreamError> {
        let claims = StreamClaims {
            sub: STREAM_SUBJECT.to_string(),
            cid: content.map(|k| k.to_string()),
            exp: now + self.ttl_secs,
            iat: now,
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|_| StreamError::Signing)
    }

    /// Checks signature and expiry (no leeway), then the optional content binding.
    pub fn verify(&self, token: &str, key: &MediaKey) -> Result<StreamClaims, StreamError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let claims = decode::<StreamClaims>(token, &decoding_key, &validation)
            .map_err(|_| StreamError::InvalidToken)?
            .claims;

        if claims.sub != STREAM_SUBJECT {
            return Err(StreamError::InvalidToken);
        }
        match &claims.cid {
            Some(cid) if *cid != key.to_string() => Err(StreamError::WrongContent),
            _ => Ok(claims),
        }
    }
}

/// A file name under a content directory: one segment, no traversal.
pub fn validate_file_name(file: &str) -> Result<&str, StreamError> {
    let ok = !file.is_empty()
        && file != "."
        && !file.contains("..")
        && !file.contains(['/', '\\', '\0']);
    if ok { Ok(file) } else { Err(StreamError::InvalidPath) }
}
