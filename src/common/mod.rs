pub mod media_key;
pub mod response;
pub mod upload;
