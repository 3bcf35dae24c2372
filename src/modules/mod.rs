pub mod auth;
pub mod stream;
pub mod video;
