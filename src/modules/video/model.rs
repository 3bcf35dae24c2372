use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Content {
    pub id: i64,
    pub title: String,
    pub is_vip: bool,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Episode {
    pub id: i64,
    pub season_id: i64,
    pub is_free: bool,
    pub manifest_url: Option<String>,
    pub video_url: Option<String>,
}
