use super::model::{Content, Episode};
use anyhow::Result;
use sqlx::PgPool;

/// Read-only access to the catalog rows the pipeline depends on.
pub struct VideoRepository;

impl VideoRepository {
    pub async fn get_content_by_id(pool: &PgPool, id: i64) -> Result<Option<Content>> {
        let content = sqlx::query_as::<_, Content>(
            "SELECT id, title, is_vip, video_url FROM contents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(content)
    }

    pub async fn get_episode_by_id(pool: &PgPool, id: i64) -> Result<Option<Episode>> {
        let episode = sqlx::query_as::<_, Episode>(
            "SELECT id, season_id, is_free, manifest_url, video_url FROM episodes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(episode)
    }

    /// Content that owns an episode, reached through its season.
    pub async fn get_episode_content(pool: &PgPool, episode_id: i64) -> Result<Option<Content>> {
        let content = sqlx::query_as::<_, Content>(
            r#"
            SELECT c.id, c.title, c.is_vip, c.video_url
            FROM episodes e
            JOIN seasons s ON s.id = e.season_id
            JOIN contents c ON c.id = s.content_id
            WHERE e.id = $1
            "#,
        )
        .bind(episode_id)
        .fetch_optional(pool)
        .await?;
        Ok(content)
    }

    pub async fn has_active_subscription(pool: &PgPool, user_id: i64) -> Result<bool> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_subscriptions
                WHERE user_id = $1 AND status = 'active' AND end_date > NOW()
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(active)
    }
}
