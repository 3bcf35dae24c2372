use super::manifest::MASTER_PLAYLIST;
use super::model::{Content, Episode};
use super::repository::VideoRepository;
use crate::common::media_key::MediaKey;
use crate::common::response::ApiError;
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Authentication required for VIP content")]
    AuthRequired,
    #[error("An active subscription is required for VIP content")]
    SubscriptionRequired,
    #[error("Content not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PlaybackError> for ApiError {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::AuthRequired => {
                ApiError::new(e.to_string(), StatusCode::UNAUTHORIZED).with_code("AUTH_REQUIRED")
            }
            PlaybackError::SubscriptionRequired => {
                ApiError::new(e.to_string(), StatusCode::FORBIDDEN)
                    .with_code("SUBSCRIPTION_REQUIRED")
            }
            PlaybackError::NotFound => ApiError::not_found(e.to_string()).with_code("NOT_FOUND"),
            PlaybackError::Internal(inner) => {
                error!("Playback resolution failed: {:#}", inner);
                ApiError::internal("Failed to resolve video URL")
            }
        }
    }
}

/// Catalog lookups needed to authorize and locate playback.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn content(&self, id: i64) -> anyhow::Result<Option<Content>>;
    async fn episode(&self, id: i64) -> anyhow::Result<Option<Episode>>;
    async fn episode_owner(&self, episode_id: i64) -> anyhow::Result<Option<Content>>;
    async fn has_active_subscription(&self, user_id: i64) -> anyhow::Result<bool>;
}

pub struct PgCatalog(pub DbPool);

#[async_trait]
impl CatalogReader for PgCatalog {
    async fn content(&self, id: i64) -> anyhow::Result<Option<Content>> {
        VideoRepository::get_content_by_id(&self.0, id).await
    }

    async fn episode(&self, id: i64) -> anyhow::Result<Option<Episode>> {
        VideoRepository::get_episode_by_id(&self.0, id).await
    }

    async fn episode_owner(&self, episode_id: i64) -> anyhow::Result<Option<Content>> {
        VideoRepository::get_episode_content(&self.0, episode_id).await
    }

    async fn has_active_subscription(&self, user_id: i64) -> anyhow::Result<bool> {
        VideoRepository::has_active_subscription(&self.0, user_id).await
    }
}

/// Whether `key` names an existing content or episode row.
pub async fn media_exists(catalog: &dyn CatalogReader, key: &MediaKey) -> anyhow::Result<bool> {
    Ok(match *key {
        MediaKey::Content(id) => catalog.content(id).await?.is_some(),
        MediaKey::Episode(id) => catalog.episode(id).await?.is_some(),
    })
}

fn first_usable(urls: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    urls.into_iter().flatten().find(|u| !u.is_empty())
}

pub fn storage_manifest_url(public_base_url: &str, key: &MediaKey) -> String {
    format!("{}/{}{}", public_base_url.trim_end_matches('/'), key.storage_prefix(), MASTER_PLAYLIST)
}

pub struct PlaybackService<'a> {
    pub catalog: &'a dyn CatalogReader,
    pub public_root: &'a Path,
    pub public_base_url: &'a str,
}

impl PlaybackService<'_> {
    /// Resolves a playable manifest URL for `key` on behalf of `user_id`
    /// (`None` when the caller is not authenticated).
    pub async fn resolve(
        &self,
        key: MediaKey,
        user_id: Option<i64>,
    ) -> Result<String, PlaybackError> {
        let (is_vip, origin_urls) = match key {
            MediaKey::Content(id) => {
                let content = self.catalog.content(id).await?.ok_or(PlaybackError::NotFound)?;
                (content.is_vip, vec![content.video_url])
            }
            MediaKey::Episode(id) => {
                let episode = self.catalog.episode(id).await?.ok_or(PlaybackError::NotFound)?;
                if episode.is_free {
                    debug!(content_id = %key, "Free episode, skipping access checks");
                    return Ok(first_usable([episode.manifest_url, episode.video_url])
                        .unwrap_or_else(|| storage_manifest_url(self.public_base_url, &key)));
                }
                let owner = self
                    .catalog
                    .episode_owner(id)
                    .await?
                    .ok_or(PlaybackError::NotFound)?;
                (owner.is_vip, vec![episode.manifest_url, episode.video_url])
            }
        };

        if is_vip {
            let user_id = user_id.ok_or(PlaybackError::AuthRequired)?;
            if !self.catalog.has_active_subscription(user_id).await? {
                return Err(PlaybackError::SubscriptionRequired);
            }
        }

        let local_master = self.public_root.join(key.to_string()).join(MASTER_PLAYLIST);
        if tokio::fs::try_exists(&local_master).await.unwrap_or(false) {
            return Ok(storage_manifest_url(self.public_base_url, &key));
        }

        Ok(first_usable(origin_urls)
            .unwrap_or_else(|| storage_manifest_url(self.public_base_url, &key)))
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryCatalog {
    contents: std::collections::HashMap<i64, Content>,
    episodes: std::collections::HashMap<i64, Episode>,
    owners: std::collections::HashMap<i64, i64>,
    subscribers: std::collections::HashSet<i64>,
    pub subscription_checks: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryCatalog {
    pub fn with_content(mut self, id: i64, is_vip: bool, video_url: Option<&str>) -> Self {
        self.contents.insert(
            id,
            Content {
                id,
                title: format!("Title {id}"),
                is_vip,
                video_url: video_url.map(str::to_string),
            },
        );
        self
    }

    pub fn with_episode(
        mut self,
        id: i64,
        owner: i64,
        is_free: bool,
        manifest: Option<&str>,
        video: Option<&str>,
    ) -> Self {
        self.episodes.insert(
            id,
            Episode {
                id,
                season_id: 1,
                is_free,
                manifest_url: manifest.map(str::to_string),
                video_url: video.map(str::to_string),
            },
        );
        self.owners.insert(id, owner);
        self
    }

    pub fn with_subscriber(mut self, user_id: i64) -> Self {
        self.subscribers.insert(user_id);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn content(&self, id: i64) -> anyhow::Result<Option<Content>> {
        Ok(self.contents.get(&id).cloned())
    }

    async fn episode(&self, id: i64) -> anyhow::Result<Option<Episode>> {
        Ok(self.episodes.get(&id).cloned())
    }

    async fn episode_owner(&self, episode_id: i64) -> anyhow::Result<Option<Content>> {
        Ok(self.owners.get(&episode_id).and_then(|c| self.contents.get(c)).cloned())
    }

    async fn has_active_subscription(&self, user_id: i64) -> anyhow::Result<bool> {
        self.subscription_checks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.subscribers.contains(&user_id))
    }
}
