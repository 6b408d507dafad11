/// Persistent single-file cache for live scrape results
///
/// Holds episode lists, player URL outcomes and the two catalog-wide listings.
/// Every mutation rewrites the whole file before returning; write failures are
/// logged and swallowed. [`CacheStore::reconcile`] picks up edits made by other
/// processes by comparing the file's modification time.
pub mod schema;

pub use schema::{CacheFile, EpisodeListEntry, IframeEntry, ListingEntry, SCHEMA_VERSION};

use crate::error::{ResolveError, Result};
use crate::models::{AiringEpisode, EpisodePage, PopularAnime};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Counters reported by [`CacheStore::stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub anime_cached: usize,
    pub iframes_cached: usize,
    pub currently_airing_episodes_cached: usize,
    pub popular_anime_cached: usize,
    pub schema_version: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub cache_file: String,
}

pub struct CacheStore {
    path: PathBuf,
    data: CacheFile,
    last_mtime: Option<SystemTime>,
    listing_ttl: Duration,
}

impl CacheStore {
    /// Open the cache at `path`. A missing file starts empty, a malformed one
    /// is replaced by the default shape on the next write.
    pub async fn open(path: impl Into<PathBuf>, listing_ttl_hours: i64) -> Self {
        let mut store = Self {
            path: path.into(),
            data: CacheFile::new(Utc::now()),
            last_mtime: None,
            listing_ttl: Duration::hours(listing_ttl_hours),
        };
        store.load().await;
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &CacheFile {
        &self.data
    }

    async fn load(&mut self) {
        if !self.path.exists() {
            debug!("No cache file at {}, starting empty", self.path.display());
            return;
        }

        self.last_mtime = file_mtime(&self.path).await;
        match read_cache_file(&self.path).await {
            Ok(mut data) => {
                if data.migrate(Utc::now()) {
                    debug!("Cache document upgraded in memory");
                }
                info!(
                    "💾 Loaded cache: {} anime, {} iframes",
                    data.anime_episodes.len(),
                    data.iframe_count()
                );
                self.data = data;
            }
            Err(e) => {
                // Keep the observed mtime so the broken file is not re-read on every access
                error!("❌ {}, falling back to an empty cache", e);
                self.data = CacheFile::new(Utc::now());
            }
        }
    }

    /// Reload from disk if another process rewrote the file since we last saw it.
    /// Returns whether a reload happened.
    pub async fn reconcile(&mut self) -> bool {
        let Some(on_disk) = file_mtime(&self.path).await else {
            return false;
        };

        let newer = match self.last_mtime {
            Some(seen) => on_disk > seen,
            None => true,
        };
        if !newer {
            return false;
        }

        info!("🔄 Cache file changed on disk, reloading {}", self.path.display());
        self.load().await;
        true
    }

    async fn try_persist(&mut self) -> Result<()> {
        self.data.metadata.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(&self.data)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let write = async {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp_path, content).await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        };
        write.await.map_err(|source| ResolveError::StorageWriteFailure {
            path: self.path.clone(),
            source,
        })?;

        self.last_mtime = file_mtime(&self.path).await;
        Ok(())
    }

    /// Best-effort full rewrite of the cache file
    async fn persist(&mut self) {
        if let Err(e) = self.try_persist().await {
            warn!("⚠️ Cache write skipped: {}", e);
        }
    }

    pub fn airing(&self) -> Option<Vec<AiringEpisode>> {
        self.airing_at(Utc::now())
    }

    pub fn airing_at(&self, now: DateTime<Utc>) -> Option<Vec<AiringEpisode>> {
        self.data.currently_airing_episodes.fresh_items(now, self.listing_ttl)
    }

    pub async fn set_airing(&mut self, items: Vec<AiringEpisode>) {
        self.set_airing_at(items, Utc::now()).await
    }

    pub async fn set_airing_at(&mut self, items: Vec<AiringEpisode>, now: DateTime<Utc>) {
        info!("💾 Cached {} currently airing episodes", items.len());
        self.data.currently_airing_episodes = ListingEntry::new(items, now);
        self.persist().await;
    }

    pub fn popular(&self) -> Option<Vec<PopularAnime>> {
        self.popular_at(Utc::now())
    }

    pub fn popular_at(&self, now: DateTime<Utc>) -> Option<Vec<PopularAnime>> {
        self.data.popular_anime.fresh_items(now, self.listing_ttl)
    }

    pub async fn set_popular(&mut self, items: Vec<PopularAnime>) {
        self.set_popular_at(items, Utc::now()).await
    }

    pub async fn set_popular_at(&mut self, items: Vec<PopularAnime>, now: DateTime<Utc>) {
        info!("💾 Cached {} popular anime", items.len());
        self.data.popular_anime = ListingEntry::new(items, now);
        self.persist().await;
    }

    /// Cached episode list; presence alone is a hit
    pub fn episode_list(&self, anime_id: &str) -> Option<EpisodePage> {
        self.data.anime_episodes.get(anime_id).map(EpisodeListEntry::to_page)
    }

    pub async fn set_episode_list(&mut self, anime_id: &str, page: &EpisodePage) {
        self.data
            .anime_episodes
            .insert(anime_id.to_string(), EpisodeListEntry::from_page(page, Utc::now()));
        debug!("💾 Cached {} episodes for {}", page.episodes.len(), anime_id);
        self.persist().await;
    }

    /// Stored outcome for an episode, successful or not
    pub fn iframe_entry(&self, anime_id: &str, session: &str) -> Option<&IframeEntry> {
        self.data.episode_iframes.get(anime_id)?.get(session)
    }

    /// Cached player URL; stored failures are misses
    pub fn iframe(&self, anime_id: &str, session: &str) -> Option<String> {
        self.iframe_entry(anime_id, session)?.usable_url().map(str::to_string)
    }

    pub async fn set_iframe(&mut self, anime_id: &str, session: &str, iframe_url: Option<String>, error: Option<String>) {
        self.set_iframe_at(anime_id, session, iframe_url, error, Utc::now()).await
    }

    pub async fn set_iframe_at(
        &mut self,
        anime_id: &str,
        session: &str,
        iframe_url: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        let entry = IframeEntry {
            success: iframe_url.is_some() && error.is_none(),
            iframe_url,
            error,
            timestamp: Some(now),
        };
        self.data
            .episode_iframes
            .entry(anime_id.to_string())
            .or_default()
            .insert(session.to_string(), entry);
        self.persist().await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            anime_cached: self.data.anime_episodes.len(),
            iframes_cached: self.data.iframe_count(),
            currently_airing_episodes_cached: self.data.currently_airing_episodes.items.len(),
            popular_anime_cached: self.data.popular_anime.items.len(),
            schema_version: self.data.metadata.schema_version,
            created_at: self.data.metadata.created_at,
            last_updated: self.data.metadata.last_updated,
            cache_file: self.path.display().to_string(),
        }
    }

    /// Drop every entry and persist the empty document
    pub async fn clear(&mut self) {
        self.data = CacheFile::new(Utc::now());
        info!("🗑️ Cache cleared");
        self.persist().await;
    }

    /// Remove episode-list and iframe entries older than `max_age_days`.
    /// Entries without a readable timestamp are kept.
    pub async fn sweep(&mut self, max_age_days: i64) -> usize {
        self.sweep_at(max_age_days, Utc::now()).await
    }

    pub async fn sweep_at(&mut self, max_age_days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(max_age_days);
        let expired = |timestamp: Option<DateTime<Utc>>| timestamp.map_or(false, |t| t < cutoff);

        let before_lists = self.data.anime_episodes.len();
        self.data.anime_episodes.retain(|_, entry| !expired(entry.timestamp));
        let mut removed = before_lists - self.data.anime_episodes.len();

        for sessions in self.data.episode_iframes.values_mut() {
            let before = sessions.len();
            sessions.retain(|_, entry| !expired(entry.timestamp));
            removed += before - sessions.len();
        }
        self.data.episode_iframes.retain(|_, sessions| !sessions.is_empty());

        if removed > 0 {
            info!("🧹 Swept {} cache entries older than {} days", removed, max_age_days);
            self.persist().await;
        } else {
            debug!("Sweep found nothing older than {} days", max_age_days);
        }
        removed
    }
}

async fn file_mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn read_cache_file(path: &Path) -> Result<CacheFile> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(|source| ResolveError::MalformedCacheFile {
        path: path.to_path_buf(),
        source,
    })
}
