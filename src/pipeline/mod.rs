//! Tiered resolution: static index first, then the persistent cache, then a
//! live scrape through the browser worker.

pub mod pagination;

use crate::cache::{CacheStats, CacheStore};
use crate::config::Config;
use crate::error::{ResolveError, Result};
use crate::index::{IndexStore, SearchMatch};
use crate::models::{
    sort_by_episode_number, AiringEpisode, EpisodePage, EpisodeRecord, EpisodeSummary, IframeResolution,
    PopularAnime, ResolutionSource,
};
use crate::scrape::listings::{fallback_airing, fallback_popular};
use crate::scrape::{clean_episode_title, dedupe_by_session};
use crate::worker::WorkerHandle;
use pagination::paginate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Snapshot reported by [`ResolutionPipeline::status`]
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub ready: bool,
    pub base_url: String,
    pub cache: CacheStats,
    pub anime_index_count: usize,
}

/// Entry point for every resolution request.
///
/// Cheap to clone; the index is shared read-only and the cache sits behind an
/// async mutex that is never held across a worker call.
#[derive(Clone)]
pub struct ResolutionPipeline {
    index: Arc<IndexStore>,
    cache: Arc<Mutex<CacheStore>>,
    worker: WorkerHandle,
    config: Arc<Config>,
}

impl ResolutionPipeline {
    pub fn new(index: Arc<IndexStore>, cache: CacheStore, worker: WorkerHandle, config: Arc<Config>) -> Self {
        Self {
            index,
            cache: Arc::new(Mutex::new(cache)),
            worker,
            config,
        }
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub fn base_url(&self) -> &str {
        &self.config.site.base_url
    }

    pub fn readiness(&self) -> bool {
        self.worker.is_ready()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.worker.is_ready() {
            Ok(())
        } else {
            Err(ResolveError::NotReady)
        }
    }

    /// Pick up writes other processes made to the cache file
    async fn reconcile(&self) {
        self.cache.lock().await.reconcile().await;
    }

    /// Ranked title matches from the index
    pub async fn search(&self, query: &str) -> Result<Vec<SearchMatch<'_>>> {
        self.ensure_ready()?;
        self.reconcile().await;
        info!("🔍 Searching for: {}", query);
        Ok(self.index.search(query, self.config.listings.search_limit))
    }

    /// Index-backed episode list, falling back to a live scrape when the
    /// index has nothing for the first page
    pub async fn resolve_episodes(&self, anime_id: &str, page: u32) -> Result<EpisodePage> {
        self.ensure_ready()?;
        self.reconcile().await;
        let page = page.max(1);

        let indexed = self.indexed_episodes(anime_id, page);
        if indexed.episodes.is_empty() && page == 1 {
            warn!("⚠️ No indexed episodes for {}, falling back to live scrape", anime_id);
            return self.live_episodes(anime_id, page).await;
        }
        Ok(indexed)
    }

    fn indexed_episodes(&self, anime_id: &str, page: u32) -> EpisodePage {
        info!("📚 Getting indexed episodes for anime: {} (Page {})", anime_id, page);
        let Some(anime) = self.index.find_by_id(anime_id) else {
            warn!("⚠️ No anime data found in index for: {}", anime_id);
            return EpisodePage::empty("Unknown Anime", page);
        };

        let mut episodes = dedupe_by_session(anime.episodes.iter().map(|episode| self.summarize(anime_id, episode)).collect());
        if !sort_by_episode_number(&mut episodes, |episode| episode.number.as_ref()) {
            warn!("⚠️ Could not sort episodes by number for {}", anime_id);
        }

        let (slice, has_next_page, next_page) = paginate(&episodes, page, self.config.listings.episodes_per_page);
        EpisodePage {
            title: anime.title.clone(),
            episodes: slice,
            total_episodes: episodes.len(),
            has_next_page,
            current_page: page,
            next_page,
        }
    }

    fn summarize(&self, anime_id: &str, episode: &EpisodeRecord) -> EpisodeSummary {
        let url = if episode.url.is_empty() {
            self.config.site.play_url(anime_id, &episode.episode_id)
        } else {
            episode.url.clone()
        };
        EpisodeSummary {
            number: episode.number.clone(),
            title: clean_episode_title(&episode.title),
            url,
            session: episode.episode_id.clone(),
        }
    }

    /// Episode list scraped live. Page 1 is served from and written to the cache.
    pub async fn resolve_live_episodes(&self, anime_id: &str, page: u32) -> Result<EpisodePage> {
        self.ensure_ready()?;
        self.reconcile().await;
        self.live_episodes(anime_id, page.max(1)).await
    }

    async fn live_episodes(&self, anime_id: &str, page: u32) -> Result<EpisodePage> {
        if page == 1 {
            if let Some(cached) = self.cache.lock().await.episode_list(anime_id) {
                info!("💾 Using cached episodes for anime: {}", anime_id);
                return Ok(cached);
            }
        }

        match self.worker.episodes(anime_id, page).await {
            Ok(scraped) => {
                if page == 1 {
                    self.cache.lock().await.set_episode_list(anime_id, &scraped).await;
                }
                Ok(scraped)
            }
            Err(e) if e.is_boundary() => Err(e),
            Err(e) => {
                error!("❌ Error scraping episodes for {}: {}", anime_id, e);
                Ok(EpisodePage::empty("Unknown", page))
            }
        }
    }

    /// Player URL for one episode: index, then a successful cache entry, then
    /// a live extraction whose outcome is always recorded
    pub async fn resolve_iframe(&self, anime_id: &str, session: &str) -> Result<IframeResolution> {
        self.ensure_ready()?;
        self.reconcile().await;

        if let Some(url) = self
            .index
            .find_episode(anime_id, session)
            .and_then(|episode| episode.iframe_url.clone())
            .filter(|url| !url.is_empty())
        {
            info!("💾 Using indexed iframe for episode: {}", session);
            return Ok(IframeResolution::found(url, ResolutionSource::Index));
        }

        if let Some(url) = self.cache.lock().await.iframe(anime_id, session) {
            info!("💾 Using cached iframe for episode: {}", session);
            return Ok(IframeResolution::found(url, ResolutionSource::Cache));
        }

        warn!("⚠️ No stored iframe for {}, scraping...", session);
        match self.worker.iframe(anime_id, session).await {
            Ok(url) => {
                info!("✅ Found iframe: {}", url);
                self.cache
                    .lock()
                    .await
                    .set_iframe(anime_id, session, Some(url.clone()), None)
                    .await;
                Ok(IframeResolution::found(url, ResolutionSource::Live))
            }
            Err(e) if e.is_boundary() => Err(e),
            Err(e) => {
                let reason = e.to_string();
                error!("❌ Iframe extraction failed for {}: {}", session, reason);
                self.cache
                    .lock()
                    .await
                    .set_iframe(anime_id, session, None, Some(reason.clone()))
                    .await;
                Ok(IframeResolution::failed(reason))
            }
        }
    }

    /// Episode after `session` in index order, if the index knows the title
    pub async fn next_episode(&self, anime_id: &str, session: &str) -> Option<EpisodeRecord> {
        self.reconcile().await;
        self.index.find_next_episode(anime_id, session).cloned()
    }

    /// Currently airing episodes: cache, live scrape, then an index-built fallback
    pub async fn currently_airing(&self) -> Result<Vec<AiringEpisode>> {
        self.ensure_ready()?;
        self.reconcile().await;

        if let Some(cached) = self.cache.lock().await.airing() {
            info!("💾 Using cached currently airing episodes ({} items)", cached.len());
            return Ok(cached);
        }

        let episodes = match self.worker.airing().await {
            Ok(episodes) if !episodes.is_empty() => episodes,
            Ok(_) => {
                warn!("⚠️ No currently airing episodes found, using fallback");
                fallback_airing(self.index.records(), &self.config.site)
            }
            Err(e) if e.is_boundary() => return Err(e),
            Err(e) => {
                error!("❌ Error getting currently airing episodes: {}", e);
                fallback_airing(self.index.records(), &self.config.site)
            }
        };

        self.cache.lock().await.set_airing(episodes.clone()).await;
        Ok(episodes)
    }

    /// Popular titles: cache, live scrape, then the static table
    pub async fn popular_anime(&self) -> Result<Vec<PopularAnime>> {
        self.ensure_ready()?;
        self.reconcile().await;

        if let Some(cached) = self.cache.lock().await.popular() {
            info!("💾 Using cached popular anime ({} items)", cached.len());
            return Ok(cached);
        }

        let popular = match self.worker.popular().await {
            Ok(popular) if !popular.is_empty() => popular,
            Ok(_) => {
                warn!("⚠️ No popular anime found, using fallback");
                fallback_popular(&self.config.site)
            }
            Err(e) if e.is_boundary() => return Err(e),
            Err(e) => {
                error!("❌ Error getting popular anime: {}", e);
                fallback_popular(&self.config.site)
            }
        };

        self.cache.lock().await.set_popular(popular.clone()).await;
        Ok(popular)
    }

    /// Warm both listing caches
    pub async fn preload_listings(&self) {
        info!("🏠 Preloading home page listings...");
        match self.currently_airing().await {
            Ok(episodes) => info!("✅ Preloaded {} currently airing episodes", episodes.len()),
            Err(e) => warn!("⚠️ Could not preload currently airing episodes: {}", e),
        }
        match self.popular_anime().await {
            Ok(popular) => info!("✅ Preloaded {} popular anime", popular.len()),
            Err(e) => warn!("⚠️ Could not preload popular anime: {}", e),
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let mut cache = self.cache.lock().await;
        cache.reconcile().await;
        cache.stats()
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear().await;
    }

    /// Remove per-title cache entries older than `max_age_days`
    pub async fn sweep(&self, max_age_days: i64) -> usize {
        let mut cache = self.cache.lock().await;
        cache.reconcile().await;
        cache.sweep(max_age_days).await
    }

    pub async fn status(&self) -> PipelineStatus {
        let cache = self.cache_stats().await;
        debug!("Status requested, {} anime in index", self.index.len());
        PipelineStatus {
            ready: self.readiness(),
            base_url: self.base_url().to_string(),
            cache,
            anime_index_count: self.index.len(),
        }
    }
}
