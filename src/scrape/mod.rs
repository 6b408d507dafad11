//! Live page flows driven through the browser runtime
//!
//! Each flow opens its own browsing context and closes it on every exit path.

pub mod episodes;
pub mod listings;
pub mod title;

pub use episodes::dedupe_by_session;
pub use title::{clean_episode_title, parse_episode_info, EpisodeInfo};

use crate::browser::{BrowserRuntime, ContextOptions, PageSession, WaitPolicy};
use crate::config::Config;
use crate::error::{ResolveError, Result};
use crate::extraction::{ExtractionChain, ExtractionContext};
use crate::models::{sort_by_episode_number, AiringEpisode, EpisodePage, PopularAnime};
use crate::pipeline::pagination::PaginationTracker;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Scrapes episode lists, player URLs and listings from the live site
pub struct SiteScraper {
    config: Arc<Config>,
    chain: ExtractionChain,
}

impl SiteScraper {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_chain(config, ExtractionChain::standard())
    }

    pub fn with_chain(config: Arc<Config>, chain: ExtractionChain) -> Self {
        Self { config, chain }
    }

    async fn open(&self, runtime: &dyn BrowserRuntime, options: ContextOptions) -> Result<Box<dyn PageSession>> {
        runtime.new_context(options).await.map_err(ResolveError::browser)
    }

    async fn close(page: &mut dyn PageSession) {
        if let Err(e) = page.close().await {
            warn!("⚠️ Failed to close browsing context: {:#}", e);
        }
    }

    /// Navigate and wait for the page to settle
    async fn load(&self, page: &mut dyn PageSession, url: &str) -> Result<()> {
        let browser = &self.config.browser;
        page.navigate(url, WaitPolicy::NetworkIdle, browser.navigation_timeout())
            .await
            .map_err(ResolveError::navigation)?;
        page.wait(browser.page_settle()).await;
        self.wait_out_challenge(page).await
    }

    /// If an anti-automation page is showing, wait, reload once and re-check
    async fn wait_out_challenge(&self, page: &mut dyn PageSession) -> Result<()> {
        let site = &self.config.site;
        let browser = &self.config.browser;

        let title = page.title().await.map_err(ResolveError::browser)?;
        if !site.is_challenge(&title) {
            return Ok(());
        }

        info!("🛡️ Challenge page detected, waiting...");
        page.wait(browser.challenge_wait()).await;
        page.reload(WaitPolicy::NetworkIdle, browser.navigation_timeout())
            .await
            .map_err(ResolveError::navigation)?;
        page.wait(browser.page_settle()).await;

        let title = page.title().await.map_err(ResolveError::browser)?;
        if site.is_challenge(&title) {
            error!("❌ Challenge page did not clear: {}", page.url());
            return Err(ResolveError::ChallengePageTimeout { url: page.url() });
        }
        Ok(())
    }

    /// One page of a title's episode list, scraped live
    pub async fn episodes(&self, runtime: &dyn BrowserRuntime, anime_id: &str, page_number: u32) -> Result<EpisodePage> {
        let mut page = self.open(runtime, ContextOptions::listing(&self.config.browser)).await?;
        let outcome = self.episodes_on(page.as_mut(), anime_id, page_number).await;
        Self::close(page.as_mut()).await;
        outcome
    }

    async fn episodes_on(&self, page: &mut dyn PageSession, anime_id: &str, page_number: u32) -> Result<EpisodePage> {
        let site = &self.config.site;
        let url = site.anime_url(anime_id, page_number);
        info!("📺 Scraping episodes from: {}", url);
        self.load(page, &url).await?;

        let raw_title = page.title().await.map_err(ResolveError::browser)?;
        let title = raw_title.replace(&site.title_suffix, "").trim().to_string();

        let episodes = episodes::extract_episodes(page, site, anime_id)
            .await
            .map_err(ResolveError::browser)?;
        let (has_next_page, next_page) = PaginationTracker::detect(page, page_number).await;

        let mut episodes = dedupe_by_session(episodes);
        if !sort_by_episode_number(&mut episodes, |episode| episode.number.as_ref()) {
            warn!("⚠️ Could not sort scraped episodes by number");
        }

        info!("✅ Found {} episodes for: {} (Page {})", episodes.len(), title, page_number);
        if let Some(next) = next_page {
            info!("📖 More episodes available on page {}", next);
        }

        Ok(EpisodePage {
            title,
            total_episodes: episodes.len(),
            episodes,
            has_next_page,
            current_page: page_number,
            next_page,
        })
    }

    /// Player URL for one episode, scraped live
    pub async fn iframe(&self, runtime: &dyn BrowserRuntime, anime_id: &str, session: &str) -> Result<String> {
        let mut page = self.open(runtime, ContextOptions::player(&self.config.browser)).await?;
        let outcome = self.iframe_on(page.as_mut(), anime_id, session).await;
        Self::close(page.as_mut()).await;
        outcome
    }

    async fn iframe_on(&self, page: &mut dyn PageSession, anime_id: &str, session: &str) -> Result<String> {
        let site = &self.config.site;
        let episode_url = site.play_url(anime_id, session);
        info!("🎬 Extracting iframe from: {}", episode_url);

        page.navigate(&episode_url, WaitPolicy::NetworkIdle, self.config.browser.navigation_timeout())
            .await
            .map_err(ResolveError::navigation)?;
        self.wait_out_challenge(page).await?;

        let title = page.title().await.map_err(ResolveError::browser)?;
        if site.is_not_found(&title) {
            error!("❌ Episode page not found: {}", episode_url);
            return Err(ResolveError::PageNotFound { url: episode_url });
        }
        info!("✅ Loaded: {}", title);
        page.wait(self.config.browser.page_settle()).await;

        let context = ExtractionContext {
            site_origin: site.origin().map_err(ResolveError::browser)?,
            page_url: episode_url,
            interaction_settle: self.config.browser.interaction_settle(),
        };
        self.chain
            .run(page, &context)
            .await
            .ok_or(ResolveError::ExtractionExhausted)
    }

    /// Currently airing episodes across the first listing pages. Stops at the
    /// configured limit or at the first failing page, keeping what was collected.
    pub async fn airing(&self, runtime: &dyn BrowserRuntime) -> Result<Vec<AiringEpisode>> {
        let mut page = self.open(runtime, ContextOptions::listing(&self.config.browser)).await?;
        let mut collected = Vec::new();

        for page_number in 1..=self.config.listings.airing_pages {
            match self.airing_page(page.as_mut(), page_number).await {
                Ok(found) => {
                    info!("✅ Processed {} episodes on page {}", found.len(), page_number);
                    collected.extend(found);
                }
                Err(e) => {
                    error!("❌ Error getting currently airing episodes: {}", e);
                    break;
                }
            }
            if collected.len() >= self.config.listings.airing_limit {
                break;
            }
        }

        Self::close(page.as_mut()).await;
        Ok(collected)
    }

    async fn airing_page(&self, page: &mut dyn PageSession, page_number: u32) -> Result<Vec<AiringEpisode>> {
        let url = self.config.site.listing_url(page_number);
        info!("📺 Loading currently airing episodes from: {}", url);
        self.load(page, &url).await?;
        listings::extract_airing(page, &self.config.site)
            .await
            .map_err(ResolveError::browser)
    }

    /// Popular titles from the site's front page
    pub async fn popular(&self, runtime: &dyn BrowserRuntime) -> Result<Vec<PopularAnime>> {
        let mut page = self.open(runtime, ContextOptions::listing(&self.config.browser)).await?;
        let outcome = self.popular_on(page.as_mut()).await;
        Self::close(page.as_mut()).await;
        outcome
    }

    async fn popular_on(&self, page: &mut dyn PageSession) -> Result<Vec<PopularAnime>> {
        let url = self.config.site.listing_url(1);
        info!("📺 Loading popular anime from: {}", url);
        self.load(page, &url).await?;
        listings::extract_popular(page, &self.config.site, self.config.listings.popular_limit)
            .await
            .map_err(ResolveError::browser)
    }
}
