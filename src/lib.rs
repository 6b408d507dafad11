/// Anime Resolver
///
/// Resolves searchable titles, per-title episode lists and per-episode player
/// URLs for a video catalog site, consulting a static index, a persistent
/// cache and a live browser-driven scrape in that order.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extraction;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod scrape;
pub mod worker;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::browser::{BrowserRuntime, HtmlBrowser, PageSession, ReqwestFetcher};
pub use crate::cache::{CacheStats, CacheStore};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{ResolveError, Result};
pub use crate::extraction::{ExtractionChain, IframeStrategy};
pub use crate::index::{IndexStore, MatchType, SearchMatch};
pub use crate::models::{
    AiringEpisode, AnimeRecord, EpisodePage, EpisodeRecord, EpisodeSummary, IframeResolution, PopularAnime,
    ResolutionSource,
};
pub use crate::pipeline::{PipelineStatus, ResolutionPipeline};
pub use crate::scrape::SiteScraper;
pub use crate::worker::WorkerHandle;
