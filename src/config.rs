use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Configuration for the anime resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target site settings
    pub site: SiteConfig,

    /// Static index location
    pub index: IndexConfig,

    /// Persistent cache settings
    pub cache: CacheConfig,

    /// Listing and pagination sizes
    pub listings: ListingConfig,

    /// Browser session settings
    pub browser: BrowserConfig,

    /// Browser worker settings
    pub worker: WorkerConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin of the catalog site, without trailing slash
    pub base_url: String,

    /// Suffix stripped from page titles to obtain the anime title
    pub title_suffix: String,

    /// Page title fragments that identify an anti-automation challenge page
    pub challenge_markers: Vec<String>,

    /// Page title fragments that identify a missing page
    pub not_found_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the catalog documents
    pub index_dir: PathBuf,

    /// Consolidated document that takes precedence when present
    pub master_file: String,

    /// Prefix of the per-file catalog documents
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backing file for the cache store
    pub cache_file: PathBuf,

    /// Freshness window for listing caches
    pub listing_ttl_hours: i64,

    /// Default retention used by explicit sweeps
    pub retention_days: i64,

    /// Retention applied once at server startup (None disables the sweep)
    pub startup_sweep_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size for index-backed episode lists
    pub episodes_per_page: usize,

    /// Listing pages scraped for currently airing episodes
    pub airing_pages: u32,

    /// Stop scraping airing pages once this many episodes are collected
    pub airing_limit: usize,

    /// Maximum number of popular titles kept
    pub popular_limit: usize,

    /// Maximum number of search results
    pub search_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// User agent for listing and episode-list pages
    pub user_agent: String,

    /// User agent for episode player pages
    pub player_user_agent: String,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Script injected into player page contexts to hide automation signals
    pub stealth_init_script: String,

    /// Timeout for a single navigation
    pub navigation_timeout_seconds: u64,

    /// Wait before reloading a challenge page
    pub challenge_wait_ms: u64,

    /// Wait after a page load before extraction starts
    pub page_settle_ms: u64,

    /// Wait after clicking a play control
    pub interaction_settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Upper bound on a submitted job, including queueing time
    pub call_timeout_seconds: u64,

    /// Pending jobs accepted before submitters wait for capacity
    pub queue_depth: usize,

    /// How long the server waits for the worker before serving anyway
    pub startup_wait_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl SiteConfig {
    /// Parsed site origin
    pub fn origin(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| anyhow!("Invalid base_url {}: {}", self.base_url, e))
    }

    pub fn anime_url(&self, anime_id: &str, page: u32) -> String {
        if page > 1 {
            format!("{}/anime/{}?page={}", self.base_url, anime_id, page)
        } else {
            format!("{}/anime/{}", self.base_url, anime_id)
        }
    }

    pub fn play_url(&self, anime_id: &str, session: &str) -> String {
        format!("{}/play/{}/{}", self.base_url, anime_id, session)
    }

    pub fn listing_url(&self, page: u32) -> String {
        if page > 1 {
            format!("{}?page={}", self.base_url, page)
        } else {
            self.base_url.clone()
        }
    }

    pub fn is_challenge(&self, title: &str) -> bool {
        self.challenge_markers.iter().any(|m| title.contains(m.as_str()))
    }

    pub fn is_not_found(&self, title: &str) -> bool {
        self.not_found_markers.iter().any(|m| title.contains(m.as_str()))
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_seconds)
    }

    pub fn challenge_wait(&self) -> Duration {
        Duration::from_millis(self.challenge_wait_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn interaction_settle(&self) -> Duration {
        Duration::from_millis(self.interaction_settle_ms)
    }
}

impl WorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "anime-resolver.toml",
            "config/anime-resolver.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from(Path::new(path)) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to parse config file {}: {}", path, e),
                }
            }
        }

        // Fall back to defaults overridden by the environment
        Self::from_env()
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("ANIME_RESOLVER_BASE_URL") {
            config.site.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(index_dir) = std::env::var("ANIME_RESOLVER_INDEX_DIR") {
            config.index.index_dir = PathBuf::from(index_dir);
        }

        if let Ok(cache_file) = std::env::var("ANIME_RESOLVER_CACHE_FILE") {
            config.cache.cache_file = PathBuf::from(cache_file);
        }

        if let Ok(port) = std::env::var("ANIME_RESOLVER_PORT") {
            config.server.port = port.parse().unwrap_or(5002);
        }

        if let Ok(timeout) = std::env::var("ANIME_RESOLVER_CALL_TIMEOUT") {
            config.worker.call_timeout_seconds = timeout.parse().unwrap_or(120);
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.site.origin()?;

        if self.listings.episodes_per_page == 0 {
            return Err(anyhow!("episodes_per_page must be greater than 0"));
        }

        if self.cache.listing_ttl_hours <= 0 {
            return Err(anyhow!("listing_ttl_hours must be greater than 0"));
        }

        if self.cache.retention_days < 0 {
            return Err(anyhow!("retention_days must not be negative"));
        }

        if self.worker.call_timeout_seconds == 0 {
            return Err(anyhow!("call_timeout_seconds must be greater than 0"));
        }

        if self.worker.queue_depth == 0 {
            return Err(anyhow!("queue_depth must be greater than 0"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Anime Resolver Configuration:\n\
            - Site: {}\n\
            - Index Directory: {}\n\
            - Cache File: {}\n\
            - Listing TTL: {}h\n\
            - Episodes Per Page: {}\n\
            - Worker Call Timeout: {}s\n\
            - Server: {}:{}",
            self.site.base_url,
            self.index.index_dir.display(),
            self.cache.cache_file.display(),
            self.cache.listing_ttl_hours,
            self.listings.episodes_per_page,
            self.worker.call_timeout_seconds,
            self.server.host,
            self.server.port
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig {
                base_url: "https://animepahe.si".to_string(),
                title_suffix: ":: animepahe".to_string(),
                challenge_markers: vec!["DDoS-Guard".to_string(), "Just a moment".to_string()],
                not_found_markers: vec!["404".to_string(), "Not Found".to_string()],
            },
            index: IndexConfig {
                index_dir: PathBuf::from("anime_index"),
                master_file: "master_index.json".to_string(),
                file_prefix: "anime_".to_string(),
            },
            cache: CacheConfig {
                cache_file: PathBuf::from("data.json"),
                listing_ttl_hours: 24,
                retention_days: 30,
                startup_sweep_days: Some(7),
            },
            listings: ListingConfig {
                episodes_per_page: 50,
                airing_pages: 3,
                airing_limit: 30,
                popular_limit: 12,
                search_limit: 20,
            },
            browser: BrowserConfig {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
                player_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                viewport_width: 1920,
                viewport_height: 1080,
                stealth_init_script: "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });".to_string(),
                navigation_timeout_seconds: 60,
                challenge_wait_ms: 10_000,
                page_settle_ms: 3_000,
                interaction_settle_ms: 3_000,
            },
            worker: WorkerConfig {
                call_timeout_seconds: 120,
                queue_depth: 32,
                startup_wait_seconds: 30,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5002,
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.site.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache_file(mut self, path: PathBuf) -> Self {
        self.config.cache.cache_file = path;
        self
    }

    pub fn with_episodes_per_page(mut self, size: usize) -> Self {
        self.config.listings.episodes_per_page = size;
        self
    }

    /// Drop every settle and challenge wait (fixtures load instantly)
    pub fn without_waits(mut self) -> Self {
        self.config.browser.challenge_wait_ms = 0;
        self.config.browser.page_settle_ms = 0;
        self.config.browser.interaction_settle_ms = 0;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listings.episodes_per_page, 50);
        assert_eq!(config.cache.listing_ttl_hours, 24);
        assert_eq!(config.cache.retention_days, 30);
        assert_eq!(config.worker.call_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_base_url("https://example.test/")
            .with_episodes_per_page(10)
            .without_waits()
            .build();

        assert_eq!(config.site.base_url, "https://example.test");
        assert_eq!(config.listings.episodes_per_page, 10);
        assert_eq!(config.browser.page_settle(), Duration::ZERO);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("anime-resolver.toml");

        let mut config = ConfigBuilder::new().with_episodes_per_page(25).build();
        config.server.port = 6100;
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 6100);
        assert_eq!(loaded.listings.episodes_per_page, 25);
        assert_eq!(loaded.site.base_url, config.site.base_url);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let broken = ConfigBuilder::new().with_episodes_per_page(0).build();
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_site_urls() {
        let site = Config::default().site;
        assert_eq!(site.anime_url("abc", 1), "https://animepahe.si/anime/abc");
        assert_eq!(site.anime_url("abc", 2), "https://animepahe.si/anime/abc?page=2");
        assert_eq!(site.play_url("abc", "s1"), "https://animepahe.si/play/abc/s1");
        assert_eq!(site.listing_url(3), "https://animepahe.si?page=3");
        assert!(site.is_challenge("DDoS-Guard"));
        assert!(site.is_not_found("404 Not Found"));
        assert!(!site.is_not_found("Episode 4"));
    }

    #[test]
    fn test_toml_round_trip_parses() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.site.base_url, config.site.base_url);
        assert_eq!(parsed.cache.startup_sweep_days, Some(7));
    }
}
