use anime_resolver::browser::{BrowserRuntime, ContextOptions, FetchedPage, PageFetcher, PageSession};
use anime_resolver::{
    AnimeRecord, CacheStore, Config, ConfigBuilder, EpisodeRecord, HtmlBrowser, IndexStore, ResolutionPipeline,
    ResolutionSource, ResolveError, SiteScraper, WorkerHandle,
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const BASE: &str = "https://site.test";

/// Serves HTML fixtures by URL and counts fetches per URL
#[derive(Clone, Default)]
struct FixtureFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl FixtureFetcher {
    fn serve(&self, url: &str, html: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), html.to_string());
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, _user_agent: &str) -> anyhow::Result<FetchedPage> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let body = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture for {}", url))?;
        Ok(FetchedPage {
            url: url.to_string(),
            status: 200,
            body,
        })
    }
}

struct Harness {
    pipeline: ResolutionPipeline,
    fetcher: FixtureFetcher,
    config: Arc<Config>,
    _temp_dir: TempDir,
}

fn test_config(temp_dir: &TempDir) -> Arc<Config> {
    Arc::new(
        ConfigBuilder::new()
            .with_base_url(BASE)
            .with_cache_file(temp_dir.path().join("data.json"))
            .without_waits()
            .build(),
    )
}

async fn harness(records: Vec<AnimeRecord>) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let fetcher = FixtureFetcher::default();

    let cache = CacheStore::open(config.cache.cache_file.clone(), config.cache.listing_ttl_hours).await;
    let worker = WorkerHandle::spawn(
        Arc::new(HtmlBrowser::new(fetcher.clone())),
        SiteScraper::new(config.clone()),
        &config.worker,
    );
    assert!(worker.wait_until_ready(Duration::from_secs(5)).await);

    let pipeline = ResolutionPipeline::new(
        Arc::new(IndexStore::from_records(records)),
        cache,
        worker,
        config.clone(),
    );
    Harness {
        pipeline,
        fetcher,
        config,
        _temp_dir: temp_dir,
    }
}

fn numbered_episodes(count: i64) -> Vec<EpisodeRecord> {
    // Stored newest first, as catalog jobs tend to write them
    (1..=count)
        .rev()
        .map(|n| EpisodeRecord {
            number: Some(n.into()),
            title: format!("Episode {} - Chapter {}", n, n),
            url: String::new(),
            episode_id: format!("s{}", n),
            iframe_url: None,
        })
        .collect()
}

fn play_url(anime_id: &str, session: &str) -> String {
    format!("{}/play/{}/{}", BASE, anime_id, session)
}

const PLAYER_PAGE: &str = r#"<html><head><title>Episode 1 :: animepahe</title></head>
<body><div class="content"><iframe src="https://kwik.cx/e/abc123"></iframe></div></body></html>"#;

const EMPTY_PLAYER_PAGE: &str = r#"<html><head><title>Episode 1 :: animepahe</title></head>
<body><div class="content"><p>Loading...</p></div></body></html>"#;

#[tokio::test]
async fn test_index_pagination_over_120_episodes() {
    let h = harness(vec![AnimeRecord {
        id: "long".to_string(),
        title: "Long Runner".to_string(),
        episodes: numbered_episodes(120),
    }])
    .await;

    let first = h.pipeline.resolve_episodes("long", 1).await.unwrap();
    assert_eq!(first.episodes.len(), 50);
    assert_eq!(first.episodes[0].session, "s1");
    assert_eq!(first.episodes[49].session, "s50");
    assert_eq!(first.episodes[0].title, "Chapter 1");
    assert_eq!(first.total_episodes, 120);
    assert!(first.has_next_page);
    assert_eq!(first.next_page, Some(2));

    let last = h.pipeline.resolve_episodes("long", 3).await.unwrap();
    assert_eq!(last.episodes.len(), 20);
    assert_eq!(last.episodes[0].session, "s101");
    assert_eq!(last.episodes[19].session, "s120");
    assert!(!last.has_next_page);
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn test_indexed_iframe_wins_without_touching_cache() {
    let mut episodes = numbered_episodes(2);
    episodes[1].iframe_url = Some("https://kwik.cx/e/indexed".to_string());
    let h = harness(vec![AnimeRecord {
        id: "a1".to_string(),
        title: "Indexed".to_string(),
        episodes,
    }])
    .await;
    h.fetcher.serve(&play_url("a1", "s1"), PLAYER_PAGE);

    let resolution = h.pipeline.resolve_iframe("a1", "s1").await.unwrap();
    assert_eq!(resolution.iframe_url.as_deref(), Some("https://kwik.cx/e/indexed"));
    assert_eq!(resolution.source, ResolutionSource::Index);
    assert_eq!(h.fetcher.hits(&play_url("a1", "s1")), 0);
    assert_eq!(h.pipeline.cache_stats().await.iframes_cached, 0);
}

#[tokio::test]
async fn test_failed_iframe_is_never_reused() {
    let h = harness(Vec::new()).await;
    let url = play_url("a1", "s1");
    h.fetcher.serve(&url, EMPTY_PLAYER_PAGE);

    let first = h.pipeline.resolve_iframe("a1", "s1").await.unwrap();
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("no iframe found"));
    assert_eq!(
        first.failure_message().as_deref(),
        Some("Could not load player: no iframe found")
    );
    let after_first = h.fetcher.hits(&url);
    assert!(after_first >= 1);

    let second = h.pipeline.resolve_iframe("a1", "s1").await.unwrap();
    assert!(!second.success);
    assert!(h.fetcher.hits(&url) > after_first);

    // Once the player shows up it is found live, then served from the cache
    h.fetcher.serve(&url, PLAYER_PAGE);
    let third = h.pipeline.resolve_iframe("a1", "s1").await.unwrap();
    assert!(third.success);
    assert_eq!(third.source, ResolutionSource::Live);
    assert_eq!(third.iframe_url.as_deref(), Some("https://kwik.cx/e/abc123"));

    let hits = h.fetcher.hits(&url);
    let fourth = h.pipeline.resolve_iframe("a1", "s1").await.unwrap();
    assert_eq!(fourth.source, ResolutionSource::Cache);
    assert_eq!(h.fetcher.hits(&url), hits);
}

#[tokio::test]
async fn test_not_found_and_challenge_pages_are_recorded_failures() {
    let h = harness(Vec::new()).await;
    h.fetcher.serve(
        &play_url("a1", "gone"),
        "<html><head><title>404 Not Found</title></head><body></body></html>",
    );
    h.fetcher.serve(
        &play_url("a1", "guarded"),
        "<html><head><title>DDoS-Guard</title></head><body></body></html>",
    );

    let missing = h.pipeline.resolve_iframe("a1", "gone").await.unwrap();
    assert_eq!(missing.error.as_deref(), Some("page not found"));

    let guarded = h.pipeline.resolve_iframe("a1", "guarded").await.unwrap();
    assert!(!guarded.success);
    assert!(guarded.error.as_deref().unwrap().contains("challenge page never cleared"));
    // Initial load plus exactly one reload
    assert_eq!(h.fetcher.hits(&play_url("a1", "guarded")), 2);

    let stats = h.pipeline.cache_stats().await;
    assert_eq!(stats.iframes_cached, 2);
}

#[tokio::test]
async fn test_live_episodes_are_deduplicated_sorted_and_cached() {
    let h = harness(Vec::new()).await;
    let anime_url = format!("{}/anime/b1", BASE);
    h.fetcher.serve(
        &anime_url,
        r#"<html><head><title>Bleach :: animepahe</title></head><body><table>
            <tr data-session="aaa"><td>2</td><td>Episode 2 - The Second</td></tr>
            <tr data-session="bbb"><td>1</td><td>Episode 1 - The First</td></tr>
            <tr data-session="aaa"><td>2</td><td>Duplicate row</td></tr>
        </table></body></html>"#,
    );

    // Not in the index, so the first page comes from a live scrape
    let page = h.pipeline.resolve_episodes("b1", 1).await.unwrap();
    assert_eq!(page.title, "Bleach");
    let sessions: Vec<_> = page.episodes.iter().map(|e| e.session.as_str()).collect();
    assert_eq!(sessions, vec!["bbb", "aaa"]);
    assert_eq!(page.episodes[1].title, "The Second");
    assert_eq!(page.episodes[0].url, play_url("b1", "bbb"));
    assert!(!page.has_next_page);

    let cached = h.pipeline.resolve_live_episodes("b1", 1).await.unwrap();
    assert_eq!(cached, page);
    assert_eq!(h.fetcher.hits(&anime_url), 1);
    assert_eq!(h.pipeline.cache_stats().await.anime_cached, 1);
}

#[tokio::test]
async fn test_live_pagination_is_detected_but_later_pages_are_not_cached() {
    let h = harness(Vec::new()).await;
    let second_page = format!("{}/anime/b1?page=2", BASE);
    h.fetcher.serve(
        &second_page,
        r#"<html><head><title>Bleach :: animepahe</title></head><body>
            <table><tr data-session="ccc"><td>31</td><td>Episode 31</td></tr></table>
            <div class="pagination"><a href="?page=1">1</a><a href="?page=2">2</a><a href="?page=3">3</a></div>
        </body></html>"#,
    );

    let page = h.pipeline.resolve_live_episodes("b1", 2).await.unwrap();
    assert_eq!(page.episodes.len(), 1);
    assert_eq!(page.episodes[0].title, "Episode");
    assert!(page.has_next_page);
    assert_eq!(page.next_page, Some(3));

    h.pipeline.resolve_live_episodes("b1", 2).await.unwrap();
    assert_eq!(h.fetcher.hits(&second_page), 2);
    assert_eq!(h.pipeline.cache_stats().await.anime_cached, 0);
}

#[tokio::test]
async fn test_external_cache_write_is_picked_up() {
    let h = harness(Vec::new()).await;

    // Another process records a player URL for an episode we never scraped
    let mut other = CacheStore::open(h.config.cache.cache_file.clone(), 24).await;
    other
        .set_iframe("x1", "y1", Some("https://kwik.cx/e/external".to_string()), None)
        .await;

    let resolution = h.pipeline.resolve_iframe("x1", "y1").await.unwrap();
    assert_eq!(resolution.source, ResolutionSource::Cache);
    assert_eq!(resolution.iframe_url.as_deref(), Some("https://kwik.cx/e/external"));
    assert_eq!(h.fetcher.hits(&play_url("x1", "y1")), 0);

    // A later external rewrite replaces what this process loaded
    other.clear().await;
    let file = std::fs::File::options()
        .write(true)
        .open(&h.config.cache.cache_file)
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

    assert_eq!(h.pipeline.cache_stats().await.iframes_cached, 0);
}

#[tokio::test]
async fn test_listings_fall_back_when_the_site_yields_nothing() {
    let h = harness(vec![AnimeRecord {
        id: "jjk".to_string(),
        title: "Jujutsu Kaisen".to_string(),
        episodes: Vec::new(),
    }])
    .await;
    let empty = "<html><head><title>animepahe</title></head><body></body></html>";
    h.fetcher.serve(BASE, empty);
    h.fetcher.serve(&format!("{}?page=2", BASE), empty);
    h.fetcher.serve(&format!("{}?page=3", BASE), empty);

    let airing = h.pipeline.currently_airing().await.unwrap();
    assert_eq!(airing.len(), 1);
    assert_eq!(airing[0].anime_id, "jjk");
    assert_eq!(airing[0].episode_url, format!("{}/anime/jjk", BASE));

    let popular = h.pipeline.popular_anime().await.unwrap();
    assert_eq!(popular.len(), 12);

    // Both listings are cached now, so the front page is not fetched again
    let hits = h.fetcher.hits(BASE);
    h.pipeline.preload_listings().await;
    assert_eq!(h.fetcher.hits(BASE), hits);
}

#[tokio::test]
async fn test_popular_listing_is_scraped_and_deduplicated() {
    let h = harness(Vec::new()).await;
    h.fetcher.serve(
        BASE,
        r#"<html><head><title>animepahe</title></head><body>
            <div class="sidebar">
                <a href="/anime/aaa-111">Frieren</a>
                <a href="/anime/bbb-222">Dandadan</a>
                <a href="/anime/aaa-111">Frieren again</a>
            </div>
        </body></html>"#,
    );

    let popular = h.pipeline.popular_anime().await.unwrap();
    assert_eq!(popular.len(), 2);
    assert_eq!(popular[0].title, "Frieren");
    assert_eq!(popular[1].url, format!("{}/anime/bbb-222", BASE));
}

struct NeverStarts;

#[async_trait]
impl BrowserRuntime for NeverStarts {
    async fn start(&self) -> anyhow::Result<()> {
        bail!("browser binary missing")
    }

    async fn new_context(&self, _options: ContextOptions) -> anyhow::Result<Box<dyn PageSession>> {
        bail!("not started")
    }
}

#[tokio::test]
async fn test_entry_points_report_not_ready() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let cache = CacheStore::open(config.cache.cache_file.clone(), 24).await;
    let worker = WorkerHandle::spawn(Arc::new(NeverStarts), SiteScraper::new(config.clone()), &config.worker);
    assert!(!worker.wait_until_ready(Duration::from_millis(200)).await);

    let pipeline = ResolutionPipeline::new(
        Arc::new(IndexStore::from_records(Vec::new())),
        cache,
        worker,
        config,
    );

    assert!(!pipeline.readiness());
    assert!(matches!(pipeline.search("naruto").await, Err(ResolveError::NotReady)));
    assert!(matches!(pipeline.resolve_episodes("a1", 1).await, Err(ResolveError::NotReady)));
    assert!(matches!(pipeline.resolve_live_episodes("a1", 1).await, Err(ResolveError::NotReady)));
    assert!(matches!(pipeline.resolve_iframe("a1", "s1").await, Err(ResolveError::NotReady)));
    assert!(matches!(pipeline.currently_airing().await, Err(ResolveError::NotReady)));
    assert!(!pipeline.status().await.ready);
}
