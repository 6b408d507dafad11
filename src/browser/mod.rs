/// Browser automation seam
///
/// Scraping code only talks to [`BrowserRuntime`] and [`PageSession`]; the
/// worker owns the runtime. [`html::HtmlBrowser`] is the bundled runtime and
/// drives plain HTTP document loads.
pub mod html;

pub use html::{FetchedPage, HtmlBrowser, PageFetcher, ReqwestFetcher};

use crate::config::BrowserConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Load,
    NetworkIdle,
}

/// Settings for one isolated browsing context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_agent: String,
    pub viewport: (u32, u32),
    /// Script run before any page script in every document of the context
    pub init_script: Option<String>,
    pub navigation_timeout: Duration,
}

impl ContextOptions {
    /// Context used for listing and episode-list pages
    pub fn listing(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            viewport: (config.viewport_width, config.viewport_height),
            init_script: None,
            navigation_timeout: config.navigation_timeout(),
        }
    }

    /// Context used for episode player pages
    pub fn player(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.player_user_agent.clone(),
            viewport: (config.viewport_width, config.viewport_height),
            init_script: Some(config.stealth_init_script.clone()),
            navigation_timeout: config.navigation_timeout(),
        }
    }
}

/// Snapshot of a DOM element, valid until the page navigates again
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub(crate) ordinal: usize,
    pub(crate) generation: u64,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
}

impl ElementHandle {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Trimmed text content
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

/// Observer for outbound requests issued by a page
pub type RequestListener = Box<dyn Fn(&str) + Send + Sync>;

/// Browser process owned by the worker
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    /// Bring the runtime up; called once by the worker before it accepts jobs
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Open a fresh isolated context with a single page
    async fn new_context(&self, options: ContextOptions) -> Result<Box<dyn PageSession>>;
}

/// One page inside an isolated context
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&mut self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<()>;

    async fn reload(&mut self, wait: WaitPolicy, timeout: Duration) -> Result<()>;

    /// URL of the loaded document, empty before the first navigation
    fn url(&self) -> String;

    async fn title(&self) -> Result<String>;

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Descendants of `scope` matching `selector`, excluding `scope` itself
    async fn query_within(&self, scope: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>>;

    async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value>;

    async fn click(&mut self, element: &ElementHandle) -> Result<()>;

    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    /// Register an observer for every request the page issues from now on
    fn on_request(&mut self, listener: RequestListener);

    async fn close(&mut self) -> Result<()>;
}
