//! Ordered player URL discovery on a loaded episode page
//!
//! Strategies run in a fixed order and the first one that produces a URL
//! wins. A strategy that errors is logged and treated as a miss, so one
//! broken step never prevents the later ones from running.

pub mod strategies;

pub use strategies::{DirectIframeScan, InteractionScan, PlayerContainerScan, ScriptContentScan};

use crate::browser::PageSession;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Keywords that mark a URL as a video player
pub const PLAYER_KEYWORDS: &[&str] = &["player", "video", "embed", "kwik", "stream"];

/// Page-independent inputs shared by every strategy
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Origin of the catalog site
    pub site_origin: Url,
    /// URL the episode page was requested with
    pub page_url: String,
    /// Wait after clicking a play control
    pub interaction_settle: Duration,
}

impl ExtractionContext {
    pub fn absolutize(&self, raw: &str) -> Option<String> {
        absolutize(&self.page_url, &self.site_origin, raw)
    }

    /// Player acceptance rule: a known keyword, or any host other than the site's
    pub fn looks_like_player(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        if PLAYER_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
            return true;
        }
        match Url::parse(url) {
            Ok(parsed) => parsed.host_str() != self.site_origin.host_str(),
            Err(_) => false,
        }
    }
}

/// Turn a raw `src`-style attribute into an absolute URL.
///
/// Absolute URLs pass through, scheme-relative ones get `https:`, root-relative
/// ones get the site origin and anything else is appended to the page URL.
pub fn absolutize(page_url: &str, site_origin: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let absolute = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.starts_with("//") {
        format!("https:{}", raw)
    } else if raw.starts_with('/') {
        format!("{}{}", site_origin.origin().ascii_serialization(), raw)
    } else {
        format!("{}/{}", page_url.trim_end_matches('/'), raw)
    };
    Some(absolute)
}

/// One way of finding the player URL on a loaded page
#[async_trait]
pub trait IframeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` is a normal miss; errors are reserved for failed page operations
    async fn attempt(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Result<Option<String>>;
}

pub struct ExtractionChain {
    strategies: Vec<Box<dyn IframeStrategy>>,
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Box<dyn IframeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct scan, script scan, player containers, then play-control interaction
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(DirectIframeScan),
            Box::new(ScriptContentScan),
            Box::new(PlayerContainerScan),
            Box::new(InteractionScan),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// First URL any strategy finds, or `None` once all of them missed
    pub async fn run(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Option<String> {
        for strategy in &self.strategies {
            debug!("🔍 Trying {}", strategy.name());
            match strategy.attempt(page, context).await {
                Ok(Some(url)) => {
                    info!("✅ {} found player: {}", strategy.name(), url);
                    return Some(url);
                }
                Ok(None) => debug!("{} found nothing", strategy.name()),
                Err(e) => warn!("⚠️ {} failed: {:#}", strategy.name(), e),
            }
        }

        warn!("❌ No iframe found after all strategies on {}", context.page_url);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ElementHandle, RequestListener, WaitPolicy};
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn origin() -> Url {
        Url::parse("https://animepahe.si").unwrap()
    }

    fn context() -> ExtractionContext {
        ExtractionContext {
            site_origin: origin(),
            page_url: "https://animepahe.si/play/a1/s1".to_string(),
            interaction_settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_absolutize_rules() {
        let page = "https://animepahe.si/play/a1/s1";
        assert_eq!(absolutize(page, &origin(), "https://kwik.cx/e/1").unwrap(), "https://kwik.cx/e/1");
        assert_eq!(absolutize(page, &origin(), "//kwik.cx/e/1").unwrap(), "https://kwik.cx/e/1");
        assert_eq!(absolutize(page, &origin(), "/embed/1").unwrap(), "https://animepahe.si/embed/1");
        assert_eq!(absolutize(page, &origin(), "embed/1").unwrap(), "https://animepahe.si/play/a1/s1/embed/1");
        assert!(absolutize(page, &origin(), "  ").is_none());
    }

    #[test]
    fn test_player_acceptance() {
        let context = context();
        assert!(context.looks_like_player("https://animepahe.si/embed/1"));
        assert!(context.looks_like_player("https://cdn.other.net/x/1"));
        assert!(!context.looks_like_player("https://animepahe.si/ads/banner"));
    }

    /// Page stub that never has anything to offer
    struct BlankPage;

    #[async_trait]
    impl PageSession for BlankPage {
        async fn navigate(&mut self, _url: &str, _wait: WaitPolicy, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        async fn reload(&mut self, _wait: WaitPolicy, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        fn url(&self) -> String {
            "https://animepahe.si/play/a1/s1".to_string()
        }
        async fn title(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn query_all(&self, _selector: &str) -> Result<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
        async fn query_within(&self, _scope: &ElementHandle, _selector: &str) -> Result<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
        async fn evaluate_script(&self, _script: &str) -> Result<serde_json::Value> {
            bail!("unsupported")
        }
        async fn click(&mut self, _element: &ElementHandle) -> Result<()> {
            Ok(())
        }
        fn on_request(&mut self, _listener: RequestListener) {}
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixed {
        name: &'static str,
        outcome: Option<&'static str>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IframeStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, _page: &mut dyn PageSession, _context: &ExtractionContext) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("selector timed out");
            }
            Ok(self.outcome.map(str::to_string))
        }
    }

    #[tokio::test]
    async fn test_first_success_wins_and_errors_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = |name, outcome, fail| -> Box<dyn IframeStrategy> {
            Box::new(Fixed {
                name,
                outcome,
                fail,
                calls: Arc::clone(&calls),
            })
        };

        let chain = ExtractionChain::new(vec![
            strategy("broken", None, true),
            strategy("empty", None, false),
            strategy("first", Some("https://kwik.cx/e/first"), false),
            strategy("second", Some("https://kwik.cx/e/second"), false),
        ]);

        let mut page = BlankPage;
        let found = chain.run(&mut page, &context()).await;
        assert_eq!(found.as_deref(), Some("https://kwik.cx/e/first"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_standard_chain_misses_on_blank_page() {
        let chain = ExtractionChain::standard();
        assert_eq!(
            chain.strategy_names(),
            vec!["direct_iframe", "script_content", "player_container", "interaction"]
        );

        let mut page = BlankPage;
        assert!(chain.run(&mut page, &context()).await.is_none());
    }
}
