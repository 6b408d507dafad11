/// HTML document runtime: pages are fetched over HTTP and queried with CSS
/// selectors. Scripts never run, so clicks only follow links and script
/// evaluation is unavailable.
use super::{BrowserRuntime, ContextOptions, ElementHandle, PageSession, RequestListener, WaitPolicy};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A fetched document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Source of raw documents for [`HtmlBrowser`]
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<FetchedPage>;
}

/// Fetcher backed by a shared reqwest client
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;

        // Error statuses still carry a document; the caller inspects its title
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        debug!("🌐 GET {} -> {} ({} bytes)", final_url, status, body.len());

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}

/// Runtime that loads documents through a [`PageFetcher`]
pub struct HtmlBrowser<F: PageFetcher> {
    fetcher: Arc<F>,
}

impl<F: PageFetcher> HtmlBrowser<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }
}

#[async_trait]
impl<F: PageFetcher> BrowserRuntime for HtmlBrowser<F> {
    async fn new_context(&self, options: ContextOptions) -> Result<Box<dyn PageSession>> {
        if options.init_script.is_some() {
            debug!("Init script recorded but not executed by the HTML runtime");
        }
        Ok(Box::new(HtmlSession {
            fetcher: Arc::clone(&self.fetcher),
            options,
            url: String::new(),
            html: String::new(),
            generation: 0,
            listeners: Vec::new(),
            closed: false,
        }))
    }
}

struct HtmlSession<F: PageFetcher> {
    fetcher: Arc<F>,
    options: ContextOptions,
    url: String,
    /// Raw document; parsed per query because the parsed tree is not `Send`
    html: String,
    /// Bumped on every navigation so handles from older documents are rejected
    generation: u64,
    listeners: Vec<RequestListener>,
    closed: bool,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
}

impl<F: PageFetcher> HtmlSession<F> {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("page context is closed");
        }
        Ok(())
    }

    fn ensure_current(&self, element: &ElementHandle) -> Result<()> {
        if element.generation != self.generation {
            bail!("element handle belongs to a previous document");
        }
        Ok(())
    }

    fn emit_request(&self, url: &str) {
        for listener in &self.listeners {
            listener(url);
        }
    }

    fn resolve(&self, raw: &str) -> Option<String> {
        let base = Url::parse(&self.url).ok()?;
        base.join(raw.trim()).ok().map(String::from)
    }

    /// Sub-resources a real browser would request while loading the document
    fn subresources(&self) -> Result<Vec<String>> {
        let document = Html::parse_document(&self.html);
        let selector = parse_selector("iframe[src], frame[src], embed[src], script[src]")?;
        Ok(document
            .select(&selector)
            .filter_map(|element| element.value().attr("src"))
            .filter_map(|src| self.resolve(src))
            .collect())
    }

    fn snapshot<'a>(
        &self,
        document: &'a Html,
        matched: impl Iterator<Item = ElementRef<'a>>,
    ) -> Result<Vec<ElementHandle>> {
        let all = parse_selector("*")?;
        let ordinals: HashMap<_, usize> = document
            .select(&all)
            .enumerate()
            .map(|(ordinal, element)| (element.id(), ordinal))
            .collect();

        Ok(matched
            .filter_map(|element| {
                let ordinal = *ordinals.get(&element.id())?;
                Some(ElementHandle {
                    ordinal,
                    generation: self.generation,
                    tag: element.value().name().to_string(),
                    attributes: element
                        .value()
                        .attrs()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect(),
                    text: element.text().collect::<String>(),
                })
            })
            .collect())
    }

    fn select_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        self.snapshot(&document, document.select(&selector))
    }

    fn select_within(&self, scope: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        let all = parse_selector("*")?;
        let document = Html::parse_document(&self.html);
        let root = document
            .select(&all)
            .nth(scope.ordinal)
            .ok_or_else(|| anyhow!("element no longer present in the document"))?;
        self.snapshot(&document, root.select(&selector))
    }
}

#[async_trait]
impl<F: PageFetcher> PageSession for HtmlSession<F> {
    async fn navigate(&mut self, url: &str, _wait: WaitPolicy, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.emit_request(url);

        let fetched = tokio::time::timeout(timeout, self.fetcher.fetch(url, &self.options.user_agent))
            .await
            .map_err(|_| anyhow!("navigation to {} timed out after {:?}", url, timeout))??;

        self.url = fetched.url;
        self.html = fetched.body;
        self.generation += 1;

        for resource in self.subresources()? {
            self.emit_request(&resource);
        }
        Ok(())
    }

    async fn reload(&mut self, wait: WaitPolicy, timeout: Duration) -> Result<()> {
        if self.url.is_empty() {
            bail!("nothing to reload");
        }
        let url = self.url.clone();
        self.navigate(&url, wait, timeout).await
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    async fn title(&self) -> Result<String> {
        self.ensure_open()?;
        let selector = parse_selector("title")?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&selector)
            .next()
            .map(|title| title.text().collect::<String>().trim().to_string())
            .unwrap_or_default())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.ensure_open()?;
        self.select_all(selector)
    }

    async fn query_within(&self, scope: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        self.ensure_open()?;
        self.ensure_current(scope)?;
        self.select_within(scope, selector)
    }

    async fn evaluate_script(&self, _script: &str) -> Result<serde_json::Value> {
        bail!("script evaluation is not supported by the HTML document runtime")
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<()> {
        self.ensure_open()?;
        self.ensure_current(element)?;

        let target = element
            .attr("href")
            .filter(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
            .and_then(|href| self.resolve(href));

        match target {
            Some(url) => {
                debug!("🖱️ Following link to {}", url);
                let timeout = self.options.navigation_timeout;
                self.navigate(&url, WaitPolicy::Load, timeout).await
            }
            None => {
                debug!("Click on <{}> has no effect without scripts", element.tag);
                Ok(())
            }
        }
    }

    fn on_request(&mut self, listener: RequestListener) {
        self.listeners.push(listener);
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.listeners.clear();
        self.html.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MapFetcher(HashMap<String, String>);

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str, _user_agent: &str) -> Result<FetchedPage> {
            let body = self.0.get(url).cloned().ok_or_else(|| anyhow!("no fixture for {}", url))?;
            Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                body,
            })
        }
    }

    #[test]
    fn test_reqwest_fetcher_builds_client() {
        assert!(ReqwestFetcher::new().is_ok());
    }

    fn options() -> ContextOptions {
        ContextOptions {
            user_agent: "test".to_string(),
            viewport: (800, 600),
            init_script: None,
            navigation_timeout: Duration::from_secs(5),
        }
    }

    fn browser() -> HtmlBrowser<MapFetcher> {
        let mut pages = HashMap::new();
        pages.insert(
            "https://site.test/a".to_string(),
            r#"<html><head><title> Page A </title><script src="/js/app.js"></script></head>
               <body><div id="player" data-src="https://kwik.cx/e/1"><iframe src="//cdn.test/embed/9"></iframe></div>
               <a class="next" href="/b">Next</a></body></html>"#
                .to_string(),
        );
        pages.insert(
            "https://site.test/b".to_string(),
            "<html><head><title>Page B</title></head><body></body></html>".to_string(),
        );
        HtmlBrowser::new(MapFetcher(pages))
    }

    #[tokio::test]
    async fn test_navigate_and_query() {
        let mut page = browser().new_context(options()).await.unwrap();
        page.navigate("https://site.test/a", WaitPolicy::Load, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.title().await.unwrap(), "Page A");
        let containers = page.query_all("#player").await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].attr("data-src"), Some("https://kwik.cx/e/1"));

        let nested = page.query_within(&containers[0], "iframe").await.unwrap();
        assert_eq!(nested[0].attr("src"), Some("//cdn.test/embed/9"));
        assert!(page.query_within(&containers[0], "div").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requests_are_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut page = browser().new_context(options()).await.unwrap();
        page.on_request(Box::new(move |url| sink.lock().unwrap().push(url.to_string())));
        page.navigate("https://site.test/a", WaitPolicy::NetworkIdle, Duration::from_secs(5))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&"https://site.test/a".to_string()));
        assert!(seen.contains(&"https://site.test/js/app.js".to_string()));
        assert!(seen.contains(&"https://cdn.test/embed/9".to_string()));
    }

    #[tokio::test]
    async fn test_click_follows_links_and_invalidates_handles() {
        let mut page = browser().new_context(options()).await.unwrap();
        page.navigate("https://site.test/a", WaitPolicy::Load, Duration::from_secs(5))
            .await
            .unwrap();

        let link = page.query_all("a.next").await.unwrap().remove(0);
        let container = page.query_all("#player").await.unwrap().remove(0);
        page.click(&link).await.unwrap();

        assert_eq!(page.url(), "https://site.test/b");
        assert_eq!(page.title().await.unwrap(), "Page B");
        assert!(page.query_within(&container, "iframe").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_page_rejects_queries() {
        let mut page = browser().new_context(options()).await.unwrap();
        page.close().await.unwrap();
        assert!(page.query_all("div").await.is_err());
        assert!(page.evaluate_script("1 + 1").await.is_err());
    }
}
