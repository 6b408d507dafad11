use super::{ExtractionContext, IframeStrategy};
use crate::browser::PageSession;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Keywords for URLs pulled out of inline scripts
const SCRIPT_KEYWORDS: &[&str] = &["embed", "player", "iframe", "kwik"];

/// Keywords for captured network requests
const REQUEST_KEYWORDS: &[&str] = &["embed", "player", "kwik"];

const PLAYER_CONTAINERS: &[&str] = &[
    "#player",
    ".player",
    "#video-player",
    ".video-player",
    "#embed-player",
    ".embed-player",
    "[id*=\"player\"]",
    "[class*=\"player\"]",
    ".pahe-player",
    "#kwikPlayer",
];

const EMBED_DATA_ATTRIBUTES: &[&str] = &["data-src", "data-embed", "data-iframe", "data-url"];

const PLAY_CONTROLS: &[&str] = &[
    ".play-button",
    "[class*=\"play\"]",
    ".btn-play",
    "button[onclick*=\"embed\"]",
    "a[href*=\"embed\"]",
];

const COLLECT_SCRIPTS: &str =
    "() => Array.from(document.querySelectorAll('script')).map(s => s.textContent || s.innerText || '')";

/// First iframe on the page whose source passes the player acceptance rule
async fn scan_iframes(page: &dyn PageSession, context: &ExtractionContext) -> Result<Option<String>> {
    let frames = page.query_all("iframe").await?;
    debug!("🎯 Found {} iframe elements", frames.len());

    Ok(frames
        .iter()
        .filter_map(|frame| frame.attr("src"))
        .filter_map(|src| context.absolutize(src))
        .find(|url| context.looks_like_player(url)))
}

/// Enumerate iframes and accept the first that looks like a player
pub struct DirectIframeScan;

#[async_trait]
impl IframeStrategy for DirectIframeScan {
    fn name(&self) -> &'static str {
        "direct_iframe"
    }

    async fn attempt(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Result<Option<String>> {
        scan_iframes(page, context).await
    }
}

/// Look for embed URLs inside inline script text
pub struct ScriptContentScan;

impl ScriptContentScan {
    async fn script_bodies(page: &dyn PageSession) -> Result<Vec<String>> {
        match page.evaluate_script(COLLECT_SCRIPTS).await {
            Ok(value) => Ok(value
                .as_array()
                .map(|bodies| bodies.iter().filter_map(|b| b.as_str().map(str::to_string)).collect())
                .unwrap_or_default()),
            Err(e) => {
                debug!("Script evaluation unavailable ({}), reading script elements", e);
                Ok(page
                    .query_all("script")
                    .await?
                    .into_iter()
                    .map(|script| script.text)
                    .collect())
            }
        }
    }
}

#[async_trait]
impl IframeStrategy for ScriptContentScan {
    fn name(&self) -> &'static str {
        "script_content"
    }

    async fn attempt(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Result<Option<String>> {
        let bodies = Self::script_bodies(page).await?;
        let url_pattern = Regex::new(r#"https?://[^"'\s<>]+"#)?;

        let found = bodies
            .iter()
            .flat_map(|body| url_pattern.find_iter(body))
            .map(|m| m.as_str())
            .find(|url| SCRIPT_KEYWORDS.iter().any(|keyword| url.contains(keyword)));

        Ok(found.and_then(|url| context.absolutize(url)))
    }
}

/// Probe likely player containers for a nested iframe or an embed data attribute
pub struct PlayerContainerScan;

#[async_trait]
impl IframeStrategy for PlayerContainerScan {
    fn name(&self) -> &'static str {
        "player_container"
    }

    async fn attempt(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Result<Option<String>> {
        for selector in PLAYER_CONTAINERS {
            let containers = page.query_all(selector).await?;
            if containers.is_empty() {
                continue;
            }
            debug!("🎮 Found {} elements with: {}", containers.len(), selector);

            for container in &containers {
                let nested = page.query_within(container, "iframe").await?;
                let nested_player = nested
                    .iter()
                    .filter_map(|frame| frame.attr("src"))
                    .filter_map(|src| context.absolutize(src))
                    .find(|url| context.looks_like_player(url));
                if let Some(url) = nested_player {
                    return Ok(Some(url));
                }

                let from_data = EMBED_DATA_ATTRIBUTES
                    .iter()
                    .filter_map(|attribute| container.attr(attribute))
                    .find(|value| value.contains("http"))
                    .and_then(|value| context.absolutize(value));
                if from_data.is_some() {
                    return Ok(from_data);
                }
            }
        }
        Ok(None)
    }
}

/// Click play controls, then rescan; fall back to the last player-like
/// request the page issued
pub struct InteractionScan;

#[async_trait]
impl IframeStrategy for InteractionScan {
    fn name(&self) -> &'static str {
        "interaction"
    }

    async fn attempt(&self, page: &mut dyn PageSession, context: &ExtractionContext) -> Result<Option<String>> {
        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        page.on_request(Box::new(move |url| {
            if REQUEST_KEYWORDS.iter().any(|keyword| url.contains(keyword)) {
                debug!("🌐 Network request: {}", url);
                if let Ok(mut requests) = sink.lock() {
                    requests.push(url.to_string());
                }
            }
        }));

        for selector in PLAY_CONTROLS {
            let controls = match page.query_all(selector).await {
                Ok(controls) => controls,
                Err(e) => {
                    debug!("⚠️ Control search failed for {}: {}", selector, e);
                    continue;
                }
            };

            for control in &controls {
                info!("🖱️ Clicking {} control", selector);
                if let Err(e) = page.click(control).await {
                    debug!("⚠️ Click failed: {}", e);
                    continue;
                }
                page.wait(context.interaction_settle).await;

                match scan_iframes(page, context).await {
                    Ok(Some(url)) => return Ok(Some(url)),
                    Ok(None) => {}
                    Err(e) => debug!("⚠️ Rescan after click failed: {}", e),
                }

                let last_request = captured.lock().ok().and_then(|requests| requests.last().cloned());
                if let Some(url) = last_request {
                    info!("✅ Found iframe URL from network: {}", url);
                    return Ok(Some(url));
                }
            }
        }
        Ok(None)
    }
}
