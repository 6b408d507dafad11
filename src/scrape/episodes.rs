/// Episode row extraction from a loaded anime page
use super::title::{clean_episode_title, first_number, PLACEHOLDER_TITLE};
use crate::browser::{ElementHandle, PageSession};
use crate::config::SiteConfig;
use crate::models::EpisodeSummary;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

const SESSION_ROWS: &str = "tr[data-session]";
const TABLE_PLAY_LINKS: &str = "table a[href*=\"/play/\"]";
const EPISODE_CONTAINERS: &str = "[class*=\"episode\"], .episode-list li";
const PLAY_LINK: &str = "a[href*=\"/play/\"]";

/// Extract episodes with the first method that yields anything: session
/// rows, then play links inside tables, then generic episode containers.
/// Results of different methods are never merged.
pub async fn extract_episodes(page: &dyn PageSession, site: &SiteConfig, anime_id: &str) -> Result<Vec<EpisodeSummary>> {
    let rows = page.query_all(SESSION_ROWS).await?;
    if !rows.is_empty() {
        info!("🎯 Found {} episodes with data-session", rows.len());
        let mut episodes = Vec::with_capacity(rows.len());
        for row in &rows {
            match from_session_row(page, site, anime_id, row).await {
                Ok(Some(episode)) => episodes.push(episode),
                Ok(None) => {}
                Err(e) => warn!("⚠️ Error extracting from session row: {}", e),
            }
        }
        return Ok(episodes);
    }

    let session_pattern = Regex::new(r"/play/[a-f0-9-]+/([a-f0-9]+)")?;

    let links = page.query_all(TABLE_PLAY_LINKS).await?;
    if !links.is_empty() {
        info!("🎯 Found {} episode links in tables", links.len());
        return Ok(links
            .iter()
            .filter_map(|link| from_play_link(site, &session_pattern, link))
            .collect());
    }

    let containers = page.query_all(EPISODE_CONTAINERS).await?;
    if !containers.is_empty() {
        info!("🎯 Found {} episode containers", containers.len());
        let onclick_pattern = Regex::new(r"/([a-f0-9]{8,})")?;
        let mut episodes = Vec::new();
        for container in &containers {
            match from_container(page, site, anime_id, &session_pattern, &onclick_pattern, container).await {
                Ok(Some(episode)) => episodes.push(episode),
                Ok(None) => {}
                Err(e) => warn!("⚠️ Error extracting from container: {}", e),
            }
        }
        return Ok(episodes);
    }

    warn!("⚠️ No episodes found with any method");
    Ok(Vec::new())
}

async fn from_session_row(
    page: &dyn PageSession,
    site: &SiteConfig,
    anime_id: &str,
    row: &ElementHandle,
) -> Result<Option<EpisodeSummary>> {
    let Some(session) = row.attr("data-session").filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let cells = page.query_within(row, "td").await?;
    let number = cells.first().map(|cell| first_number(cell.text())).unwrap_or(0);
    let title = cells
        .get(1)
        .map(|cell| clean_episode_title(cell.text()))
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());

    Ok(Some(EpisodeSummary {
        number: Some(number.into()),
        title,
        url: site.play_url(anime_id, session),
        session: session.to_string(),
    }))
}

fn from_play_link(site: &SiteConfig, session_pattern: &Regex, link: &ElementHandle) -> Option<EpisodeSummary> {
    let href = link.attr("href")?;
    let session = session_pattern.captures(href)?.get(1)?.as_str().to_string();
    let text = link.text();

    let url = if href.starts_with('/') {
        format!("{}{}", site.base_url, href)
    } else {
        href.to_string()
    };

    Some(EpisodeSummary {
        number: Some(first_number(text).into()),
        title: clean_episode_title(text),
        url,
        session,
    })
}

async fn from_container(
    page: &dyn PageSession,
    site: &SiteConfig,
    anime_id: &str,
    session_pattern: &Regex,
    onclick_pattern: &Regex,
    container: &ElementHandle,
) -> Result<Option<EpisodeSummary>> {
    if let Some(link) = page.query_within(container, PLAY_LINK).await?.first() {
        return Ok(from_play_link(site, session_pattern, link));
    }

    let text = container.text();
    if text.is_empty() {
        return Ok(None);
    }

    let session = container
        .attr("data-session")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let onclick = container.attr("onclick")?;
            Some(onclick_pattern.captures(onclick)?.get(1)?.as_str().to_string())
        });

    Ok(session.map(|session| EpisodeSummary {
        number: Some(first_number(text).into()),
        title: clean_episode_title(text),
        url: site.play_url(anime_id, &session),
        session,
    }))
}

/// Drop repeated sessions, keeping the first occurrence; entries without a
/// session are dropped too
pub fn dedupe_by_session(episodes: Vec<EpisodeSummary>) -> Vec<EpisodeSummary> {
    let mut seen = HashSet::new();
    episodes
        .into_iter()
        .filter(|episode| !episode.session.is_empty() && seen.insert(episode.session.clone()))
        .collect()
}
