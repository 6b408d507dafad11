//! On-disk layout of the cache file
//!
//! Every top-level key carries a serde default, so a document written by an
//! older version (or trimmed by hand) loads with the missing sections filled
//! with their empty shape. [`CacheFile::migrate`] then stamps the current
//! schema version.

use crate::models::{AiringEpisode, EpisodePage, EpisodeSummary, PopularAnime};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const SCHEMA_VERSION: u32 = 1;

/// Parse a stored timestamp: RFC 3339, or a naive ISO timestamp in local time
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Serde adapter that turns unparseable timestamps into `None` instead of
/// rejecting the whole document
mod lenient_time {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => serializer.serialize_str(&timestamp.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(|value| value.as_str()).and_then(parse_timestamp))
    }
}

/// Cached live episode list, first page only, no expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeListEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub episodes: Vec<EpisodeSummary>,
    #[serde(default)]
    pub total_episodes: usize,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default)]
    pub next_page: Option<u32>,
    #[serde(default, with = "lenient_time")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn first_page() -> u32 {
    1
}

impl EpisodeListEntry {
    pub fn from_page(page: &EpisodePage, now: DateTime<Utc>) -> Self {
        Self {
            title: page.title.clone(),
            episodes: page.episodes.clone(),
            total_episodes: page.total_episodes,
            has_next_page: page.has_next_page,
            current_page: page.current_page,
            next_page: page.next_page,
            timestamp: Some(now),
        }
    }

    pub fn to_page(&self) -> EpisodePage {
        EpisodePage {
            title: self.title.clone(),
            episodes: self.episodes.clone(),
            total_episodes: self.total_episodes,
            has_next_page: self.has_next_page,
            current_page: self.current_page,
            next_page: self.next_page,
        }
    }
}

/// Cached outcome of one player URL resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IframeEntry {
    #[serde(default)]
    pub iframe_url: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, with = "lenient_time")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IframeEntry {
    /// Only successful entries with a URL count as cache hits
    pub fn usable_url(&self) -> Option<&str> {
        if self.success {
            self.iframe_url.as_deref()
        } else {
            None
        }
    }
}

/// Singleton catalog-wide listing with a freshness timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry<T> {
    #[serde(default = "Vec::new", alias = "episodes", alias = "anime")]
    pub items: Vec<T>,
    #[serde(default, with = "lenient_time")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: usize,
}

impl<T> Default for ListingEntry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            timestamp: None,
            count: 0,
        }
    }
}

impl<T: Clone> ListingEntry<T> {
    pub fn new(items: Vec<T>, now: DateTime<Utc>) -> Self {
        let count = items.len();
        Self {
            items,
            timestamp: Some(now),
            count,
        }
    }

    /// Items if the entry was written less than `ttl` before `now`
    pub fn fresh_items(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> Option<Vec<T>> {
        let written = self.timestamp?;
        (now - written < ttl).then(|| self.items.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheMetadata {
    #[serde(default, with = "lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_time")]
    pub last_updated: Option<DateTime<Utc>>,
    /// 0 for documents written before the schema was versioned
    #[serde(default)]
    pub schema_version: u32,
}

/// The whole cache document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheFile {
    /// Live episode lists keyed by anime id
    #[serde(default)]
    pub anime_episodes: BTreeMap<String, EpisodeListEntry>,

    /// Player URL outcomes keyed by anime id, then episode session
    #[serde(default)]
    pub episode_iframes: BTreeMap<String, BTreeMap<String, IframeEntry>>,

    #[serde(default)]
    pub currently_airing_episodes: ListingEntry<AiringEpisode>,

    #[serde(default)]
    pub popular_anime: ListingEntry<PopularAnime>,

    #[serde(default)]
    pub metadata: CacheMetadata,
}

impl CacheFile {
    /// Empty cache stamped with the current schema
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            metadata: CacheMetadata {
                created_at: Some(now),
                last_updated: Some(now),
                schema_version: SCHEMA_VERSION,
            },
            ..Self::default()
        }
    }

    /// Bring a loaded document up to the current schema. Returns whether anything changed.
    pub fn migrate(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if self.metadata.created_at.is_none() {
            self.metadata.created_at = Some(now);
            changed = true;
        }

        if self.metadata.schema_version < SCHEMA_VERSION {
            info!(
                "🔧 Migrating cache schema from v{} to v{}",
                self.metadata.schema_version, SCHEMA_VERSION
            );
            self.metadata.schema_version = SCHEMA_VERSION;
            changed = true;
        }

        changed
    }

    pub fn iframe_count(&self) -> usize {
        self.episode_iframes.values().map(|sessions| sessions.len()).sum()
    }
}
