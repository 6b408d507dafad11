//! Catalog and resolution data types shared across the crate

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Episode number as found in catalog documents and scraped pages.
///
/// Catalog files are produced by external jobs and are not consistent about
/// the JSON type, so integers, floats and numeric strings are all accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodeNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl EpisodeNumber {
    /// Numeric value, if the number is numeric at all
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            EpisodeNumber::Int(n) => *n as f64,
            EpisodeNumber::Float(f) => *f,
            EpisodeNumber::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<i64> for EpisodeNumber {
    fn from(n: i64) -> Self {
        EpisodeNumber::Int(n)
    }
}

impl fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeNumber::Int(n) => write!(f, "{}", n),
            EpisodeNumber::Float(v) => write!(f, "{}", v),
            EpisodeNumber::Text(s) => f.write_str(s),
        }
    }
}

/// Stable sort by episode number.
///
/// A missing number counts as 0. If any number is non-numeric the slice is
/// left untouched and `false` is returned.
pub fn sort_by_episode_number<T, F>(items: &mut [T], number_of: F) -> bool
where
    F: Fn(&T) -> Option<&EpisodeNumber>,
{
    let key = |item: &T| match number_of(item) {
        None => Some(0.0),
        Some(number) => number.as_f64(),
    };

    if items.iter().any(|item| key(item).is_none()) {
        return false;
    }

    items.sort_by(|a, b| {
        key(a)
            .unwrap_or_default()
            .partial_cmp(&key(b).unwrap_or_default())
            .unwrap_or(Ordering::Equal)
    });
    true
}

/// One episode of a catalog title, as stored in the static index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    #[serde(default)]
    pub number: Option<EpisodeNumber>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Session token naming this episode on the site
    #[serde(default)]
    pub episode_id: String,
    /// Pre-recorded player URL, when the index job captured one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
}

/// A catalog title with its episodes, as stored in the static index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub episodes: Vec<EpisodeRecord>,
}

/// Episode entry returned by episode-list resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    #[serde(default)]
    pub number: Option<EpisodeNumber>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub session: String,
}

/// One page of an episode list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodePage {
    pub title: String,
    pub episodes: Vec<EpisodeSummary>,
    /// Total across all pages for index-backed lists, this page only for live scrapes
    pub total_episodes: usize,
    pub has_next_page: bool,
    pub current_page: u32,
    pub next_page: Option<u32>,
}

impl EpisodePage {
    pub fn empty(title: &str, page: u32) -> Self {
        Self {
            title: title.to_string(),
            episodes: Vec::new(),
            total_episodes: 0,
            has_next_page: false,
            current_page: page,
            next_page: None,
        }
    }
}

/// Where a resolved player URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Index,
    Cache,
    Live,
}

/// Outcome of a player URL resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IframeResolution {
    pub iframe_url: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: ResolutionSource,
}

impl IframeResolution {
    pub fn found(url: String, source: ResolutionSource) -> Self {
        Self {
            iframe_url: Some(url),
            success: true,
            error: None,
            source,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            iframe_url: None,
            success: false,
            error: Some(error),
            source: ResolutionSource::Live,
        }
    }

    /// Explanation shown to the user when no player could be resolved
    pub fn failure_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        Some(format!(
            "Could not load player: {}",
            self.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Entry in the "currently airing" listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiringEpisode {
    #[serde(default)]
    pub anime_name: String,
    #[serde(default)]
    pub episode_number: u32,
    #[serde(default)]
    pub episode_title: String,
    #[serde(default)]
    pub anime_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub episode_url: String,
}

/// Entry in the "popular" listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularAnime {
    pub title: String,
    pub id: String,
    pub url: String,
}
