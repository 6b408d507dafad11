/// Prioritised fuzzy title search over the catalog
use super::matcher::similarity_ratio;
use super::IndexStore;
use crate::models::AnimeRecord;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// How a title matched the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    StartsWith,
    Contains,
    Similar,
}

/// A catalog record together with its ranking
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch<'a> {
    #[serde(flatten)]
    pub record: &'a AnimeRecord,
    pub priority: f64,
    pub match_type: MatchType,
}

/// Lowercase, strip diacritics to their ASCII base and trim
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Score one title against an already-normalized query
fn score_title(query: &str, normalized_query: &str, title: &str) -> (f64, MatchType, bool) {
    let normalized_title = normalize_text(title);

    let exact = normalized_query == normalized_title;
    let starts_with = normalized_title.starts_with(normalized_query);
    let contains = normalized_title.contains(normalized_query);

    // Similarity runs on the raw casefolded strings, not the normalized ones
    let similarity = similarity_ratio(&query.to_lowercase(), &title.to_lowercase());

    let (priority, match_type) = if exact {
        (100.0, MatchType::Exact)
    } else if starts_with {
        (80.0 + similarity * 10.0, MatchType::StartsWith)
    } else if contains {
        (60.0 + similarity * 10.0, MatchType::Contains)
    } else {
        (similarity * 50.0, MatchType::Similar)
    };

    let keep = priority > 20.0 || contains || starts_with;
    (priority, match_type, keep)
}

/// Rank catalog records against `query`, best first, at most `limit` results
pub fn search<'a>(catalog: &'a [AnimeRecord], query: &str, limit: usize) -> Vec<SearchMatch<'a>> {
    if query.is_empty() || catalog.is_empty() {
        return Vec::new();
    }

    let normalized_query = normalize_text(query);
    let mut results: Vec<SearchMatch<'a>> = catalog
        .iter()
        .filter_map(|record| {
            let (priority, match_type, keep) = score_title(query, &normalized_query, &record.title);
            keep.then_some(SearchMatch {
                record,
                priority,
                match_type,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.title.cmp(&b.record.title))
    });
    results.truncate(limit);

    debug!("Search '{}' matched {} titles", query, results.len());
    results
}

impl IndexStore {
    /// Search the loaded catalog
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchMatch<'_>> {
        search(self.records(), query, limit)
    }
}
