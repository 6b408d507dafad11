use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Placeholder used when nothing meaningful is left of a scraped title
pub const PLACEHOLDER_TITLE: &str = "Episode";

/// Noise stripped from scraped episode titles, applied in order
const TITLE_NOISE: &[&str] = &[
    r"^Episode\s+\d+\s*[-:]?\s*",
    r"^EP\s*\d+\s*[-:]?\s*",
    r"^E\d+\s*[-:]?\s*",
    r"Watch\s+Online.*$",
    r"\bBD\b",
    r"\d{2}:\d{2}:\d{2}",
    r"\b\d+k\b",
    r"\[.*?\]",
    r"\(.*?\)",
];

fn noise_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TITLE_NOISE
            .iter()
            .filter_map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build().ok())
            .collect()
    })
}

fn separator_runs() -> Option<&'static Regex> {
    static SEPARATORS: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&SEPARATORS, r"[-\s]+")
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// "Name - Episode N" first, then "Name EP N"
fn name_and_number_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(.+?)\s*-\s*[Ee]pisode\s*(\d+)", r"(.+?)\s*[Ee][Pp]?\s*(\d+)"]
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn watch_online() -> Option<&'static Regex> {
    static WATCH_ONLINE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&WATCH_ONLINE, r"[Ww]atch\s+(.+?)\s*[Oo]nline")
}

fn episode_marker() -> Option<&'static Regex> {
    static EPISODE_MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&EPISODE_MARKER, r"[Ee]pisode\s*(\d+)")
}

fn standalone_number() -> Option<&'static Regex> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&NUMBER, r"\b(\d+)\b")
}

/// Strip episode markers, quality tags and annotations from a scraped title
pub fn clean_episode_title(raw: &str) -> String {
    let mut title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return PLACEHOLDER_TITLE.to_string();
    }

    for pattern in noise_patterns() {
        title = pattern.replace_all(&title, "").into_owned();
    }

    let title = match separator_runs() {
        Some(separators) => separators.replace_all(&title, " ").trim().to_string(),
        None => title.trim().to_string(),
    };

    let numeric = title.chars().all(|c| c.is_ascii_digit());
    if title.is_empty() || numeric || title.chars().count() < 2 {
        return PLACEHOLDER_TITLE.to_string();
    }
    title
}

/// Anime name and episode number parsed from listing link text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub anime_name: String,
    pub episode_number: u32,
}

/// Parse "Name - Episode 12" style link text.
///
/// Unmatched text becomes the name with episode 1; empty text yields
/// `("Unknown", 0)`.
pub fn parse_episode_info(text: &str) -> EpisodeInfo {
    let clean = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        return EpisodeInfo {
            anime_name: "Unknown".to_string(),
            episode_number: 0,
        };
    }

    let parse_number = |raw: &str| raw.parse::<u32>().unwrap_or(1);

    for regex in name_and_number_patterns() {
        if let Some(captures) = regex.captures(&clean) {
            return EpisodeInfo {
                anime_name: captures[1].trim().to_string(),
                episode_number: parse_number(&captures[2]),
            };
        }
    }

    let mut info = EpisodeInfo {
        anime_name: clean.clone(),
        episode_number: 1,
    };

    if let Some(captures) = watch_online().and_then(|regex| regex.captures(&clean)) {
        info.anime_name = captures[1].trim().to_string();
    }
    if let Some(captures) = episode_marker().and_then(|regex| regex.captures(&clean)) {
        info.episode_number = parse_number(&captures[1]);
    }

    info
}

/// First standalone number in `text`, 0 when there is none
pub fn first_number(text: &str) -> i64 {
    standalone_number()
        .and_then(|regex| regex.captures(text))
        .and_then(|captures| captures[1].parse().ok())
        .unwrap_or(0)
}
