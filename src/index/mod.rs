/// Read-only catalog index loaded from pre-built JSON documents
///
/// The index is the fast first data source: title search, per-title episode
/// lists and pre-recorded player URLs. It is loaded once and never mutated.

pub mod matcher;
pub mod search;

pub use search::{MatchType, SearchMatch};

use crate::config::IndexConfig;
use crate::models::{sort_by_episode_number, AnimeRecord, EpisodeRecord};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Shape of every catalog document. Records are decoded one at a time so a
/// malformed entry only costs that entry.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    anime: Option<Vec<serde_json::Value>>,
}

/// In-memory catalog with an id lookup table built at load time
#[derive(Debug, Default)]
pub struct IndexStore {
    records: Vec<AnimeRecord>,
    by_id: HashMap<String, usize>,
}

impl IndexStore {
    /// Build an index from records already in memory
    pub fn from_records(records: Vec<AnimeRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            // First record wins for duplicated ids, matching a front-to-back scan
            by_id.entry(record.id.clone()).or_insert(position);
        }
        Self { records, by_id }
    }

    /// Load the catalog from the configured directory.
    ///
    /// A master document takes precedence; otherwise every per-file document
    /// is loaded. Unreadable documents are logged and skipped, so this never
    /// fails: a broken index yields an empty catalog.
    pub async fn load(config: &IndexConfig) -> Self {
        match Self::load_records(config).await {
            Ok(records) => Self::from_records(records),
            Err(e) => {
                error!("❌ Error loading anime index: {}", e);
                Self::default()
            }
        }
    }

    async fn load_records(config: &IndexConfig) -> Result<Vec<AnimeRecord>> {
        let master_path = config.index_dir.join(&config.master_file);
        if master_path.exists() {
            match read_catalog_document(&master_path).await {
                Ok(Some(records)) => {
                    info!("📚 Loaded {} anime from master index", records.len());
                    return Ok(records);
                }
                Ok(None) => warn!("⚠️ Master index has no anime list, loading individual files"),
                Err(e) => warn!("⚠️ Failed to read master index {}: {}", master_path.display(), e),
            }
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&config.index_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&config.file_prefix) && path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut records = Vec::new();
        for path in &files {
            match read_catalog_document(path).await {
                Ok(Some(anime)) => {
                    debug!("📖 Loaded {} anime from {}", anime.len(), path.display());
                    records.extend(anime);
                }
                Ok(None) => debug!("Skipping {} without anime list", path.display()),
                Err(e) => error!("❌ Error loading {}: {}", path.display(), e),
            }
        }

        info!("📚 Total {} anime loaded from {} files", records.len(), files.len());
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AnimeRecord] {
        &self.records
    }

    pub fn find_by_id(&self, anime_id: &str) -> Option<&AnimeRecord> {
        self.by_id.get(anime_id).map(|&position| &self.records[position])
    }

    pub fn find_episode(&self, anime_id: &str, session: &str) -> Option<&EpisodeRecord> {
        self.find_by_id(anime_id)?
            .episodes
            .iter()
            .find(|episode| episode.episode_id == session)
    }

    /// Episode following `current_session` in episode-number order
    pub fn find_next_episode(&self, anime_id: &str, current_session: &str) -> Option<&EpisodeRecord> {
        let anime = self.find_by_id(anime_id)?;
        let mut episodes: Vec<&EpisodeRecord> = anime.episodes.iter().collect();
        if !sort_by_episode_number(&mut episodes, |episode| episode.number.as_ref()) {
            debug!("Episode numbers for {} are not numeric, keeping index order", anime_id);
        }

        let position = episodes.iter().position(|episode| episode.episode_id == current_session)?;
        episodes.get(position + 1).copied()
    }
}

async fn read_catalog_document(path: &Path) -> Result<Option<Vec<AnimeRecord>>> {
    let content = tokio::fs::read_to_string(path).await?;
    let document: CatalogDocument = serde_json::from_str(&content)?;
    let Some(entries) = document.anime else {
        return Ok(None);
    };

    let mut records = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<AnimeRecord>(entry) {
            Ok(record) if !record.id.is_empty() => records.push(record),
            Ok(_) => warn!("⚠️ Skipping record {} in {}: empty id", position, path.display()),
            Err(e) => warn!("⚠️ Skipping record {} in {}: {}", position, path.display(), e),
        }
    }
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EpisodeNumber;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn episode(number: EpisodeNumber, session: &str) -> EpisodeRecord {
        EpisodeRecord {
            number: Some(number),
            title: format!("Episode {}", session),
            url: String::new(),
            episode_id: session.to_string(),
            iframe_url: None,
        }
    }

    fn record(id: &str, title: &str, episodes: Vec<EpisodeRecord>) -> AnimeRecord {
        AnimeRecord {
            id: id.to_string(),
            title: title.to_string(),
            episodes,
        }
    }

    fn index_config(dir: PathBuf) -> IndexConfig {
        IndexConfig {
            index_dir: dir,
            master_file: "master_index.json".to_string(),
            file_prefix: "anime_".to_string(),
        }
    }

    #[test]
    fn test_find_by_id_and_episode() {
        let index = IndexStore::from_records(vec![
            record("a1", "Naruto", vec![episode(1.into(), "s1")]),
            record("a2", "Bleach", vec![]),
        ]);

        assert_eq!(index.find_by_id("a2").unwrap().title, "Bleach");
        assert!(index.find_by_id("missing").is_none());
        assert_eq!(index.find_episode("a1", "s1").unwrap().episode_id, "s1");
        assert!(index.find_episode("a1", "nope").is_none());
    }

    #[test]
    fn test_next_episode_uses_numeric_order() {
        let index = IndexStore::from_records(vec![record(
            "a1",
            "Naruto",
            vec![
                episode(10.into(), "s10"),
                episode(2.into(), "s2"),
                episode(1.into(), "s1"),
            ],
        )]);

        assert_eq!(index.find_next_episode("a1", "s1").unwrap().episode_id, "s2");
        assert_eq!(index.find_next_episode("a1", "s2").unwrap().episode_id, "s10");
        assert!(index.find_next_episode("a1", "s10").is_none());
        assert!(index.find_next_episode("a1", "unknown").is_none());

        // Records stay in load order
        assert_eq!(index.find_by_id("a1").unwrap().episodes[0].episode_id, "s10");
    }

    #[test]
    fn test_next_episode_tolerates_non_numeric_numbers() {
        let index = IndexStore::from_records(vec![record(
            "a1",
            "Naruto",
            vec![
                episode(3.into(), "s3"),
                episode(EpisodeNumber::Text("OVA".to_string()), "ova"),
                episode(1.into(), "s1"),
            ],
        )]);

        assert_eq!(index.find_next_episode("a1", "s3").unwrap().episode_id, "ova");
    }

    #[tokio::test]
    async fn test_master_index_takes_precedence() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(
            temp_dir.path().join("master_index.json"),
            r#"{"anime": [{"id": "m1", "title": "Master"}]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            temp_dir.path().join("anime_a.json"),
            r#"{"anime": [{"id": "f1", "title": "File"}]}"#,
        )
        .await
        .unwrap();

        let index = IndexStore::load(&index_config(temp_dir.path().to_path_buf())).await;
        assert_eq!(index.len(), 1);
        assert!(index.find_by_id("m1").is_some());
    }

    #[tokio::test]
    async fn test_loads_individual_files_and_skips_broken_ones() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(
            temp_dir.path().join("anime_a.json"),
            r#"{"anime": [{"id": "a1", "title": "One", "episodes": [{"number": 1, "episode_id": "s1"}]}]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            temp_dir.path().join("anime_b.json"),
            r#"{"anime": [{"id": "b1", "title": "Two"}]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(temp_dir.path().join("anime_c.json"), "{not json").await.unwrap();
        tokio::fs::write(temp_dir.path().join("notes.json"), r#"{"anime": [{"id": "x"}]}"#).await.unwrap();

        let index = IndexStore::load(&index_config(temp_dir.path().to_path_buf())).await;
        assert_eq!(index.len(), 2);
        assert_eq!(index.find_episode("a1", "s1").unwrap().number, Some(EpisodeNumber::Int(1)));
        assert!(index.find_by_id("x").is_none());
    }

    #[tokio::test]
    async fn test_bad_records_do_not_drop_their_file() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(
            temp_dir.path().join("anime_1.json"),
            r#"{"anime": [
                {"id": "a1", "title": "Naruto", "episodes": [{"number": 1, "episode_id": "s1"}]},
                {"title": "Broken entry"},
                {"id": "", "title": "Blank id"},
                {"id": "a2", "title": "Bleach"}
            ]}"#,
        )
        .await
        .unwrap();

        let index = IndexStore::load(&index_config(temp_dir.path().to_path_buf())).await;
        assert_eq!(index.len(), 2);
        assert_eq!(index.find_by_id("a1").unwrap().title, "Naruto");
        assert_eq!(index.find_by_id("a2").unwrap().title, "Bleach");
        assert!(index.records().iter().all(|record| !record.title.starts_with("Broken")));
    }

    #[tokio::test]
    async fn test_missing_directory_yields_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = IndexStore::load(&index_config(temp_dir.path().join("absent"))).await;
        assert!(index.is_empty());
    }
}
