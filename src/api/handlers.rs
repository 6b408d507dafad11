//! API request handlers

use serde_json::Value;

use crate::error::Result;
use crate::pipeline::ResolutionPipeline;

/// Handle health check requests
pub async fn health_check() -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "anime-resolver",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Handle title search requests
pub async fn search(pipeline: &ResolutionPipeline, query: &str) -> Result<Value> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(serde_json::json!({ "query": query, "results": [], "total": 0 }));
    }

    let results = pipeline.search(query).await?;
    Ok(serde_json::json!({
        "query": query,
        "total": results.len(),
        "results": results,
        "base_url": pipeline.base_url(),
    }))
}

/// Handle index-first episode list requests
pub async fn anime_episodes(pipeline: &ResolutionPipeline, anime_id: &str, page: u32) -> Result<Value> {
    let episodes = pipeline.resolve_episodes(anime_id, page).await?;
    Ok(serde_json::json!({
        "anime_id": anime_id,
        "is_live_page": false,
        "episodes": episodes,
    }))
}

/// Handle forced live episode list requests
pub async fn live_episodes(pipeline: &ResolutionPipeline, anime_id: &str, page: u32) -> Result<Value> {
    let episodes = pipeline.resolve_live_episodes(anime_id, page).await?;
    Ok(serde_json::json!({
        "anime_id": anime_id,
        "is_live_page": true,
        "episodes": episodes,
    }))
}

/// Handle watch requests: player URL plus the following episode
pub async fn watch(pipeline: &ResolutionPipeline, anime_id: &str, session: &str) -> Result<Value> {
    let resolution = pipeline.resolve_iframe(anime_id, session).await?;
    let next = pipeline.next_episode(anime_id, session).await;

    Ok(serde_json::json!({
        "anime_id": anime_id,
        "session": session,
        "episode_url": format!("{}/play/{}/{}", pipeline.base_url(), anime_id, session),
        "message": resolution.failure_message(),
        "resolution": resolution,
        "next_episode": next.map(|episode| serde_json::json!({
            "session": episode.episode_id,
            "number": episode.number,
        })),
    }))
}

pub async fn currently_airing(pipeline: &ResolutionPipeline) -> Result<Value> {
    let episodes = pipeline.currently_airing().await?;
    Ok(serde_json::json!({ "total": episodes.len(), "episodes": episodes }))
}

pub async fn popular(pipeline: &ResolutionPipeline) -> Result<Value> {
    let anime = pipeline.popular_anime().await?;
    Ok(serde_json::json!({ "total": anime.len(), "anime": anime }))
}

pub async fn cache_stats(pipeline: &ResolutionPipeline) -> Result<Value> {
    Ok(serde_json::to_value(pipeline.cache_stats().await)?)
}

pub async fn clear_cache(pipeline: &ResolutionPipeline) -> Value {
    pipeline.clear_cache().await;
    serde_json::json!({ "message": "Cache cleared successfully" })
}

pub async fn status(pipeline: &ResolutionPipeline) -> Result<Value> {
    Ok(serde_json::to_value(pipeline.status().await)?)
}
