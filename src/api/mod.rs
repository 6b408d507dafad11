//! JSON route layer over the resolution pipeline

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::pipeline::ResolutionPipeline;

pub mod handlers;
pub mod models;
pub mod server;

/// API server exposing search, episode, player, listing and cache routes
pub struct ApiServer {
    pipeline: ResolutionPipeline,
    config: Arc<Config>,
}

impl ApiServer {
    pub fn new(pipeline: ResolutionPipeline, config: Arc<Config>) -> Self {
        Self { pipeline, config }
    }

    /// Serve until the listener fails
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting API server on port {}", self.config.server.port);
        server::start_http_server(self.pipeline, self.config).await
    }
}
