use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use anime_resolver::api::ApiServer;
use anime_resolver::{
    CacheStore, Config, HtmlBrowser, IndexStore, ReqwestFetcher, ResolutionPipeline, SiteScraper, WorkerHandle,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Anime Resolver")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Tiered title, episode and player resolution for a video catalog site")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on"),
        )
        .arg(
            Arg::new("save-config")
                .long("save-config")
                .value_name("FILE")
                .help("Write the effective configuration to FILE and exit"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let filter = if matches.get_flag("verbose") {
        "anime_resolver=debug,info"
    } else {
        "anime_resolver=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(port) = matches.get_one::<String>("port") {
        config.server.port = port.parse()?;
    }
    config.validate()?;
    if let Some(path) = matches.get_one::<String>("save-config") {
        config.save(&PathBuf::from(path))?;
        return Ok(());
    }
    info!("{}", config.summary());
    let config = Arc::new(config);

    info!("🚀 Anime Resolver starting...");
    let index = Arc::new(IndexStore::load(&config.index).await);
    info!("📚 Pre-loaded {} anime titles", index.len());

    let mut cache = CacheStore::open(config.cache.cache_file.clone(), config.cache.listing_ttl_hours).await;
    if let Some(days) = config.cache.startup_sweep_days {
        let removed = cache.sweep(days).await;
        info!("🧹 Startup sweep removed {} entries", removed);
    }

    let runtime = Arc::new(HtmlBrowser::new(ReqwestFetcher::new()?));
    let worker = WorkerHandle::spawn(runtime, SiteScraper::new(config.clone()), &config.worker);
    if worker
        .wait_until_ready(Duration::from_secs(config.worker.startup_wait_seconds))
        .await
    {
        info!("✅ Backend is ready!");
    } else {
        error!("❌ Backend setup timeout, serving without live scraping");
    }

    let pipeline = ResolutionPipeline::new(index, cache, worker, config.clone());
    let preload = pipeline.clone();
    tokio::spawn(async move { preload.preload_listings().await });

    ApiServer::new(pipeline, config).start().await
}
