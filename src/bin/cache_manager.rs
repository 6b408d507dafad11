use anime_resolver::{CacheStore, Config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "cache-manager")]
#[command(about = "Resolver cache maintenance utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cache file to operate on (defaults to the configured one)
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Get cache statistics
    Stats,
    /// Remove episode-list and iframe entries older than N days
    Sweep {
        /// Maximum entry age in days (defaults to the configured retention)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Clear all cache entries
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let cache_file = cli.cache_file.unwrap_or_else(|| config.cache.cache_file.clone());

    let mut cache = CacheStore::open(cache_file, config.cache.listing_ttl_hours).await;

    match cli.command {
        Commands::Stats => {
            let stats = cache.stats();
            info!("📊 Cache Statistics ({}):", stats.cache_file);
            info!("  Anime episode lists: {}", stats.anime_cached);
            info!("  Episode iframes: {}", stats.iframes_cached);
            info!("  Currently airing episodes: {}", stats.currently_airing_episodes_cached);
            info!("  Popular anime: {}", stats.popular_anime_cached);
            info!("  Schema version: {}", stats.schema_version);
            if let Some(updated) = stats.last_updated {
                info!("  Last updated: {}", updated.to_rfc3339());
            }
        }

        Commands::Sweep { days } => {
            let days = days.unwrap_or(config.cache.retention_days);
            let removed = cache.sweep(days).await;
            info!("🗑️ Removed {} entries older than {} days", removed, days);
        }

        Commands::Clear => {
            cache.clear().await;
            info!("🧹 Cleared cache at {}", cache.path().display());
        }
    }

    Ok(())
}
