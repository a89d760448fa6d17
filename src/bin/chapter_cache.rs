use anyhow::Result;
use clap::{Parser, Subcommand};
use disc_episode_splitter::chapters::{mkvinfo, ChapterCacheManager, DiscKey};
use disc_episode_splitter::{Config, InspectionTool, MkvInfoRunner};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chapter-cache")]
#[command(about = "Chapter cache management utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Chapter cache file (default: from configuration)
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all cached discs
    List,
    /// Get cache statistics
    Stats,
    /// Show the chapters cached for one disc
    Show {
        part: u32,
        disc: u32,
    },
    /// Drop one disc so it is inspected again on the next run
    Invalidate {
        part: u32,
        disc: u32,
    },
    /// Remove the cache file
    Clear,
    /// Inspect a media file and print its tracks and chapters without caching
    Inspect {
        /// Media file path
        media_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    let cache_file = cli.cache_file.unwrap_or_else(|| config.cache.path.clone());
    let cache_manager = ChapterCacheManager::new(cache_file);

    match cli.command {
        Commands::List => {
            let discs = cache_manager.list().await?;

            if discs.is_empty() {
                info!("📭 No cached discs found in {}", cache_manager.path().display());
                return Ok(());
            }

            info!("📚 Found {} cached discs:", discs.len());
            for disc in discs {
                info!(
                    "  {} - {} chapters, {} - {}",
                    disc.key,
                    disc.chapter_count,
                    format_duration(disc.duration),
                    disc.source_file
                );
            }
        }

        Commands::Stats => {
            let stats = cache_manager.stats().await?;
            info!("📊 Cache Statistics ({}):", cache_manager.path().display());
            info!("  Parts: {}", stats.total_parts);
            info!("  Discs: {}", stats.total_discs);
            info!("  Chapters: {}", stats.total_chapters);
            info!("  Total duration: {}", format_duration(stats.total_duration));
        }

        Commands::Show { part, disc } => {
            let key = DiscKey::new(part, disc);
            match cache_manager.get(key).await? {
                Some(info) => {
                    info!("💿 Disc {} - {}", key, info.source_file());
                    for chapter in info.chapters() {
                        info!(
                            "  {:>3}. {} → {}  {}",
                            chapter.number,
                            format_duration(chapter.start),
                            format_duration(chapter.end),
                            chapter.title
                        );
                    }
                }
                None => warn!("⚠️ Disc {} is not cached", key),
            }
        }

        Commands::Invalidate { part, disc } => {
            let key = DiscKey::new(part, disc);
            if cache_manager.invalidate(key).await? {
                info!("✅ Successfully invalidated cache for disc {}", key);
            } else {
                warn!("⚠️ Disc {} is not cached", key);
            }
        }

        Commands::Clear => {
            if cache_manager.clear().await? {
                info!("🧹 Cleared chapter cache");
            } else {
                info!("📭 Nothing to clear");
            }
        }

        Commands::Inspect { media_file } => {
            let runner = MkvInfoRunner::new(config.tools.mkvinfo.clone(), config.tools.inspect_timeout());
            let output = runner.inspect(&media_file).await?;
            let report = mkvinfo::parse(&media_file.to_string_lossy(), &output)?;

            info!("🎞️ {} - {} tracks", media_file.display(), report.tracks.len());
            for track in &report.tracks {
                info!("  {} #{}: {} [{}]", track.kind, track.number, track.codec, track.language);
            }
            info!("📑 {} chapters:", report.chapters.len());
            for chapter in report.chapters.chapters() {
                info!(
                    "  {:>3}. {} → {}  {}",
                    chapter.number,
                    format_duration(chapter.start),
                    format_duration(chapter.end),
                    chapter.title
                );
            }
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
