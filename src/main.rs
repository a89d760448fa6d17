use anyhow::Result;
use clap::{Arg, Command};
use disc_episode_splitter::{Config, MkvInfoRunner, SplitPlanner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Disc Episode Splitter")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Split multi-episode disc rips into per-episode files")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: disc-splitter.toml)")
        )
        .arg(
            Arg::new("rips-dir")
                .short('d')
                .long("rips-dir")
                .value_name("DIR")
                .help("Directory containing one <part>-<disc> folder per ripped disc")
        )
        .arg(
            Arg::new("rebuild-cache")
                .long("rebuild-cache")
                .help("Inspect every disc again even if the chapter cache exists")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("execute")
                .long("execute")
                .help("Run the split and remux commands instead of only planning them")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Number of parallel inspections")
                .value_parser(clap::value_parser!(usize))
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    let (mut config, config_error) = match matches.get_one::<String>("config") {
        Some(path) => (Config::load_from(&PathBuf::from(path))?, None),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    let verbose = matches.get_flag("verbose");
    init_logging(&config.output.log_level, verbose);

    if let Some(e) = config_error {
        warn!("Failed to load config, using defaults: {}", e);
    }

    if let Some(rips_dir) = matches.get_one::<String>("rips-dir") {
        config.inputs.rips_dir = PathBuf::from(rips_dir);
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.performance.max_workers = *workers;
    }
    if matches.get_flag("rebuild-cache") {
        config.cache.rebuild = true;
    }
    let execute = matches.get_flag("execute");

    config.validate()?;
    debug!("{}", config.summary());

    info!("🚀 Disc Episode Splitter starting...");
    info!("📁 Rips directory: {}", config.inputs.rips_dir.display());
    info!("📂 Output directory: {}", config.output.output_dir.display());

    let inspector = MkvInfoRunner::new(config.tools.mkvinfo.clone(), config.tools.inspect_timeout());
    let planner = SplitPlanner::new(config, Arc::new(inspector));

    let start_time = std::time::Instant::now();
    let results = planner.run(execute).await?;
    let duration = start_time.elapsed();

    info!("🎉 Planning completed in {:.2}s", duration.as_secs_f64());
    info!("✅ Successful: {}", results.successful);
    info!("❌ Failed: {}", results.failed);
    info!("⏭️ Skipped: {}", results.skipped);
    for disc in &results.discs {
        for diagnostic in &disc.diagnostics {
            warn!("⚠️ Disc {}-{}: {:?}", disc.part, disc.disc, diagnostic);
        }
    }

    if results.failed > 0 {
        anyhow::bail!("{} of {} discs failed", results.failed, results.total);
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level; `--verbose` wins over both
fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("disc_episode_splitter=debug,disc_splitter=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("disc_episode_splitter={0},disc_splitter={0},warn", level))
        })
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
