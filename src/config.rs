use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the disc episode splitter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input data locations
    pub inputs: InputConfig,

    /// Chapter cache settings
    pub cache: CacheConfig,

    /// External MKVToolNix programs
    pub tools: ToolConfig,

    /// Output naming and locations
    pub output: OutputConfig,

    /// Performance and resource settings
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Tab-separated episode guide
    pub episode_guide: PathBuf,

    /// Comma-separated part/disc to episode manifest
    pub disc_manifest: PathBuf,

    /// Directory holding one subtitle file per episode
    pub subtitles_dir: PathBuf,

    /// Directory holding one `<part>-<disc>` sub-directory per ripped disc
    pub rips_dir: PathBuf,

    /// Extensions of ripped media files
    pub media_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Chapter cache file
    pub path: PathBuf,

    /// Re-inspect every disc even if the cache exists
    pub rebuild: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub mkvinfo: String,
    pub mkvmerge: String,
    pub mkvpropedit: String,

    /// Upper bound for one inspection run (seconds)
    pub inspect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Series name used as the episode file name prefix
    pub series_name: String,

    /// Split pieces land in `<temp_dir>/<part>-<disc>/`
    pub temp_dir: PathBuf,

    /// Final episode files
    pub output_dir: PathBuf,

    /// JSON plan with alignments, diagnostics and commands
    pub plan_file: PathBuf,

    /// Shell script with every command, if set
    pub script_file: Option<PathBuf>,

    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent inspections
    pub max_workers: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            episode_guide: PathBuf::from("EpisodeGuide.csv"),
            disc_manifest: PathBuf::from("DVD_and_disk_to_episode_guide.csv"),
            subtitles_dir: PathBuf::from("subtitles"),
            rips_dir: PathBuf::from("rips"),
            media_extensions: vec!["mkv".to_string()],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ChaptersPerDisc.csv"),
            rebuild: false,
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            mkvinfo: "mkvinfo".to_string(),
            mkvmerge: "mkvmerge".to_string(),
            mkvpropedit: "mkvpropedit".to_string(),
            inspect_timeout_seconds: 300,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            series_name: "Detective Conan".to_string(),
            temp_dir: PathBuf::from("./split"),
            output_dir: PathBuf::from("./output"),
            plan_file: PathBuf::from("split-plan.json"),
            script_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().min(8), // Use available cores, max 8
        }
    }
}

impl ToolConfig {
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from the first config file found, falling back to
    /// defaults plus environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = ["disc-splitter.toml", "config/disc-splitter.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config = toml::from_str(&config_str)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(workers) = std::env::var("DISC_SPLITTER_WORKERS") {
            config.performance.max_workers = workers
                .parse()
                .map_err(|_| anyhow!("DISC_SPLITTER_WORKERS must be a number, got '{}'", workers))?;
        }

        if let Ok(rips_dir) = std::env::var("DISC_SPLITTER_RIPS_DIR") {
            config.inputs.rips_dir = PathBuf::from(rips_dir);
        }

        if let Ok(subtitles_dir) = std::env::var("DISC_SPLITTER_SUBTITLES_DIR") {
            config.inputs.subtitles_dir = PathBuf::from(subtitles_dir);
        }

        if let Ok(output_dir) = std::env::var("DISC_SPLITTER_OUTPUT_DIR") {
            config.output.output_dir = PathBuf::from(output_dir);
        }

        if let Ok(cache_path) = std::env::var("DISC_SPLITTER_CACHE") {
            config.cache.path = PathBuf::from(cache_path);
        }

        if let Ok(log_level) = std::env::var("DISC_SPLITTER_LOG_LEVEL") {
            config.output.log_level = log_level;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.performance.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        if self.tools.inspect_timeout_seconds == 0 {
            return Err(anyhow!("inspect_timeout_seconds must be greater than 0"));
        }

        if self.inputs.media_extensions.is_empty() {
            return Err(anyhow!("media_extensions must list at least one extension"));
        }

        if self.output.series_name.trim().is_empty() {
            return Err(anyhow!("series_name must not be empty"));
        }

        for (name, program) in [
            ("mkvinfo", &self.tools.mkvinfo),
            ("mkvmerge", &self.tools.mkvmerge),
            ("mkvpropedit", &self.tools.mkvpropedit),
        ] {
            if program.trim().is_empty() {
                return Err(anyhow!("tools.{} must not be empty", name));
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Disc Splitter Configuration:\n\
            - Episode Guide: {}\n\
            - Disc Manifest: {}\n\
            - Subtitles: {}\n\
            - Rips: {}\n\
            - Chapter Cache: {}{}\n\
            - Output Directory: {}\n\
            - Workers: {}",
            self.inputs.episode_guide.display(),
            self.inputs.disc_manifest.display(),
            self.inputs.subtitles_dir.display(),
            self.inputs.rips_dir.display(),
            self.cache.path.display(),
            if self.cache.rebuild { " (rebuild)" } else { "" },
            self.output.output_dir.display(),
            self.performance.max_workers
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.max_workers = workers;
        self
    }

    pub fn with_episode_guide(mut self, path: PathBuf) -> Self {
        self.config.inputs.episode_guide = path;
        self
    }

    pub fn with_disc_manifest(mut self, path: PathBuf) -> Self {
        self.config.inputs.disc_manifest = path;
        self
    }

    pub fn with_subtitles_dir(mut self, dir: PathBuf) -> Self {
        self.config.inputs.subtitles_dir = dir;
        self
    }

    pub fn with_rips_dir(mut self, dir: PathBuf) -> Self {
        self.config.inputs.rips_dir = dir;
        self
    }

    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.config.cache.path = path;
        self
    }

    pub fn rebuild_cache(mut self, rebuild: bool) -> Self {
        self.config.cache.rebuild = rebuild;
        self
    }

    pub fn with_series_name(mut self, name: impl Into<String>) -> Self {
        self.config.output.series_name = name.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.temp_dir = dir;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.output_dir = dir;
        self
    }

    pub fn with_plan_file(mut self, path: PathBuf) -> Self {
        self.config.output.plan_file = path;
        self
    }

    pub fn with_script_file(mut self, path: PathBuf) -> Self {
        self.config.output.script_file = Some(path);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inputs.episode_guide, PathBuf::from("EpisodeGuide.csv"));
        assert_eq!(config.cache.path, PathBuf::from("ChaptersPerDisc.csv"));
        assert_eq!(config.inputs.media_extensions, vec!["mkv".to_string()]);
        assert_eq!(config.tools.inspect_timeout(), Duration::from_secs(300));
        assert!(config.performance.max_workers >= 1 && config.performance.max_workers <= 8);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_workers(2)
            .with_series_name("Case Closed")
            .rebuild_cache(true)
            .build();

        assert_eq!(config.performance.max_workers, 2);
        assert_eq!(config.output.series_name, "Case Closed");
        assert!(config.cache.rebuild);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
        assert!(ConfigBuilder::new().with_workers(0).build().validate().is_err());
        assert!(ConfigBuilder::new().with_series_name(" ").build().validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("disc-splitter.toml");
        std::fs::write(
            &path,
            "[inputs]\nrips_dir = \"/mnt/rips\"\n\n[tools]\ninspect_timeout_seconds = 30\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.inputs.rips_dir, PathBuf::from("/mnt/rips"));
        assert_eq!(config.inputs.episode_guide, PathBuf::from("EpisodeGuide.csv"));
        assert_eq!(config.tools.inspect_timeout_seconds, 30);
        assert_eq!(config.tools.mkvmerge, "mkvmerge");
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("saved.toml");
        let config = ConfigBuilder::new()
            .with_workers(3)
            .with_script_file(PathBuf::from("split.sh"))
            .build();

        config.save(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.performance.max_workers, 3);
        assert_eq!(reloaded.output.script_file, Some(PathBuf::from("split.sh")));
    }
}
