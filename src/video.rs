use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chapters::DiscKey;

/// `<part>-<disc>` at the start of a rip directory name, e.g. `3-2-DragonMax`
static DISC_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-(\d+)").unwrap());

/// Failures of external tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {seconds}s for {target}")]
    Timeout {
        program: String,
        target: String,
        seconds: u64,
    },

    #[error("{program} exited with {status} for {target}: {stderr}")]
    Failed {
        program: String,
        target: String,
        status: String,
        stderr: String,
    },
}

/// Produces the textual inspection report of a media container
#[async_trait]
pub trait InspectionTool: Send + Sync {
    async fn inspect(&self, media_file: &Path) -> Result<String, ToolError>;
}

/// Runs `mkvinfo <file>` and captures its output
#[derive(Debug, Clone)]
pub struct MkvInfoRunner {
    program: String,
    timeout: Duration,
}

impl MkvInfoRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl InspectionTool for MkvInfoRunner {
    async fn inspect(&self, media_file: &Path) -> Result<String, ToolError> {
        let start_time = Instant::now();
        debug!("Running {} {}", self.program, media_file.display());

        let child = tokio::process::Command::new(&self.program)
            .arg(media_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: self.program.clone(),
                    target: media_file.display().to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                target: media_file.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            "{} finished for {} in {:.1}s",
            self.program,
            media_file.display(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// The media file chosen to represent one ripped disc
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscSource {
    pub key: DiscKey,
    pub media_file: PathBuf,
    pub file_size: u64,
}

/// Parse a rip directory name into its disc key
pub fn parse_disc_dir_name(name: &str) -> Option<DiscKey> {
    let caps = DISC_DIR.captures(name)?;
    let part = caps[1].parse().ok()?;
    let disc = caps[2].parse().ok()?;
    Some(DiscKey::new(part, disc))
}

/// Find every disc directory directly under `rips_dir` and its largest media file
pub async fn discover_discs(rips_dir: &Path, extensions: &[String]) -> std::io::Result<Vec<DiscSource>> {
    let mut sources = Vec::new();
    let mut entries = tokio::fs::read_dir(rips_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(key) = parse_disc_dir_name(&name) else {
            warn!("⚠️ Skipping {}: not a <part>-<disc> directory", path.display());
            continue;
        };

        match largest_media_file(&path, extensions).await? {
            Some((media_file, file_size)) => {
                debug!("Disc {} uses {} ({} bytes)", key, media_file.display(), file_size);
                sources.push(DiscSource {
                    key,
                    media_file,
                    file_size,
                });
            }
            None => warn!("⚠️ No media file in {}, skipping disc {}", path.display(), key),
        }
    }

    sources.sort_by_key(|source| source.key);
    info!("🔍 Found {} ripped discs in {}", sources.len(), rips_dir.display());
    Ok(sources)
}

async fn largest_media_file(dir: &Path, extensions: &[String]) -> std::io::Result<Option<(PathBuf, u64)>> {
    let mut largest: Option<(PathBuf, u64)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_media = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !is_media {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let size = metadata.len();
        if largest.as_ref().map_or(true, |(_, best)| size > *best) {
            largest = Some((path, size));
        }
    }

    Ok(largest)
}
