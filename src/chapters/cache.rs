/// Flat-file cache of parsed chapter timelines, one line per chapter
///
/// ```text
/// #chapter-cache unit=ms
/// part:disc:start:end:chapterNumber:sourceFile:chapterTitle
/// ```
///
/// Lines are split at most six times so that colons inside the title
/// survive. The source file column is percent-encoded, so drive letters and
/// other colons in paths survive too. Files written before the header
/// existed store 100ns ticks with raw paths and are still readable.
use super::{Chapter, DiscChapterInfo, DiscKey, TimelineError};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const HEADER_TAG: &str = "#chapter-cache";
const FIELD_COUNT: usize = 7;
const NANOS_PER_TICK: u64 = 100;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Chapter timelines keyed by disc, in part/disc order
pub type CachedDiscs = BTreeMap<DiscKey, DiscChapterInfo>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot access chapter cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("disc {key} lists chapters from both {first} and {second}")]
    MixedSources {
        key: DiscKey,
        first: String,
        second: String,
    },

    #[error("disc {key}: {reason}")]
    Unencodable { key: DiscKey, reason: String },

    #[error("disc {key}: {source}")]
    Timeline {
        key: DiscKey,
        #[source]
        source: TimelineError,
    },
}

/// Unit of the start/end columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUnit {
    Milliseconds,
    /// 100ns ticks, the unit of header-less legacy files
    Ticks,
}

impl CacheUnit {
    fn name(self) -> &'static str {
        match self {
            CacheUnit::Milliseconds => "ms",
            CacheUnit::Ticks => "ticks",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ms" => Some(CacheUnit::Milliseconds),
            "ticks" => Some(CacheUnit::Ticks),
            _ => None,
        }
    }

    fn encode(self, duration: Duration) -> u128 {
        match self {
            CacheUnit::Milliseconds => duration.as_millis(),
            CacheUnit::Ticks => duration.as_nanos() / NANOS_PER_TICK as u128,
        }
    }

    fn decode(self, value: u64) -> Duration {
        match self {
            CacheUnit::Milliseconds => Duration::from_millis(value),
            CacheUnit::Ticks => Duration::from_nanos(value.saturating_mul(NANOS_PER_TICK)),
        }
    }
}

/// Render the cache file content, always in milliseconds
pub fn serialize(discs: &CachedDiscs) -> Result<String> {
    let unit = CacheUnit::Milliseconds;
    let mut out = format!("{} unit={}\n", HEADER_TAG, unit.name());

    for (key, info) in discs {
        let source_file = urlencoding::encode(info.source_file());
        for chapter in info.chapters() {
            if chapter.title.contains(['\n', '\r']) {
                return Err(CacheError::Unencodable {
                    key: *key,
                    reason: format!("chapter {} title contains a line break", chapter.number),
                });
            }
            let _ = writeln!(
                out,
                "{}:{}:{}:{}:{}:{}:{}",
                key.part,
                key.disc,
                unit.encode(chapter.start),
                unit.encode(chapter.end),
                chapter.number,
                source_file,
                chapter.title
            );
        }
    }

    Ok(out)
}

/// Parse cache file content back into per-disc timelines
pub fn deserialize(content: &str) -> Result<CachedDiscs> {
    let mut unit = CacheUnit::Ticks;
    let mut encoded_paths = false;
    let mut grouped: BTreeMap<DiscKey, (String, Vec<Chapter>)> = BTreeMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end_matches('\r');

        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix(HEADER_TAG) {
            unit = parse_header(header, line_no)?;
            encoded_paths = true;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.splitn(FIELD_COUNT, ':').collect();
        if fields.len() != FIELD_COUNT {
            return Err(CacheError::Malformed {
                line: line_no,
                reason: format!("expected {} fields, found {}", FIELD_COUNT, fields.len()),
            });
        }

        let key = DiscKey::new(number(fields[0], "part", line_no)?, number(fields[1], "disc", line_no)?);
        let start = unit.decode(number(fields[2], "start", line_no)?);
        let end = unit.decode(number(fields[3], "end", line_no)?);
        let chapter_number = number(fields[4], "chapter number", line_no)?;
        let source_file = if encoded_paths {
            urlencoding::decode(fields[5]).map_err(|_| CacheError::Malformed {
                line: line_no,
                reason: format!("invalid source file encoding '{}'", fields[5]),
            })?
        } else {
            fields[5].into()
        };
        let title = fields[6];

        let (known_source, chapters) = grouped
            .entry(key)
            .or_insert_with(|| (source_file.to_string(), Vec::new()));
        if *known_source != source_file {
            return Err(CacheError::MixedSources {
                key,
                first: known_source.clone(),
                second: source_file.to_string(),
            });
        }
        chapters.push(Chapter::new(chapter_number, title, start, end));
    }

    grouped
        .into_iter()
        .map(|(key, (source_file, chapters))| {
            DiscChapterInfo::new(source_file, chapters)
                .map(|info| (key, info))
                .map_err(|source| CacheError::Timeline { key, source })
        })
        .collect()
}

fn parse_header(header: &str, line_no: usize) -> Result<CacheUnit> {
    let unit_name = header
        .split_whitespace()
        .find_map(|token| token.strip_prefix("unit="))
        .unwrap_or("ticks");

    CacheUnit::from_name(unit_name).ok_or_else(|| CacheError::Malformed {
        line: line_no,
        reason: format!("unknown time unit '{}'", unit_name),
    })
}

fn number<T: std::str::FromStr>(value: &str, field: &str, line_no: usize) -> Result<T> {
    value.trim().parse().map_err(|_| CacheError::Malformed {
        line: line_no,
        reason: format!("invalid {} '{}'", field, value),
    })
}

/// Manages the chapter cache file
#[derive(Debug, Clone)]
pub struct ChapterCacheManager {
    /// Cache file path
    cache_path: PathBuf,
}

impl ChapterCacheManager {
    /// Create a new cache manager
    pub fn new(cache_path: PathBuf) -> Self {
        Self { cache_path }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    pub fn exists(&self) -> bool {
        self.cache_path.exists()
    }

    /// Load every cached disc
    pub async fn load(&self) -> Result<CachedDiscs> {
        let content = tokio::fs::read_to_string(&self.cache_path)
            .await
            .map_err(|source| self.io_error(source))?;

        let discs = deserialize(&content)?;
        info!("📚 Loaded chapters for {} discs from {}", discs.len(), self.cache_path.display());
        Ok(discs)
    }

    /// Replace the cache file with `discs`, written in a single call
    pub async fn save(&self, discs: &CachedDiscs) -> Result<()> {
        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        tokio::fs::write(&self.cache_path, serialize(discs)?)
            .await
            .map_err(|source| self.io_error(source))?;

        let chapter_count: usize = discs.values().map(DiscChapterInfo::len).sum();
        info!(
            "💾 Saved {} chapters for {} discs to {}",
            chapter_count,
            discs.len(),
            self.cache_path.display()
        );
        Ok(())
    }

    /// Chapters of a single disc, if cached
    pub async fn get(&self, key: DiscKey) -> Result<Option<DiscChapterInfo>> {
        if !self.exists() {
            return Ok(None);
        }
        Ok(self.load().await?.remove(&key))
    }

    /// Drop one disc from the cache so that it is inspected again next run
    pub async fn invalidate(&self, key: DiscKey) -> Result<bool> {
        if !self.exists() {
            debug!("Cache file not found: {}", self.cache_path.display());
            return Ok(false);
        }

        let mut discs = self.load().await?;
        if discs.remove(&key).is_none() {
            return Ok(false);
        }

        self.save(&discs).await?;
        info!("🗑️ Invalidated cached chapters for disc {}", key);
        Ok(true)
    }

    /// Remove the cache file entirely
    pub async fn clear(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }

        tokio::fs::remove_file(&self.cache_path)
            .await
            .map_err(|source| self.io_error(source))?;
        info!("🧹 Removed chapter cache {}", self.cache_path.display());
        Ok(true)
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        if !self.exists() {
            return Ok(stats);
        }

        let discs = self.load().await?;
        stats.total_discs = discs.len();
        stats.total_parts = discs
            .keys()
            .map(|key| key.part)
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        stats.total_chapters = discs.values().map(DiscChapterInfo::len).sum();
        stats.total_duration = discs.values().map(DiscChapterInfo::total_duration).sum();
        Ok(stats)
    }

    /// List all cached discs in part/disc order
    pub async fn list(&self) -> Result<Vec<CachedDiscInfo>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|(key, info)| CachedDiscInfo {
                key,
                source_file: info.source_file().to_string(),
                chapter_count: info.len(),
                duration: info.total_duration(),
            })
            .collect())
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.cache_path.clone(),
            source,
        }
    }
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub total_parts: usize,
    pub total_discs: usize,
    pub total_chapters: usize,
    pub total_duration: Duration,
}

/// Information about a cached disc
#[derive(Debug, Clone)]
pub struct CachedDiscInfo {
    pub key: DiscKey,
    pub source_file: String,
    pub chapter_count: usize,
    pub duration: Duration,
}
