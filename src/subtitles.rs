/// Episode timing from subtitle files
///
/// Each subtitle file covers one episode. The first and last timed cues
/// approximate where the episode's content starts and ends relative to the
/// episode's own beginning.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

static SRT_TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})").unwrap()
});

static ASS_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d{2}):(\d{2})\.(\d{2})$").unwrap());

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("subtitle directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("cannot scan subtitle directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot read subtitle file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cue time '{value}' in {path}")]
    InvalidTime { path: PathBuf, value: String },
}

pub type Result<T> = std::result::Result<T, SubtitleError>;

/// Approximate on-episode offsets of the first and last subtitle cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeTiming {
    pub start_offset: Duration,
    pub end_offset: Duration,
    pub source_file: PathBuf,
}

impl EpisodeTiming {
    pub fn new(start_offset: Duration, end_offset: Duration, source_file: PathBuf) -> Self {
        Self {
            start_offset,
            end_offset,
            source_file,
        }
    }
}

/// Lookup of episode timing by episode number
pub trait TimingLookup {
    fn timing(&self, episode_number: &str) -> Option<&EpisodeTiming>;
}

impl TimingLookup for HashMap<String, EpisodeTiming> {
    fn timing(&self, episode_number: &str) -> Option<&EpisodeTiming> {
        self.get(episode_number)
    }
}

/// Subtitle formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    SubRip,
    SubStationAlpha,
}

impl SubtitleFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "srt" => Some(Self::SubRip),
            "ass" | "ssa" => Some(Self::SubStationAlpha),
            _ => None,
        }
    }
}

/// Timings of every episode found in a subtitle directory
#[derive(Debug, Clone, Default)]
pub struct EpisodeTimings {
    entries: HashMap<String, EpisodeTiming>,
}

impl EpisodeTimings {
    /// Scan `dir` recursively and derive one timing per subtitle file.
    ///
    /// Files are visited in name order so that the first of two files
    /// mapping to the same episode is stable.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(SubtitleError::MissingDirectory(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(format) = SubtitleFormat::from_path(entry.path()) {
                files.push((entry.into_path(), format));
            }
        }

        let mut timings = Self::default();
        for (path, format) in files {
            let content = tokio::fs::read(&path).await.map_err(|source| SubtitleError::Io {
                path: path.clone(),
                source,
            })?;
            let content = String::from_utf8_lossy(&content);

            let Some(key) = episode_key(&path) else {
                warn!("⚠️ Cannot derive an episode number from {}", path.display());
                continue;
            };

            let Some((start, end)) = cue_span(&content, format, &path)? else {
                warn!("⚠️ No timed cues in {}, skipping", path.display());
                continue;
            };

            if let Some(existing) = timings.entries.get(&key) {
                warn!(
                    "⚠️ Episode {} already has subtitles from {}, ignoring {}",
                    key,
                    existing.source_file.display(),
                    path.display()
                );
                continue;
            }

            debug!("Episode {}: cues {:?}..{:?} from {}", key, start, end, path.display());
            timings.entries.insert(key, EpisodeTiming::new(start, end, path));
        }

        info!("💬 Loaded subtitle timing for {} episodes from {}", timings.len(), dir.display());
        Ok(timings)
    }

    pub fn insert(&mut self, episode_number: impl Into<String>, timing: EpisodeTiming) {
        self.entries.insert(episode_number.into(), timing);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TimingLookup for EpisodeTimings {
    fn timing(&self, episode_number: &str) -> Option<&EpisodeTiming> {
        self.entries.get(episode_number)
    }
}

/// Episode number of a subtitle file: its stem without leading zeros
pub fn episode_key(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.trim();
    if stem.is_empty() {
        return None;
    }
    let trimmed = stem.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Earliest cue start and latest cue end, `None` when the file has no cues
pub fn cue_span(content: &str, format: SubtitleFormat, path: &Path) -> Result<Option<(Duration, Duration)>> {
    let cues = match format {
        SubtitleFormat::SubRip => srt_cues(content),
        SubtitleFormat::SubStationAlpha => ass_cues(content, path)?,
    };

    Ok(cues.into_iter().fold(None, |span, (start, end)| match span {
        None => Some((start, end)),
        Some((min_start, max_end)) => Some((min_start.min(start), max_end.max(end))),
    }))
}

fn srt_cues(content: &str) -> Vec<(Duration, Duration)> {
    SRT_TIMING
        .captures_iter(content)
        .map(|caps| {
            let part = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
            let start = hms_millis(part(1), part(2), part(3), part(4));
            let end = hms_millis(part(5), part(6), part(7), part(8));
            (start, end)
        })
        .collect()
}

fn ass_cues(content: &str, path: &Path) -> Result<Vec<(Duration, Duration)>> {
    let mut cues = Vec::new();
    for line in content.lines() {
        let Some(rest) = line.trim_start().strip_prefix("Dialogue:") else {
            continue;
        };

        let mut fields = rest.splitn(4, ',');
        let (Some(_layer), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };

        cues.push((ass_time(start, path)?, ass_time(end, path)?));
    }
    Ok(cues)
}

fn ass_time(value: &str, path: &Path) -> Result<Duration> {
    let value = value.trim();
    let caps = ASS_TIME.captures(value).ok_or_else(|| SubtitleError::InvalidTime {
        path: path.to_path_buf(),
        value: value.to_string(),
    })?;
    let part = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
    Ok(hms_millis(part(1), part(2), part(3), part(4) * 10))
}

fn hms_millis(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Duration {
    Duration::from_millis(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SRT: &str = "1\n00:00:05,500 --> 00:00:07,000\nFirst line\n\n\
        2\n00:21:40,120 --> 00:21:43,900\nLast line\n\n\
        3\n00:01:00,000 --> 00:01:02,000\nOut of order\n";

    const ASS: &str = "[Script Info]\nTitle: test\n\n[Events]\n\
        Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
        Dialogue: 0,0:00:02.50,0:00:04.00,Default,,0,0,0,,Hello, world\n\
        Comment: 0,0:30:00.00,0:31:00.00,Default,,0,0,0,,ignored\n\
        Dialogue: 0,0:22:10.25,0:22:12.75,Default,,0,0,0,,Goodbye\n";

    #[test]
    fn test_srt_span() {
        let span = cue_span(SRT, SubtitleFormat::SubRip, Path::new("1.srt")).unwrap();
        assert_eq!(span, Some((Duration::from_millis(5_500), Duration::from_millis(1_303_900))));
    }

    #[test]
    fn test_ass_span_ignores_comments() {
        let span = cue_span(ASS, SubtitleFormat::SubStationAlpha, Path::new("1.ass")).unwrap();
        assert_eq!(span, Some((Duration::from_millis(2_500), Duration::from_millis(1_332_750))));
    }

    #[test]
    fn test_ass_invalid_time() {
        let bad = "Dialogue: 0,zero,0:00:04.00,Default,,0,0,0,,x\n";
        assert!(matches!(
            cue_span(bad, SubtitleFormat::SubStationAlpha, Path::new("bad.ass")),
            Err(SubtitleError::InvalidTime { .. })
        ));
    }

    #[test]
    fn test_no_cues() {
        assert_eq!(cue_span("", SubtitleFormat::SubRip, Path::new("x.srt")).unwrap(), None);
    }

    #[test]
    fn test_episode_key_trims_leading_zeros() {
        assert_eq!(episode_key(Path::new("subs/0042.ass")).as_deref(), Some("42"));
        assert_eq!(episode_key(Path::new("219.srt")).as_deref(), Some("219"));
        assert_eq!(episode_key(Path::new("100.srt")).as_deref(), Some("100"));
        assert_eq!(episode_key(Path::new("000.srt")).as_deref(), Some("0"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SubtitleFormat::from_path(Path::new("a.SRT")), Some(SubtitleFormat::SubRip));
        assert_eq!(SubtitleFormat::from_path(Path::new("a.ssa")), Some(SubtitleFormat::SubStationAlpha));
        assert_eq!(SubtitleFormat::from_path(Path::new("a.txt")), None);
    }

    #[tokio::test]
    async fn test_load_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("season1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp_dir.path().join("001.srt"), SRT).unwrap();
        std::fs::write(nested.join("002.ass"), ASS).unwrap();
        std::fs::write(temp_dir.path().join("003.srt"), "no cues here").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), SRT).unwrap();
        // Same episode as 001.srt, which sorts first and wins.
        std::fs::write(temp_dir.path().join("01.srt"), "1\n00:00:00,000 --> 00:00:01,000\nx\n").unwrap();

        let timings = EpisodeTimings::load_dir(temp_dir.path()).await.unwrap();

        assert_eq!(timings.len(), 2);
        let first = timings.timing("1").unwrap();
        assert_eq!(first.end_offset, Duration::from_millis(1_303_900));
        assert!(first.source_file.ends_with("001.srt"));
        assert_eq!(timings.timing("2").unwrap().start_offset, Duration::from_millis(2_500));
        assert!(timings.timing("3").is_none());
    }

    #[tokio::test]
    async fn test_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            EpisodeTimings::load_dir(&temp_dir.path().join("nope")).await,
            Err(SubtitleError::MissingDirectory(_))
        ));
    }
}
