/// Chapter timelines for ripped discs
///
/// This module holds the per-disc chapter data model together with the
/// mkvinfo text parser, the flat chapter cache and the chapter-to-episode
/// alignment engine that consumes them.

pub mod alignment;
pub mod cache;
pub mod mkvinfo;

// Re-export main types
pub use alignment::{align_disc, AlignmentDiagnostic, AlignmentError, ChapterToEpisodeInfo, DiscAlignment};
pub use cache::{CacheUnit, ChapterCacheManager};
pub use mkvinfo::{InspectError, InspectionReport, Track, TrackKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifies one disc of one released part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscKey {
    pub part: u32,
    pub disc: u32,
}

impl DiscKey {
    pub fn new(part: u32, disc: u32) -> Self {
        Self { part, disc }
    }
}

impl fmt::Display for DiscKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.part, self.disc)
    }
}

/// A single chapter marker on a disc timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 1-based position among the retained chapters of the disc
    pub number: u32,
    /// Display string, may be empty
    pub title: String,
    /// Offset of the chapter start from the beginning of the disc
    pub start: Duration,
    /// Offset of the chapter end from the beginning of the disc
    pub end: Duration,
}

impl Chapter {
    pub fn new(number: u32, title: impl Into<String>, start: Duration, end: Duration) -> Self {
        Self {
            number,
            title: title.into(),
            start,
            end,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("chapter {found} is out of sequence, expected {expected}")]
    OutOfSequence { expected: u32, found: u32 },

    #[error("chapter {number} ends before it starts")]
    NegativeLength { number: u32 },

    #[error("chapter {number} ends before chapter {previous}")]
    EndsBeforePrevious { number: u32, previous: u32 },
}

/// Chapter timeline of the media file inspected for one disc.
///
/// Chapters are numbered `1..=n` without gaps and their end times never
/// decrease. The constructor rejects anything else, so a value of this type
/// can be handed to the alignment engine as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscChapterInfo {
    source_file: String,
    chapters: Vec<Chapter>,
}

impl DiscChapterInfo {
    pub fn new(source_file: impl Into<String>, chapters: Vec<Chapter>) -> Result<Self, TimelineError> {
        let mut previous: Option<&Chapter> = None;
        for (index, chapter) in chapters.iter().enumerate() {
            let expected = index as u32 + 1;
            if chapter.number != expected {
                return Err(TimelineError::OutOfSequence {
                    expected,
                    found: chapter.number,
                });
            }
            if chapter.end < chapter.start {
                return Err(TimelineError::NegativeLength { number: chapter.number });
            }
            if let Some(prev) = previous {
                if chapter.end < prev.end {
                    return Err(TimelineError::EndsBeforePrevious {
                        number: chapter.number,
                        previous: prev.number,
                    });
                }
            }
            previous = Some(chapter);
        }

        Ok(Self {
            source_file: source_file.into(),
            chapters,
        })
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn last(&self) -> Option<&Chapter> {
        self.chapters.last()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Total running time covered by the chapter markers
    pub fn total_duration(&self) -> Duration {
        self.last().map(|c| c.end).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_valid_timeline() {
        let info = DiscChapterInfo::new(
            "disc.mkv",
            vec![
                Chapter::new(1, "Opening", secs(0), secs(90)),
                Chapter::new(2, "", secs(90), secs(600)),
            ],
        )
        .unwrap();

        assert_eq!(info.len(), 2);
        assert_eq!(info.total_duration(), secs(600));
        assert_eq!(info.source_file(), "disc.mkv");
    }

    #[test]
    fn test_rejects_gap_in_numbering() {
        let err = DiscChapterInfo::new(
            "disc.mkv",
            vec![
                Chapter::new(1, "a", secs(0), secs(10)),
                Chapter::new(3, "b", secs(10), secs(20)),
            ],
        )
        .unwrap_err();

        assert_eq!(err, TimelineError::OutOfSequence { expected: 2, found: 3 });
    }

    #[test]
    fn test_rejects_backwards_chapters() {
        let err = DiscChapterInfo::new("disc.mkv", vec![Chapter::new(1, "a", secs(10), secs(5))]).unwrap_err();
        assert_eq!(err, TimelineError::NegativeLength { number: 1 });

        let err = DiscChapterInfo::new(
            "disc.mkv",
            vec![
                Chapter::new(1, "a", secs(0), secs(30)),
                Chapter::new(2, "b", secs(5), secs(20)),
            ],
        )
        .unwrap_err();
        assert_eq!(err, TimelineError::EndsBeforePrevious { number: 2, previous: 1 });
    }

    #[test]
    fn test_disc_key_display_and_order() {
        let mut keys = vec![DiscKey::new(2, 1), DiscKey::new(1, 10), DiscKey::new(1, 2)];
        keys.sort();
        assert_eq!(keys, vec![DiscKey::new(1, 2), DiscKey::new(1, 10), DiscKey::new(2, 1)]);
        assert_eq!(DiscKey::new(12, 3).to_string(), "12-3");
    }
}
