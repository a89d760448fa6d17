/// Chapter-to-episode alignment
///
/// Episode boundaries are not recorded anywhere on the disc. They are
/// inferred from the end offset of each episode's subtitles: the offset is
/// re-based onto the disc timeline (episodes are assumed to be laid out
/// back to back) and the episode ends at the first chapter marker at or
/// after that point.
use super::{Chapter, DiscChapterInfo};
use crate::episodes::Disc;
use crate::subtitles::TimingLookup;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("disc has no episodes")]
    NoEpisodes,

    #[error("disc has no chapters")]
    NoChapters,

    #[error("no subtitle timing for episode {episode_number}")]
    MissingTiming { episode_number: String },

    #[error("episode {episode_number} starts after the last chapter ({last_chapter}) was already assigned")]
    ChaptersExhausted { episode_number: String, last_chapter: u32 },
}

/// Inclusive chapter range assigned to one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterToEpisodeInfo {
    pub episode_number: String,
    pub episode_title: String,
    pub chapter_start: u32,
    pub chapter_end: u32,
}

/// Data-quality findings that did not stop the alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentDiagnostic {
    /// The episode should end after every chapter on the disc; the last
    /// chapter was used instead.
    InsufficientCoverage {
        episode_number: String,
        expected_end: Duration,
        last_chapter_end: Duration,
    },
    /// Chapters left over after the final episode's end chapter
    TrailingChapters { first: u32, last: u32 },
}

/// Alignment result for one disc
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscAlignment {
    pub assignments: Vec<ChapterToEpisodeInfo>,
    pub diagnostics: Vec<AlignmentDiagnostic>,
}

/// Partition the chapters of `chapters` among the episodes of `disc`.
///
/// A disc holding a single episode gets the whole range
/// `1..=last + 1` (the extra number is an end sentinel) without looking at
/// subtitle timing. Otherwise every episode needs an entry in `timings`.
pub fn align_disc<T>(disc: &Disc, chapters: &DiscChapterInfo, timings: &T) -> Result<DiscAlignment, AlignmentError>
where
    T: TimingLookup + ?Sized,
{
    let last = chapters.last().ok_or(AlignmentError::NoChapters)?;

    let episodes = disc.episodes();
    let first = episodes.first().ok_or(AlignmentError::NoEpisodes)?;

    if disc.is_single_episode() {
        return Ok(DiscAlignment {
            assignments: vec![ChapterToEpisodeInfo {
                episode_number: first.episode_number.clone(),
                episode_title: first.title.clone(),
                chapter_start: 1,
                chapter_end: last.number + 1,
            }],
            diagnostics: Vec::new(),
        });
    }

    let mut alignment = DiscAlignment::default();
    let mut cursor_start: u32 = 1;
    let mut cursor_time = Duration::ZERO;

    for episode in episodes {
        let timing = timings
            .timing(&episode.episode_number)
            .ok_or_else(|| AlignmentError::MissingTiming {
                episode_number: episode.episode_number.clone(),
            })?;

        if cursor_start > last.number {
            return Err(AlignmentError::ChaptersExhausted {
                episode_number: episode.episode_number.clone(),
                last_chapter: last.number,
            });
        }

        let expected_end = timing.end_offset + cursor_time;
        let remaining = &chapters.chapters()[(cursor_start - 1) as usize..];

        let end_chapter = match closest_end_at_or_after(remaining, expected_end) {
            Some(chapter) => chapter,
            None => {
                warn!(
                    "⚠️ Not enough chapter time for episode {} - {}: expected end {:?}, disc ends at {:?}",
                    episode.episode_number, episode.title, expected_end, last.end
                );
                alignment.diagnostics.push(AlignmentDiagnostic::InsufficientCoverage {
                    episode_number: episode.episode_number.clone(),
                    expected_end,
                    last_chapter_end: last.end,
                });
                last
            }
        };

        debug!(
            "Episode {} ends near {:?}, chapters {}..={}",
            episode.episode_number, expected_end, cursor_start, end_chapter.number
        );

        alignment.assignments.push(ChapterToEpisodeInfo {
            episode_number: episode.episode_number.clone(),
            episode_title: episode.title.clone(),
            chapter_start: cursor_start,
            chapter_end: end_chapter.number,
        });

        cursor_start = end_chapter.number + 1;
        cursor_time = end_chapter.end;
    }

    if cursor_start <= last.number {
        warn!(
            "⚠️ Chapters {}..={} of {} are not part of any episode",
            cursor_start,
            last.number,
            chapters.source_file()
        );
        alignment.diagnostics.push(AlignmentDiagnostic::TrailingChapters {
            first: cursor_start,
            last: last.number,
        });
    }

    Ok(alignment)
}

/// The chapter ending closest to `target` without ending before it.
/// Equal distances resolve to the lower chapter number.
fn closest_end_at_or_after(chapters: &[Chapter], target: Duration) -> Option<&Chapter> {
    chapters
        .iter()
        .filter(|chapter| chapter.end >= target)
        .min_by_key(|chapter| chapter.end - target)
}
