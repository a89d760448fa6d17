/// Parser for the tree-shaped text printed by `mkvinfo`
///
/// The output is a flat list of lines whose `|`, ` ` and `+` prefix encodes
/// the nesting depth. Parsing happens in two phases: the text is first cut
/// into per-track and per-chapter-atom blocks at fixed boundary lines, then
/// each block is scanned for a small table of fixed-prefix fields. Field
/// order inside a block does not matter, a missing field does.
use super::{Chapter, DiscChapterInfo, TimelineError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const SECTION_PREFIX: &str = "|+ ";
const TRACKS_SECTION: &str = "Tracks";
const CHAPTERS_SECTION: &str = "Chapters";

const TRACK_MARKER: &str = "| + Track";
const CHAPTER_ATOM_MARKER: &str = "|  + Chapter atom";

const TRACK_PROPERTY_PREFIX: &str = "|  + ";
const CHAPTER_START_PREFIX: &str = "|   + Chapter time start: ";
const CHAPTER_END_PREFIX: &str = "|   + Chapter time end: ";
const CHAPTER_STRING_PREFIX: &str = "|    + Chapter string: ";

const VOID_ELEMENT: &str = "EBML void";

static TRACK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(track ID for mkvmerge & mkvextract: (\d+)\)").unwrap());

pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("inspection output has no '{0}' section")]
    MissingSection(&'static str),

    #[error("track {track} has no '{field}' line")]
    MissingTrackField { track: usize, field: &'static str },

    #[error("track {track} has a malformed '{field}' line: {value}")]
    InvalidTrackField {
        track: usize,
        field: &'static str,
        value: String,
    },

    #[error("invalid chapter timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("no usable chapters found")]
    NoChapters,

    #[error("chapter timeline is inconsistent: {0}")]
    Timeline(#[from] TimelineError),
}

/// Kind of an elementary stream, as reported by the `Track type:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

impl TrackKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "video" => Some(TrackKind::Video),
            "audio" => Some(TrackKind::Audio),
            "subtitles" => Some(TrackKind::Subtitle),
            _ => None,
        }
    }

    /// Matroska codec IDs carry a per-kind prefix (`V_MPEG2`, `A_AC3`, `S_VOBSUB`)
    fn codec_prefix(self) -> &'static str {
        match self {
            TrackKind::Video => "V_",
            TrackKind::Audio => "A_",
            TrackKind::Subtitle => "S_",
        }
    }

    /// Turn the raw fields of one track block into a `Track` of this kind
    fn extract(self, index: usize, fields: &TrackFields<'_>) -> Result<Track> {
        let number_line = fields.number.ok_or(InspectError::MissingTrackField {
            track: index,
            field: "Track number",
        })?;
        let number = TRACK_ID
            .captures(number_line)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .ok_or_else(|| InspectError::InvalidTrackField {
                track: index,
                field: "Track number",
                value: number_line.to_string(),
            })?;

        let codec_id = fields.codec.ok_or(InspectError::MissingTrackField {
            track: index,
            field: "Codec ID",
        })?;
        let codec = codec_id
            .trim()
            .strip_prefix(self.codec_prefix())
            .filter(|codec| !codec.is_empty())
            .ok_or_else(|| InspectError::InvalidTrackField {
                track: index,
                field: "Codec ID",
                value: codec_id.to_string(),
            })?;

        let language_line = fields.language.ok_or(InspectError::MissingTrackField {
            track: index,
            field: "Language",
        })?;
        let language = language_line
            .split_whitespace()
            .next()
            .ok_or_else(|| InspectError::InvalidTrackField {
                track: index,
                field: "Language",
                value: language_line.to_string(),
            })?;

        Ok(Track {
            kind: self,
            number,
            codec: codec.to_string(),
            language: language.to_string(),
        })
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "subtitles",
        };
        f.write_str(name)
    }
}

/// One elementary stream of the inspected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    /// mkvmerge/mkvextract track ID
    pub number: u32,
    /// Codec ID without its kind prefix, e.g. `MPEG2`
    pub codec: String,
    pub language: String,
}

/// Everything extracted from one `mkvinfo` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionReport {
    pub tracks: Vec<Track>,
    pub chapters: DiscChapterInfo,
}

impl InspectionReport {
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn video_tracks(&self) -> Vec<&Track> {
        self.tracks_of(TrackKind::Video).collect()
    }

    pub fn audio_tracks(&self) -> Vec<&Track> {
        self.tracks_of(TrackKind::Audio).collect()
    }

    pub fn subtitle_tracks(&self) -> Vec<&Track> {
        self.tracks_of(TrackKind::Subtitle).collect()
    }
}

#[derive(Default)]
struct TrackFields<'a> {
    kind: Option<&'a str>,
    number: Option<&'a str>,
    codec: Option<&'a str>,
    language: Option<&'a str>,
}

#[derive(Default)]
struct ChapterFields<'a> {
    start: Option<&'a str>,
    end: Option<&'a str>,
    title: Option<&'a str>,
}

/// Property name → setter, matched against the text after `|  + `
const TRACK_FIELDS: &[(&str, for<'a> fn(&mut TrackFields<'a>, &'a str))] = &[
    ("Track type: ", set_track_kind),
    ("Track number: ", set_track_number),
    ("Codec ID: ", set_track_codec),
    ("Language: ", set_track_language),
];

/// Full-line prefix → setter for the fields of a chapter atom
const CHAPTER_FIELDS: &[(&str, for<'a> fn(&mut ChapterFields<'a>, &'a str))] = &[
    (CHAPTER_START_PREFIX, set_chapter_start),
    (CHAPTER_END_PREFIX, set_chapter_end),
    (CHAPTER_STRING_PREFIX, set_chapter_title),
];

fn set_track_kind<'a>(fields: &mut TrackFields<'a>, value: &'a str) {
    fields.kind = Some(value.trim());
}

fn set_track_number<'a>(fields: &mut TrackFields<'a>, value: &'a str) {
    fields.number = Some(value);
}

fn set_track_codec<'a>(fields: &mut TrackFields<'a>, value: &'a str) {
    fields.codec = Some(value);
}

fn set_track_language<'a>(fields: &mut TrackFields<'a>, value: &'a str) {
    fields.language = Some(value);
}

fn set_chapter_start<'a>(fields: &mut ChapterFields<'a>, value: &'a str) {
    fields.start = Some(value);
}

fn set_chapter_end<'a>(fields: &mut ChapterFields<'a>, value: &'a str) {
    fields.end = Some(value);
}

fn set_chapter_title<'a>(fields: &mut ChapterFields<'a>, value: &'a str) {
    fields.title = Some(value);
}

/// Feed `text` to the first setter whose prefix matches it
fn apply_field<'a, F>(table: &[(&str, fn(&mut F, &'a str))], fields: &mut F, text: &'a str) {
    for (prefix, setter) in table {
        if let Some(value) = text.strip_prefix(prefix) {
            setter(fields, value);
            return;
        }
    }
}

/// Parse the complete `mkvinfo` output for `source_file`
pub fn parse(source_file: &str, output: &str) -> Result<InspectionReport> {
    let lines: Vec<&str> = output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !is_void_line(line))
        .collect();

    let track_lines = section(&lines, TRACKS_SECTION).ok_or(InspectError::MissingSection(TRACKS_SECTION))?;
    let tracks = parse_tracks(&track_lines)?;

    let chapter_lines = section(&lines, CHAPTERS_SECTION).ok_or(InspectError::MissingSection(CHAPTERS_SECTION))?;
    let chapters = parse_chapters(&chapter_lines)?;
    if chapters.is_empty() {
        return Err(InspectError::NoChapters);
    }

    debug!(
        "Parsed {} tracks and {} chapters from {}",
        tracks.len(),
        chapters.len(),
        source_file
    );

    Ok(InspectionReport {
        tracks,
        chapters: DiscChapterInfo::new(source_file, chapters)?,
    })
}

fn parse_tracks(lines: &[&str]) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();

    for (i, block) in split_blocks(lines, TRACK_MARKER).into_iter().enumerate() {
        let index = i + 1;
        let mut fields = TrackFields::default();
        for line in block {
            if let Some(property) = line.strip_prefix(TRACK_PROPERTY_PREFIX) {
                apply_field(TRACK_FIELDS, &mut fields, property);
            }
        }

        let type_name = fields.kind.ok_or(InspectError::MissingTrackField {
            track: index,
            field: "Track type",
        })?;
        match TrackKind::from_type_name(type_name) {
            Some(kind) => tracks.push(kind.extract(index, &fields)?),
            None => debug!("Ignoring track {} of type '{}'", index, type_name),
        }
    }

    Ok(tracks)
}

fn parse_chapters(lines: &[&str]) -> Result<Vec<Chapter>> {
    let mut chapters = Vec::new();

    for block in split_blocks(lines, CHAPTER_ATOM_MARKER) {
        let mut fields = ChapterFields::default();
        for line in block {
            apply_field(CHAPTER_FIELDS, &mut fields, line);
        }

        match (fields.start, fields.end, fields.title) {
            (Some(start), Some(end), Some(title)) if !start.is_empty() && !end.is_empty() && !title.is_empty() => {
                let number = chapters.len() as u32 + 1;
                chapters.push(Chapter::new(number, title, parse_timestamp(start)?, parse_timestamp(end)?));
            }
            _ => debug!("Skipping chapter atom without start, end and title"),
        }
    }

    Ok(chapters)
}

/// Parse an `H:MM:SS.fffffffff` timestamp, truncating to whole seconds
pub fn parse_timestamp(value: &str) -> Result<Duration> {
    let invalid = || InspectError::InvalidTimestamp(value.to_string());

    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let whole = |part: &str| -> Result<u64> {
        let integer = part.split('.').next().unwrap_or(part);
        integer.parse::<u64>().map_err(|_| invalid())
    };

    let hours = whole(parts[0])?;
    let minutes = whole(parts[1])?;
    let seconds = whole(parts[2])?;

    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

fn is_void_line(line: &str) -> bool {
    line.trim_start_matches(['|', ' '])
        .strip_prefix("+ ")
        .map_or(false, |content| content.starts_with(VOID_ELEMENT))
}

fn is_top_level(line: &str) -> bool {
    line.starts_with(SECTION_PREFIX) || line.starts_with("+ ")
}

/// Lines belonging to the top-level section whose header starts with `name`
fn section<'a>(lines: &[&'a str], name: &str) -> Option<Vec<&'a str>> {
    let start = lines
        .iter()
        .position(|line| line.strip_prefix(SECTION_PREFIX).map_or(false, |rest| rest.starts_with(name)))?;

    Some(
        lines[start + 1..]
            .iter()
            .take_while(|line| !is_top_level(line))
            .copied()
            .collect(),
    )
}

/// Split section lines into blocks, one per occurrence of `marker`.
/// Lines before the first marker belong to no block.
fn split_blocks<'a>(lines: &[&'a str], marker: &str) -> Vec<Vec<&'a str>> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&'a str>> = None;

    for &line in lines {
        if line.trim_end() == marker {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(Vec::new());
        } else if let Some(block) = current.as_mut() {
            block.push(line);
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }

    blocks
}
