/// Episode guide loading
///
/// The guide is tab-separated with nine columns: episode number,
/// international number, title, original broadcast date, English broadcast
/// date and four columns that are not used here. Remastered re-releases
/// share the episode number of the original broadcast, so entries are keyed
/// by `(episode number, remastered)`.
use super::SpecialFlags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const COLUMN_COUNT: usize = 9;

/// Titles carrying one of these markers are reruns or extra remaster
/// variants and never appear on the discs.
const SKIPPED_MARKERS: &[&str] = &["(Rerun)", "(Remastered)[2]", "(Remastered)[3]", "(Remastered - "];
const REMASTERED_MARKER: &str = "(Remastered)";

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("cannot read episode guide {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("episode guide line {line}: expected {expected} tab-separated columns, found {found}")]
    ColumnCount { line: usize, expected: usize, found: usize },
}

/// Non-fatal findings while loading the guide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuideDiagnostic {
    /// A second entry for an already known key; the first one was kept.
    Duplicate {
        line: usize,
        episode_number: String,
        remastered: bool,
        title: String,
    },
}

/// The columns of a guide row that identify an episode
#[derive(Debug, Clone, PartialEq, Eq)]
struct GuideRow {
    episode_number: String,
    title: String,
}

impl GuideRow {
    fn parse(line: &str, line_no: usize) -> Result<Self, GuideError> {
        let values: Vec<&str> = line.split('\t').collect();
        if values.len() < COLUMN_COUNT {
            return Err(GuideError::ColumnCount {
                line: line_no,
                expected: COLUMN_COUNT,
                found: values.len(),
            });
        }

        Ok(Self {
            episode_number: values[0].trim().to_string(),
            title: values[2].to_string(),
        })
    }

    fn is_skipped_variant(&self) -> bool {
        SKIPPED_MARKERS.iter().any(|marker| self.title.contains(marker))
    }

    fn is_remastered(&self) -> bool {
        self.title.contains(REMASTERED_MARKER)
    }
}

/// Special-length flags per `(episode number, remastered)`
#[derive(Debug, Clone, Default)]
pub struct EpisodeGuide {
    entries: HashMap<(String, bool), SpecialFlags>,
    diagnostics: Vec<GuideDiagnostic>,
}

impl EpisodeGuide {
    /// Load and reconcile the guide file at `path`
    pub async fn load(path: &Path) -> Result<Self, GuideError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|source| GuideError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let guide = Self::parse(&content)?;
        info!(
            "📖 Episode guide {}: {} entries, {} duplicates skipped",
            path.display(),
            guide.len(),
            guide.diagnostics.len()
        );
        Ok(guide)
    }

    /// Parse guide content; the first line is a header
    pub fn parse(content: &str) -> Result<Self, GuideError> {
        let mut guide = Self::default();

        for (index, raw) in content.lines().enumerate().skip(1) {
            let line_no = index + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let row = GuideRow::parse(line, line_no)?;
            if row.is_skipped_variant() {
                debug!("Skipping rerun/variant {} '{}'", row.episode_number, row.title);
                continue;
            }

            guide.insert(row, line_no);
        }

        Ok(guide)
    }

    fn insert(&mut self, row: GuideRow, line_no: usize) {
        let remastered = row.is_remastered();
        let key = (row.episode_number, remastered);

        if self.entries.contains_key(&key) {
            warn!("Maybe '{};{}' is an unmarked rerun? Skipping", key.0, row.title);
            self.diagnostics.push(GuideDiagnostic::Duplicate {
                line: line_no,
                episode_number: key.0,
                remastered,
                title: row.title,
            });
            return;
        }

        self.entries.insert(key, SpecialFlags::from_title(&row.title));
    }

    /// Flags for an episode, `remastered` selecting the re-release variant
    pub fn flags(&self, episode_number: &str, remastered: bool) -> Option<SpecialFlags> {
        self.entries.get(&(episode_number.to_string(), remastered)).copied()
    }

    pub fn diagnostics(&self) -> &[GuideDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(number: &str, title: &str) -> String {
        format!("{}\t{}\t{}\t1996-01-08\t2003-05-24\t\t\t\t", number, number, title)
    }

    fn guide_text(rows: &[String]) -> String {
        let mut text = String::from("Episode\tIntl\tTitle\tOriginal\tEnglish\tDub\tPlot\tManga\tHint\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_flags_and_remaster_key() {
        let text = guide_text(&[
            row("1", "Roller Coaster Murder Case (1 Hour Special)"),
            row("1", "Roller Coaster Murder Case (Remastered)"),
            row("2", "Company President's Daughter Kidnapping Case"),
        ]);
        let guide = EpisodeGuide::parse(&text).unwrap();

        assert_eq!(guide.len(), 3);
        assert!(guide.flags("1", false).unwrap().one_hour);
        assert!(!guide.flags("1", true).unwrap().one_hour);
        assert!(!guide.flags("2", false).unwrap().is_special());
        assert!(guide.flags("3", false).is_none());
        assert!(guide.diagnostics().is_empty());
    }

    #[test]
    fn test_duplicate_keeps_first_and_records_diagnostic() {
        let text = guide_text(&[
            row("54", "The Mysterious Sniper Case (2 Hour Special)"),
            row("54", "The Mysterious Sniper Case"),
        ]);
        let guide = EpisodeGuide::parse(&text).unwrap();

        assert_eq!(guide.len(), 1);
        assert!(guide.flags("54", false).unwrap().two_hour);
        assert_eq!(
            guide.diagnostics(),
            &[GuideDiagnostic::Duplicate {
                line: 3,
                episode_number: "54".to_string(),
                remastered: false,
                title: "The Mysterious Sniper Case".to_string(),
            }]
        );
    }

    #[test]
    fn test_reruns_and_variants_are_filtered() {
        let text = guide_text(&[
            row("10", "Doctor Murder Case (Rerun)"),
            row("11", "Piano Sonata Moonlight Murder Case (Remastered)[2]"),
            row("12", "Hidden Treasure (Remastered - Part 1)"),
            row("10", "Doctor Murder Case"),
        ]);
        let guide = EpisodeGuide::parse(&text).unwrap();

        assert_eq!(guide.len(), 1);
        assert!(guide.flags("10", false).is_some());
        assert!(guide.flags("11", true).is_none());
        assert!(guide.diagnostics().is_empty());
    }

    #[test]
    fn test_short_row_is_an_error() {
        let text = guide_text(&["5\t5\tOnly three".to_string()]);
        assert!(matches!(
            EpisodeGuide::parse(&text).unwrap_err(),
            GuideError::ColumnCount { line: 2, found: 3, .. }
        ));
    }

    #[test]
    fn test_header_and_blank_lines_are_ignored() {
        let text = format!("{}\r\n", guide_text(&[row("7", "Case")]).replace('\n', "\r\n"));
        let guide = EpisodeGuide::parse(&text).unwrap();
        assert_eq!(guide.len(), 1);
    }
}
