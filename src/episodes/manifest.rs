/// Disc manifest loading
///
/// Comma-separated, one row per episode: part, disc, episode number, title.
/// Rows appear in authoring order. The title is the last column and may
/// itself contain commas.
use super::{Disc, Episode, EpisodeGuide, Part, PartCatalog};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read disc manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("disc manifest line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("disc manifest line {line}: episode {episode_number} is not in the episode guide")]
    UnknownEpisode { line: usize, episode_number: String },
}

/// Read the manifest at `path` and resolve it against `guide`
pub async fn load_manifest(path: &Path, guide: &EpisodeGuide) -> Result<PartCatalog, ManifestError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let catalog = parse_manifest(&content, guide)?;
    info!(
        "📀 Disc manifest {}: {} parts, {} discs, {} episodes",
        path.display(),
        catalog.parts().len(),
        catalog.disc_count(),
        catalog.episode_count()
    );
    Ok(catalog)
}

/// Build the part catalog from manifest content. The first line is a header.
///
/// Special flags come from the non-remastered guide entry of each episode.
pub fn parse_manifest(content: &str, guide: &EpisodeGuide) -> Result<PartCatalog, ManifestError> {
    let mut grouped: BTreeMap<u32, BTreeMap<u32, Vec<Episode>>> = BTreeMap::new();

    for (index, raw) in content.lines().enumerate().skip(1) {
        let line_no = index + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.splitn(4, ',');
        let (part, disc, number, title) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(part), Some(disc), Some(number), Some(title)) => (part, disc, number, title),
            _ => {
                return Err(ManifestError::Malformed {
                    line: line_no,
                    reason: "expected part,disc,episode,title".to_string(),
                })
            }
        };

        let part = parse_number(part, "part", line_no)?;
        let disc = parse_number(disc, "disc", line_no)?;
        let number = number.trim();

        let specials = guide.flags(number, false).ok_or_else(|| ManifestError::UnknownEpisode {
            line: line_no,
            episode_number: number.to_string(),
        })?;

        grouped
            .entry(part)
            .or_default()
            .entry(disc)
            .or_default()
            .push(Episode::new(number, title, specials));
    }

    let parts = grouped
        .into_iter()
        .map(|(part, discs)| {
            let discs = discs
                .into_iter()
                .map(|(disc, episodes)| (disc, Disc::new(episodes)))
                .collect();
            (part, Part::new(discs))
        })
        .collect();

    Ok(PartCatalog::new(parts))
}

fn parse_number(value: &str, column: &str, line: usize) -> Result<u32, ManifestError> {
    value.trim().parse().map_err(|_| ManifestError::Malformed {
        line,
        reason: format!("invalid {} number '{}'", column, value.trim()),
    })
}
