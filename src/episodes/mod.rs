/// Episode guide and disc manifest
///
/// The guide tells which episodes are extended-length specials, the manifest
/// tells which episodes each disc of each part holds and in which order.

pub mod guide;
pub mod manifest;

pub use guide::{EpisodeGuide, GuideDiagnostic, GuideError};
pub use manifest::{load_manifest, parse_manifest, ManifestError};

use crate::chapters::DiscKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime class markers taken from the guide titles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialFlags {
    pub one_hour: bool,
    pub two_hour: bool,
    pub two_point_five_hour: bool,
}

impl SpecialFlags {
    pub fn from_title(title: &str) -> Self {
        Self {
            one_hour: title.contains("(1 Hour Special)"),
            two_hour: title.contains("(2 Hour Special)"),
            two_point_five_hour: title.contains("(2.5 Hour Special)"),
        }
    }

    pub fn is_special(&self) -> bool {
        self.one_hour || self.two_hour || self.two_point_five_hour
    }
}

/// An episode as listed in the disc manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Guide identifier, not necessarily numeric (e.g. `219`, `1000-1001`)
    pub episode_number: String,
    pub title: String,
    pub specials: SpecialFlags,
}

impl Episode {
    pub fn new(episode_number: impl Into<String>, title: impl Into<String>, specials: SpecialFlags) -> Self {
        Self {
            episode_number: episode_number.into(),
            title: title.into(),
            specials,
        }
    }
}

/// Episodes of one disc in authoring order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disc {
    episodes: Vec<Episode>,
}

impl Disc {
    pub fn new(episodes: Vec<Episode>) -> Self {
        Self { episodes }
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn is_single_episode(&self) -> bool {
        self.episodes.len() == 1
    }
}

/// A released volume and its discs, keyed by disc number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    discs: BTreeMap<u32, Disc>,
}

impl Part {
    pub fn new(discs: BTreeMap<u32, Disc>) -> Self {
        Self { discs }
    }

    pub fn discs(&self) -> &BTreeMap<u32, Disc> {
        &self.discs
    }
}

/// All parts of the release, keyed by part number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartCatalog {
    parts: BTreeMap<u32, Part>,
}

impl PartCatalog {
    pub fn new(parts: BTreeMap<u32, Part>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &BTreeMap<u32, Part> {
        &self.parts
    }

    pub fn disc(&self, key: DiscKey) -> Option<&Disc> {
        self.parts.get(&key.part)?.discs.get(&key.disc)
    }

    /// Every disc in part/disc order
    pub fn discs(&self) -> impl Iterator<Item = (DiscKey, &Disc)> {
        self.parts.iter().flat_map(|(part_number, part)| {
            part.discs
                .iter()
                .map(move |(disc_number, disc)| (DiscKey::new(*part_number, *disc_number), disc))
        })
    }

    pub fn disc_count(&self) -> usize {
        self.parts.values().map(|part| part.discs.len()).sum()
    }

    pub fn episode_count(&self) -> usize {
        self.discs().map(|(_, disc)| disc.episodes.len()).sum()
    }
}
