/// Disc Episode Splitter
///
/// Splits multi-episode disc rips into one file per episode. Episode
/// boundaries are not stored on the discs; they are inferred by lining up
/// the chapter markers reported by `mkvinfo` with the cue timing of each
/// episode's subtitle file.

pub mod chapters;
pub mod config;
pub mod episodes;
pub mod mux;
pub mod processing;
pub mod subtitles;
pub mod video;

// Re-export main types for easy access
pub use crate::chapters::{
    align_disc, ChapterCacheManager, ChapterToEpisodeInfo, DiscAlignment, DiscChapterInfo, DiscKey,
};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::episodes::{EpisodeGuide, PartCatalog};
pub use crate::processing::{PlanResult, PlanStatus, SplitPlanner};
pub use crate::subtitles::{EpisodeTiming, EpisodeTimings, TimingLookup};
pub use crate::video::{InspectionTool, MkvInfoRunner, ToolError};
