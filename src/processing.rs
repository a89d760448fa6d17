use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::chapters::cache::CachedDiscs;
use crate::chapters::{align_disc, mkvinfo, AlignmentDiagnostic, ChapterCacheManager, ChapterToEpisodeInfo, DiscKey};
use crate::config::Config;
use crate::episodes::{load_manifest, EpisodeGuide, GuideDiagnostic, PartCatalog};
use crate::mux::{disc_commands, render_script, DiscCommands, MuxSettings};
use crate::subtitles::EpisodeTimings;
use crate::video::{discover_discs, DiscSource, InspectionTool};

/// Planning result for a single disc
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscPlanResult {
    pub part: u32,
    pub disc: u32,
    pub source_file: Option<String>,
    pub assignments: Vec<ChapterToEpisodeInfo>,
    pub diagnostics: Vec<AlignmentDiagnostic>,
    pub commands: Option<DiscCommands>,
    pub status: PlanStatus,
    pub error_message: Option<String>,
}

/// Overall planning results, written as the plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_time: Duration,
    pub guide_diagnostics: Vec<GuideDiagnostic>,
    pub discs: Vec<DiscPlanResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Aligned and commands generated
    Planned,
    /// Commands generated and run successfully
    Executed,
    Failed,
    /// No chapters known for the disc
    Skipped,
}

/// Outcome of a cache build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheBuildSummary {
    pub discovered: usize,
    pub inspected: usize,
    pub failed: usize,
}

/// Drives the whole pipeline: inspection cache, alignment and command generation
pub struct SplitPlanner {
    config: Config,
    inspector: Arc<dyn InspectionTool>,
    cache: ChapterCacheManager,
    worker_semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl SplitPlanner {
    pub fn new(config: Config, inspector: Arc<dyn InspectionTool>) -> Self {
        let max_workers = config.performance.max_workers.max(1);
        info!("🔧 Initializing SplitPlanner with {} workers", max_workers);

        Self {
            cache: ChapterCacheManager::new(config.cache.path.clone()),
            config,
            inspector,
            worker_semaphore: Arc::new(Semaphore::new(max_workers)),
            max_concurrent: max_workers,
        }
    }

    pub fn cache(&self) -> &ChapterCacheManager {
        &self.cache
    }

    /// Inspect every ripped disc and replace the chapter cache.
    ///
    /// Discs whose inspection fails are logged and left out of the cache.
    pub async fn build_cache(&self) -> Result<CacheBuildSummary> {
        let rips_dir = &self.config.inputs.rips_dir;
        info!("🔍 Inspecting ripped discs in {}", rips_dir.display());

        let sources = discover_discs(rips_dir, &self.config.inputs.media_extensions)
            .await
            .with_context(|| format!("Cannot scan rips directory {}", rips_dir.display()))?;

        let mut summary = CacheBuildSummary {
            discovered: sources.len(),
            ..Default::default()
        };

        let discs = self.inspect_parallel(sources, &mut summary).await;
        self.cache.save(&discs).await?;

        info!(
            "📚 Chapter cache built: {}/{} discs inspected, {} failed",
            summary.inspected, summary.discovered, summary.failed
        );
        Ok(summary)
    }

    /// Inspect discs with controlled concurrency, buffering every result
    async fn inspect_parallel(&self, sources: Vec<DiscSource>, summary: &mut CacheBuildSummary) -> CachedDiscs {
        let (tx, mut rx) = mpsc::channel(self.max_concurrent);
        let total_discs = sources.len();

        for (index, source) in sources.into_iter().enumerate() {
            let inspector = Arc::clone(&self.inspector);
            let tx = tx.clone();
            let semaphore = Arc::clone(&self.worker_semaphore);

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                info!(
                    "💿 Inspecting disc {} ({}/{}): {}",
                    source.key,
                    index + 1,
                    total_discs,
                    source.media_file.display()
                );
                let result = inspect_disc(inspector.as_ref(), &source).await;

                if let Err(e) = tx.send((source, result)).await {
                    error!("Failed to send result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        let mut discs = CachedDiscs::new();
        while let Some((source, result)) = rx.recv().await {
            match result {
                Ok(report) => {
                    debug!("Disc {}: {} chapters", source.key, report.chapters.len());
                    summary.inspected += 1;
                    discs.insert(source.key, report.chapters);
                }
                Err(e) => {
                    warn!("❌ Disc {} ({}): {:#}", source.key, source.media_file.display(), e);
                    summary.failed += 1;
                }
            }
        }

        discs
    }

    /// Cached chapters, building the cache first when needed
    pub async fn load_or_build_cache(&self) -> Result<CachedDiscs> {
        if self.config.cache.rebuild || !self.cache.exists() {
            self.build_cache().await?;
        }
        Ok(self.cache.load().await?)
    }

    /// Align every disc of the manifest and generate its commands
    pub async fn plan(&self) -> Result<PlanResult> {
        let start_time = Instant::now();
        info!("🚀 Planning episode splits...");

        let guide = EpisodeGuide::load(&self.config.inputs.episode_guide).await?;
        let catalog = load_manifest(&self.config.inputs.disc_manifest, &guide).await?;
        let cached = self.load_or_build_cache().await?;
        let timings = EpisodeTimings::load_dir(&self.config.inputs.subtitles_dir).await?;

        for key in cached.keys() {
            if catalog.disc(*key).is_none() {
                warn!("⚠️ Disc {} has chapters but is not in the disc manifest", key);
            }
        }

        let settings = self.mux_settings();
        let discs = plan_discs(&catalog, &cached, &timings, &settings);

        Ok(PlanResult::new(discs, guide.diagnostics().to_vec(), start_time.elapsed()))
    }

    /// Plan, write the plan file (and script), and optionally run the commands
    pub async fn run(&self, execute: bool) -> Result<PlanResult> {
        let mut result = self.plan().await?;

        if let Some(script_file) = &self.config.output.script_file {
            let script = render_script(result.discs.iter().filter_map(|disc| {
                disc.commands
                    .as_ref()
                    .map(|commands| (DiscKey::new(disc.part, disc.disc), commands))
            }));
            write_file(script_file, script.as_bytes()).await?;
            info!("📝 Command script saved to: {}", script_file.display());
        }

        if execute {
            self.execute(&mut result).await;
        }

        let plan_file = &self.config.output.plan_file;
        let json_data = serde_json::to_string_pretty(&result)?;
        write_file(plan_file, json_data.as_bytes()).await?;
        info!("💾 Plan saved to: {}", plan_file.display());

        Ok(result)
    }

    /// Run the commands of every planned disc, one disc at a time
    async fn execute(&self, result: &mut PlanResult) {
        let settings = self.mux_settings();

        for disc in result.discs.iter_mut().filter(|disc| disc.status == PlanStatus::Planned) {
            let key = DiscKey::new(disc.part, disc.disc);
            let Some(commands) = &disc.commands else {
                continue;
            };

            match commands.execute(&settings, key).await {
                Ok(()) => disc.status = PlanStatus::Executed,
                Err(e) => {
                    error!("❌ Disc {}: {}", key, e);
                    disc.status = PlanStatus::Failed;
                    disc.error_message = Some(e.to_string());
                }
            }
        }

        result.recount();
    }

    fn mux_settings(&self) -> MuxSettings {
        MuxSettings {
            mkvmerge: self.config.tools.mkvmerge.clone(),
            mkvpropedit: self.config.tools.mkvpropedit.clone(),
            series_name: self.config.output.series_name.clone(),
            temp_dir: self.config.output.temp_dir.clone(),
            output_dir: self.config.output.output_dir.clone(),
        }
    }
}

/// Run the inspection tool against a disc's media file and parse its output
pub async fn inspect_disc(inspector: &dyn InspectionTool, source: &DiscSource) -> Result<mkvinfo::InspectionReport> {
    let output = inspector.inspect(&source.media_file).await?;
    let report = mkvinfo::parse(&source.media_file.to_string_lossy(), &output)?;
    Ok(report)
}

/// Align each manifest disc against its cached chapters
pub fn plan_discs(
    catalog: &PartCatalog,
    cached: &CachedDiscs,
    timings: &EpisodeTimings,
    settings: &MuxSettings,
) -> Vec<DiscPlanResult> {
    catalog
        .discs()
        .map(|(key, disc)| {
            let mut result = DiscPlanResult {
                part: key.part,
                disc: key.disc,
                source_file: None,
                assignments: Vec::new(),
                diagnostics: Vec::new(),
                commands: None,
                status: PlanStatus::Skipped,
                error_message: None,
            };

            let Some(chapters) = cached.get(&key) else {
                warn!("⚠️ No chapters cached for disc {}, skipping", key);
                result.error_message = Some("no cached chapters".to_string());
                return result;
            };
            result.source_file = Some(chapters.source_file().to_string());

            match align_disc(disc, chapters, timings) {
                Ok(alignment) => {
                    for assignment in &alignment.assignments {
                        debug!(
                            "Disc {}: episode {} chapters {}..={}",
                            key, assignment.episode_number, assignment.chapter_start, assignment.chapter_end
                        );
                    }
                    result.commands = Some(disc_commands(
                        settings,
                        key,
                        chapters,
                        &alignment.assignments,
                        timings,
                    ));
                    result.assignments = alignment.assignments;
                    result.diagnostics = alignment.diagnostics;
                    result.status = PlanStatus::Planned;
                }
                Err(e) => {
                    error!("❌ Disc {}: {}", key, e);
                    result.status = PlanStatus::Failed;
                    result.error_message = Some(e.to_string());
                }
            }

            result
        })
        .collect()
}

impl PlanResult {
    pub fn new(discs: Vec<DiscPlanResult>, guide_diagnostics: Vec<GuideDiagnostic>, total_time: Duration) -> Self {
        let mut result = Self {
            generated_at: Utc::now(),
            total: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            total_time,
            guide_diagnostics,
            discs,
        };
        result.recount();
        result
    }

    fn recount(&mut self) {
        self.total = self.discs.len();
        self.successful = self
            .discs
            .iter()
            .filter(|disc| matches!(disc.status, PlanStatus::Planned | PlanStatus::Executed))
            .count();
        self.failed = self.discs.iter().filter(|disc| disc.status == PlanStatus::Failed).count();
        self.skipped = self.discs.iter().filter(|disc| disc.status == PlanStatus::Skipped).count();
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::{Chapter, DiscChapterInfo};
    use crate::episodes::{Disc, Episode, Part, SpecialFlags};
    use crate::subtitles::EpisodeTiming;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn settings() -> MuxSettings {
        MuxSettings {
            mkvmerge: "mkvmerge".to_string(),
            mkvpropedit: "mkvpropedit".to_string(),
            series_name: "Case Closed".to_string(),
            temp_dir: PathBuf::from("split"),
            output_dir: PathBuf::from("out"),
        }
    }

    fn catalog() -> PartCatalog {
        let episode = |n: &str| Episode::new(n, format!("Episode {}", n), SpecialFlags::default());
        let mut discs = BTreeMap::new();
        discs.insert(1, Disc::new(vec![episode("1"), episode("2")]));
        discs.insert(2, Disc::new(vec![episode("3"), episode("4")]));
        discs.insert(3, Disc::new(vec![episode("5")]));
        let mut parts = BTreeMap::new();
        parts.insert(1, Part::new(discs));
        PartCatalog::new(parts)
    }

    fn chapters(source: &str, ends: &[u64]) -> DiscChapterInfo {
        let mut start = 0;
        let list = ends
            .iter()
            .enumerate()
            .map(|(i, &end)| {
                let chapter = Chapter::new(i as u32 + 1, "c", Duration::from_secs(start), Duration::from_secs(end));
                start = end;
                chapter
            })
            .collect();
        DiscChapterInfo::new(source, list).unwrap()
    }

    #[test]
    fn test_plan_discs_statuses() {
        let mut cached = CachedDiscs::new();
        cached.insert(DiscKey::new(1, 1), chapters("a.mkv", &[10, 20, 35, 50]));
        cached.insert(DiscKey::new(1, 3), chapters("c.mkv", &[600, 1300]));

        let mut timings = EpisodeTimings::default();
        timings.insert("1", EpisodeTiming::new(Duration::ZERO, Duration::from_secs(19), PathBuf::from("1.srt")));
        timings.insert("2", EpisodeTiming::new(Duration::ZERO, Duration::from_secs(15), PathBuf::from("2.srt")));

        let discs = plan_discs(&catalog(), &cached, &timings, &settings());
        let result = PlanResult::new(discs, Vec::new(), Duration::ZERO);

        assert_eq!(result.total, 3);
        assert_eq!(result.successful, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);

        let first = &result.discs[0];
        assert_eq!(first.status, PlanStatus::Planned);
        assert_eq!(first.source_file.as_deref(), Some("a.mkv"));
        assert_eq!(first.assignments.len(), 2);
        assert_eq!(first.assignments[1].chapter_end, 3);
        let commands = first.commands.as_ref().unwrap();
        assert_eq!(commands.split.args[3], "chapters:1,3,4");

        assert_eq!(result.discs[1].status, PlanStatus::Skipped);

        let single = &result.discs[2];
        assert_eq!(single.status, PlanStatus::Planned);
        assert_eq!(single.assignments[0].chapter_end, 3);
    }

    #[test]
    fn test_missing_timing_fails_only_that_disc() {
        let mut cached = CachedDiscs::new();
        cached.insert(DiscKey::new(1, 1), chapters("a.mkv", &[10, 20]));
        cached.insert(DiscKey::new(1, 3), chapters("c.mkv", &[600]));

        let discs = plan_discs(&catalog(), &cached, &EpisodeTimings::default(), &settings());
        let result = PlanResult::new(discs, Vec::new(), Duration::ZERO);

        assert_eq!(result.failed, 1);
        assert_eq!(result.successful, 1);
        assert!(result.discs[0].error_message.as_deref().unwrap().contains("episode 1"));
    }

    #[test]
    fn test_plan_result_serializes() {
        let result = PlanResult::new(Vec::new(), Vec::new(), Duration::from_millis(5));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total"], 0);
        assert!(json["generated_at"].is_string());
    }
}
