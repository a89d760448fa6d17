use async_trait::async_trait;
use disc_episode_splitter::chapters::cache;
use disc_episode_splitter::processing::PlanStatus;
use disc_episode_splitter::{ConfigBuilder, DiscKey, InspectionTool, SplitPlanner, ToolError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Serves canned `mkvinfo` output keyed by the disc directory name
struct FakeInspector {
    outputs: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeInspector {
    fn new(outputs: &[(&str, String)]) -> Self {
        Self {
            outputs: outputs.iter().map(|(dir, text)| (dir.to_string(), text.clone())).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InspectionTool for FakeInspector {
    async fn inspect(&self, media_file: &Path) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = media_file
            .parent()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.outputs.get(&dir).cloned().ok_or_else(|| ToolError::Failed {
            program: "mkvinfo".to_string(),
            target: media_file.display().to_string(),
            status: "exit status: 2".to_string(),
            stderr: "not a Matroska file".to_string(),
        })
    }
}

fn timestamp(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}.000000000", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `mkvinfo`-style output with one video, one audio track and back-to-back chapters
fn mkvinfo_output(chapter_ends: &[u64]) -> String {
    let mut text = String::from(
        "+ EBML head\n\
         + Segment: size 1234567\n\
         |+ Segment information\n\
         | + Timestamp scale: 1000000\n\
         |+ Tracks\n\
         | + Track\n\
         |  + Track number: 1 (track ID for mkvmerge & mkvextract: 0)\n\
         |  + Track type: video\n\
         |  + Codec ID: V_MPEG2\n\
         |  + Language: jpn\n\
         | + Track\n\
         |  + Track number: 2 (track ID for mkvmerge & mkvextract: 1)\n\
         |  + Track type: audio\n\
         |  + Codec ID: A_AC3\n\
         |  + Language: jpn\n\
         |+ EBML void: size 44\n\
         |+ Chapters\n\
         | + Edition entry\n",
    );

    let mut start = 0;
    for (i, &end) in chapter_ends.iter().enumerate() {
        text.push_str("|  + Chapter atom\n");
        text.push_str(&format!("|   + Chapter time start: {}\n", timestamp(start)));
        text.push_str(&format!("|   + Chapter time end: {}\n", timestamp(end)));
        text.push_str("|   + Chapter display\n");
        text.push_str(&format!("|    + Chapter string: Chapter {:02}\n", i + 1));
        start = end;
    }
    text.push_str("|+ Cluster\n");
    text
}

fn srt(last_cue_end: &str) -> String {
    format!(
        "1\n00:00:04,000 --> 00:00:06,500\nHello\n\n2\n00:10:00,000 --> 00:10:02,000\nMiddle\n\n3\n{} --> {}\nBye\n",
        "00:20:00,000", last_cue_end
    )
}

struct Fixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        let guide_row = |n: &str, title: &str| format!("{0}\t{0}\t{1}\t1996-01-08\t2003-05-24\t\t\t\t\n", n, title);
        let mut guide = String::from("Episode\tIntl\tTitle\tOriginal\tEnglish\tA\tB\tC\tD\n");
        guide.push_str(&guide_row("1", "Roller Coaster Murder Case (1 Hour Special)"));
        guide.push_str(&guide_row("1", "Roller Coaster Murder Case (Remastered)"));
        guide.push_str(&guide_row("2", "Company President's Daughter Kidnapping Case"));
        guide.push_str(&guide_row("2", "Company President's Daughter Kidnapping Case (Rerun)"));
        guide.push_str(&guide_row("3", "Idol's Secret Murder Case"));
        guide.push_str(&guide_row("4", "Coded Mail Murder Case"));
        std::fs::write(root.join("EpisodeGuide.csv"), guide).unwrap();

        std::fs::write(
            root.join("manifest.csv"),
            "Part,Disc,Episode,Title\n\
             1,1,1,Roller Coaster Murder Case\n\
             1,1,2,Company President's Daughter Kidnapping Case\n\
             1,2,3,Idol's Secret Murder Case\n\
             1,3,4,Coded Mail Murder Case\n",
        )
        .unwrap();

        let subtitles = root.join("subtitles");
        std::fs::create_dir_all(&subtitles).unwrap();
        std::fs::write(subtitles.join("001.srt"), srt("00:21:30,000")).unwrap();
        std::fs::write(subtitles.join("002.srt"), srt("00:21:20,000")).unwrap();

        for dir in ["1-1", "1-2-DragonMax", "1-3"] {
            let disc_dir = root.join("rips").join(dir);
            std::fs::create_dir_all(&disc_dir).unwrap();
            std::fs::write(disc_dir.join("title_t00.mkv"), vec![0u8; 128]).unwrap();
            std::fs::write(disc_dir.join("title_t01.mkv"), vec![0u8; 16]).unwrap();
        }

        Self { _temp_dir: temp_dir, root }
    }

    fn config(&self) -> disc_episode_splitter::Config {
        ConfigBuilder::new()
            .with_workers(2)
            .with_episode_guide(self.root.join("EpisodeGuide.csv"))
            .with_disc_manifest(self.root.join("manifest.csv"))
            .with_subtitles_dir(self.root.join("subtitles"))
            .with_rips_dir(self.root.join("rips"))
            .with_cache_path(self.root.join("ChaptersPerDisc.csv"))
            .with_series_name("Case Closed")
            .with_temp_dir(self.root.join("split"))
            .with_output_dir(self.root.join("out"))
            .with_plan_file(self.root.join("plan").join("split-plan.json"))
            .with_script_file(self.root.join("split.sh"))
            .build()
    }
}

fn inspector() -> Arc<FakeInspector> {
    Arc::new(FakeInspector::new(&[
        // Episode 1 ends at 21:30 → chapter 2 (ends 1300s); episode 2 ends at
        // 1300 + 1280 = 2580s → chapter 4; chapter 5 is left over.
        ("1-1", mkvinfo_output(&[60, 1300, 1330, 2600, 2630])),
        ("1-2-DragonMax", mkvinfo_output(&[700, 1400])),
    ]))
}

#[tokio::test]
async fn test_full_plan_from_rips() {
    let fixture = Fixture::new();
    let fake = inspector();
    let planner = SplitPlanner::new(fixture.config(), fake.clone());

    let result = planner.run(false).await.unwrap();

    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.total, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
    assert!(result.guide_diagnostics.is_empty());

    let first = &result.discs[0];
    assert_eq!((first.part, first.disc), (1, 1));
    assert_eq!(first.status, PlanStatus::Planned);
    let ranges: Vec<(u32, u32)> = first.assignments.iter().map(|a| (a.chapter_start, a.chapter_end)).collect();
    assert_eq!(ranges, vec![(1, 2), (3, 4)]);
    assert_eq!(first.diagnostics.len(), 1);
    assert!(first.source_file.as_deref().unwrap().ends_with("title_t00.mkv"));

    let single = &result.discs[1];
    assert_eq!(single.assignments[0].chapter_end, 3);
    assert_eq!(single.assignments[0].episode_number, "3");

    assert_eq!(result.discs[2].status, PlanStatus::Skipped);

    // Cache written once, in milliseconds
    let cache_text = std::fs::read_to_string(fixture.root.join("ChaptersPerDisc.csv")).unwrap();
    assert!(cache_text.starts_with("#chapter-cache unit=ms"));
    let cached = cache::deserialize(&cache_text).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[&DiscKey::new(1, 1)].len(), 5);

    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture.root.join("plan").join("split-plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["successful"], 2);
    assert_eq!(plan["discs"][0]["diagnostics"][0]["kind"], "trailing_chapters");

    let script = std::fs::read_to_string(fixture.root.join("split.sh")).unwrap();
    assert!(script.contains("--split chapters:1,3,5 "));
    assert!(script.contains("Case Closed - 1 - Roller Coaster Murder Case.mkv"));
    assert!(script.contains("001.srt"));
}

#[tokio::test]
async fn test_existing_cache_is_reused() {
    let fixture = Fixture::new();
    let fake = inspector();

    SplitPlanner::new(fixture.config(), fake.clone()).run(false).await.unwrap();
    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);

    let again = SplitPlanner::new(fixture.config(), fake.clone()).plan().await.unwrap();
    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    assert_eq!(again.successful, 2);

    let mut config = fixture.config();
    config.cache.rebuild = true;
    SplitPlanner::new(config, fake.clone()).plan().await.unwrap();
    assert_eq!(fake.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_missing_subtitles_fail_the_disc() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.root.join("subtitles").join("002.srt")).unwrap();

    let result = SplitPlanner::new(fixture.config(), inspector()).plan().await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.discs[0].status, PlanStatus::Failed);
    assert!(result.discs[0].commands.is_none());
    assert_eq!(result.discs[1].status, PlanStatus::Planned);
}

#[tokio::test]
async fn test_unknown_manifest_episode_aborts() {
    let fixture = Fixture::new();
    std::fs::write(fixture.root.join("manifest.csv"), "Part,Disc,Episode,Title\n1,1,99,Missing\n").unwrap();

    let err = SplitPlanner::new(fixture.config(), inspector()).plan().await.unwrap_err();
    assert!(err.to_string().contains("99"));
}
