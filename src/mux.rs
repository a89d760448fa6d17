/// Split and remux command generation
///
/// A disc is first split at the start chapter of each episode with
/// `mkvmerge --split chapters:...`, which writes `output-001.mkv`,
/// `output-002.mkv`, ... in episode order. Chapters left over after the
/// last episode get a split point of their own so they never end up in the
/// last episode's piece. Each episode piece is then remuxed to its final
/// name together with the episode's subtitle file and retitled with
/// `mkvpropedit`.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

use crate::chapters::{ChapterToEpisodeInfo, DiscChapterInfo, DiscKey};
use crate::subtitles::TimingLookup;
use crate::video::ToolError;

/// Characters that cannot appear in file names on common filesystems
const INVALID_FILE_NAME_CHARS: &[char] = &['/', '\\', '?', '*', '"', '<', '>', '|'];

/// One external command, program plus arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl MuxCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// The command as a POSIX shell line
    pub fn to_shell(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion; a non-zero exit is an error
    pub async fn run(&self) -> Result<(), ToolError> {
        debug!("Running {}", self.to_shell());

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if message.is_empty() {
                // mkvmerge reports errors on stdout
                message = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(ToolError::Failed {
                program: self.program.clone(),
                target: self.args.last().cloned().unwrap_or_default(),
                status: output.status.to_string(),
                stderr: message,
            });
        }

        Ok(())
    }
}

impl fmt::Display for MuxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Programs and locations used to build the commands
#[derive(Debug, Clone)]
pub struct MuxSettings {
    pub mkvmerge: String,
    pub mkvpropedit: String,
    pub series_name: String,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl MuxSettings {
    /// Directory receiving the split pieces of one disc
    pub fn disc_temp_dir(&self, key: DiscKey) -> PathBuf {
        self.temp_dir.join(key.to_string())
    }
}

/// Final naming of one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOutput {
    pub episode_number: String,
    pub name: String,
    pub split_file: PathBuf,
    pub output_file: PathBuf,
    pub subtitle_file: Option<PathBuf>,
}

/// Every command needed for one disc, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscCommands {
    pub split: MuxCommand,
    pub episodes: Vec<EpisodeOutput>,
    pub remux: Vec<MuxCommand>,
}

impl DiscCommands {
    pub fn all(&self) -> impl Iterator<Item = &MuxCommand> {
        std::iter::once(&self.split).chain(self.remux.iter())
    }

    /// Execute in order, stopping at the first failure
    pub async fn execute(&self, settings: &MuxSettings, key: DiscKey) -> Result<(), ToolError> {
        for dir in [settings.disc_temp_dir(key), settings.output_dir.clone()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|source| ToolError::Spawn {
                program: format!("mkdir {}", dir.display()),
                source,
            })?;
        }

        for command in self.all() {
            command.run().await?;
        }

        info!("🎬 Disc {}: wrote {} episodes", key, self.episodes.len());
        Ok(())
    }
}

/// `<series> - <number> - <title>`
pub fn episode_name(series_name: &str, episode_number: &str, title: &str) -> String {
    format!("{} - {} - {}", series_name, episode_number, title)
}

/// Make `name` usable as a file name: `:` becomes `∶` (U+2236), other
/// reserved characters are dropped.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !INVALID_FILE_NAME_CHARS.contains(c))
        .map(|c| if c == ':' { '\u{2236}' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Build the split, remux and retitle commands for an aligned disc
pub fn disc_commands<T>(
    settings: &MuxSettings,
    key: DiscKey,
    chapters: &DiscChapterInfo,
    assignments: &[ChapterToEpisodeInfo],
    timings: &T,
) -> DiscCommands
where
    T: TimingLookup + ?Sized,
{
    let temp_dir = settings.disc_temp_dir(key);
    let source_file = Path::new(chapters.source_file());

    let mut split_points: Vec<u32> = assignments.iter().map(|a| a.chapter_start).collect();
    let last_chapter = chapters.last().map_or(0, |chapter| chapter.number);
    if let Some(trailing) = assignments
        .last()
        .map(|a| a.chapter_end + 1)
        .filter(|&next| next <= last_chapter)
    {
        split_points.push(trailing);
    }
    let split_points = split_points
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let split = MuxCommand::new(&settings.mkvmerge)
        .arg("--output")
        .path_arg(&temp_dir.join("output.mkv"))
        .arg("--split")
        .arg(format!("chapters:{}", split_points))
        .path_arg(source_file);

    let mut episodes = Vec::with_capacity(assignments.len());
    let mut remux = Vec::with_capacity(assignments.len() * 2);

    for (index, assignment) in assignments.iter().enumerate() {
        let name = episode_name(&settings.series_name, &assignment.episode_number, &assignment.episode_title);
        let split_file = temp_dir.join(format!("output-{:03}.mkv", index + 1));
        let output_file = settings
            .output_dir
            .join(format!("{}.mkv", sanitize_file_name(&name)));
        let subtitle_file = timings
            .timing(&assignment.episode_number)
            .map(|timing| timing.source_file.clone());

        let mut merge = MuxCommand::new(&settings.mkvmerge)
            .arg("-o")
            .path_arg(&output_file)
            .path_arg(&split_file);
        if let Some(subtitle_file) = &subtitle_file {
            merge = merge.path_arg(subtitle_file);
        }

        let retitle = MuxCommand::new(&settings.mkvpropedit)
            .path_arg(&output_file)
            .arg("-e")
            .arg("info")
            .arg("-s")
            .arg(format!("title={}", name));

        remux.push(merge);
        remux.push(retitle);
        episodes.push(EpisodeOutput {
            episode_number: assignment.episode_number.clone(),
            name,
            split_file,
            output_file,
            subtitle_file,
        });
    }

    DiscCommands { split, episodes, remux }
}

/// Render commands of every disc as a shell script
pub fn render_script<'a>(discs: impl IntoIterator<Item = (DiscKey, &'a DiscCommands)>) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");
    for (key, commands) in discs {
        script.push_str(&format!("\n# Disc {}\n", key));
        for command in commands.all() {
            script.push_str(&command.to_shell());
            script.push('\n');
        }
    }
    script
}

fn shell_quote(word: &str) -> String {
    let is_plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ',' | ':' | '=' | '+'));
    if is_plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
