//! External media resolution
//!
//! Turns a search term or URL into a downloaded audio file by running a
//! yt-dlp compatible program as a child process.

use crate::error::ResolutionError;
use async_trait::async_trait;
use beabot_common::config::AcquisitionConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Downloaded audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// Resolves queries that are not in the local library
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Download the best audio match for `query` into `dest_dir`
    async fn resolve(&self, query: &str, dest_dir: &Path) -> Result<ResolvedMedia, ResolutionError>;

    /// Entry URLs of the playlist at `url`, in playlist order
    async fn expand_playlist(&self, url: &str) -> Result<Vec<String>, ResolutionError>;
}

/// [`MediaResolver`] backed by the yt-dlp command line
pub struct YtDlpResolver {
    program: String,
    ffmpeg_path: Option<PathBuf>,
    audio_format: String,
    audio_quality: String,
}

impl YtDlpResolver {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            program: config.resolver_program.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            audio_format: config.audio_format.clone(),
            audio_quality: config.audio_quality.clone(),
        }
    }

    fn download_args(&self, query: &str, dest_dir: &Path) -> Vec<String> {
        let template = dest_dir.join("%(title)s_%(id)s.%(ext)s");
        let mut args = vec![
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--default-search".to_string(),
            "ytsearch".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.audio_format.clone(),
            "--audio-quality".to_string(),
            format!("{}K", self.audio_quality),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--print".to_string(),
            "after_move:%(title)s\t%(filepath)s".to_string(),
        ];
        if let Some(ref ffmpeg) = self.ffmpeg_path {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }
        args.push("--".to_string());
        args.push(query.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<String, ResolutionError> {
        debug!("Running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Abandoned resolutions (timeout) must not leave the child running
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolutionError::Download(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            warn!("{} exited with {}: {}", self.program, output.status, message);
            return Err(ResolutionError::Download(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, dest_dir: &Path) -> Result<ResolvedMedia, ResolutionError> {
        let stdout = self.run(&self.download_args(query, dest_dir)).await?;
        parse_download_output(&stdout).ok_or_else(|| ResolutionError::NotFound(query.to_string()))
    }

    async fn expand_playlist(&self, url: &str) -> Result<Vec<String>, ResolutionError> {
        let args = [
            "--flat-playlist".to_string(),
            "--print".to_string(),
            "url".to_string(),
            "--".to_string(),
            url.to_string(),
        ];
        let stdout = self.run(&args).await?;
        let urls: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != "NA")
            .map(str::to_string)
            .collect();

        if urls.is_empty() {
            return Err(ResolutionError::NotFound(url.to_string()));
        }
        Ok(urls)
    }
}

/// Last `title<TAB>path` line printed after the audio was extracted
fn parse_download_output(stdout: &str) -> Option<ResolvedMedia> {
    stdout.lines().rev().find_map(|line| {
        let (title, path) = line.trim_end().split_once('\t')?;
        if path.is_empty() {
            return None;
        }
        Some(ResolvedMedia {
            path: PathBuf::from(path),
            title: title.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_output() {
        let stdout = "[debug] noise\nSome Song\t/cache/.partial-1/Some Song_abc.mp3\n";
        let media = parse_download_output(stdout).unwrap();
        assert_eq!(media.title, "Some Song");
        assert_eq!(media.path, PathBuf::from("/cache/.partial-1/Some Song_abc.mp3"));
    }

    #[test]
    fn test_parse_download_output_without_result() {
        assert!(parse_download_output("").is_none());
        assert!(parse_download_output("just a line\n").is_none());
        assert!(parse_download_output("title\t\n").is_none());
    }

    #[test]
    fn test_download_args() {
        let config = AcquisitionConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg")),
            ..Default::default()
        };
        let resolver = YtDlpResolver::new(&config);
        let args = resolver.download_args("never gonna", Path::new("/tmp/dl"));

        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--audio-quality", "192K"]));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/opt/ffmpeg"]));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "never gonna");
    }

    #[tokio::test]
    async fn test_missing_program_is_download_error() {
        let config = AcquisitionConfig {
            resolver_program: "beabot-definitely-missing-resolver".to_string(),
            ..Default::default()
        };
        let resolver = YtDlpResolver::new(&config);
        let dir = tempfile::TempDir::new().unwrap();

        let err = resolver.resolve("anything", dir.path()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Download(_)));
    }
}
