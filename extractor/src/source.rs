use slidereel_common::config::SourceConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("input video not found: {0}")]
    MissingInput(String),
    #[error("failed to create download directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to spawn downloader: {0}")]
    Spawn(String),
    #[error("downloader exited with {status}: {stderr}")]
    DownloadFailed { status: String, stderr: String },
    #[error("downloader did not report an output file")]
    NoOutputPath,
}

/// Where the video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Url(String),
    File(PathBuf),
}

impl VideoSource {
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            VideoSource::Url(input.to_string())
        } else {
            VideoSource::File(PathBuf::from(input))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, VideoSource::Url(_))
    }

    /// Return a local path to the video, downloading it first if needed.
    pub async fn resolve(&self, config: &SourceConfig) -> Result<PathBuf, FetchError> {
        match self {
            VideoSource::File(path) => {
                if !path.is_file() {
                    return Err(FetchError::MissingInput(path.display().to_string()));
                }
                Ok(path.clone())
            }
            VideoSource::Url(url) => download(url, config).await,
        }
    }
}

/// Arguments for yt-dlp. `--print after_move:filepath` makes it write the
/// final file path to stdout once merging and renaming are done.
pub fn downloader_args(url: &str, config: &SourceConfig) -> Vec<String> {
    let template = config.download_dir.join("%(title).80s-%(id)s.%(ext)s");
    vec![
        "--no-playlist".into(),
        "--no-progress".into(),
        "--quiet".into(),
        "-f".into(),
        config.format.clone(),
        "-o".into(),
        template.display().to_string(),
        "--print".into(),
        "after_move:filepath".into(),
        url.into(),
    ]
}

async fn download(url: &str, config: &SourceConfig) -> Result<PathBuf, FetchError> {
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .map_err(|e| FetchError::CreateDir(config.download_dir.display().to_string(), e))?;

    info!(url, downloader = %config.downloader, "downloading video");

    let output = Command::new(&config.downloader)
        .args(downloader_args(url, config))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| FetchError::Spawn(e.to_string()))?;

    if !output.status.success() {
        return Err(FetchError::DownloadFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let path = last_reported_path(&String::from_utf8_lossy(&output.stdout))
        .ok_or(FetchError::NoOutputPath)?;
    debug!(path = %path.display(), "download finished");

    if !path.is_file() {
        return Err(FetchError::MissingInput(path.display().to_string()));
    }
    Ok(path)
}

/// The last non-empty line of the downloader's stdout.
fn last_reported_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}

/// File stem used to name the run directory.
pub fn video_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string())
}
