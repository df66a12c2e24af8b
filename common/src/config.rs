use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Largest meaningful Hamming distance between two 64-bit fingerprints.
pub const MAX_HAMMING_THRESHOLD: u32 = 64;

/// Upper bound for `start_secs`/`end_secs` (one year).
pub const MAX_WINDOW_SECS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// yt-dlp format selector.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_downloader")]
    pub downloader: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// ffmpeg scene score a frame must exceed to become a candidate.
    /// Lower values are more sensitive and yield more candidates.
    #[serde(default = "default_scene_threshold")]
    pub scene_threshold: f64,
    #[serde(default)]
    pub crop: Option<CropRegion>,
    #[serde(default)]
    pub start_secs: Option<f64>,
    #[serde(default)]
    pub end_secs: Option<f64>,
    /// Caps the rate at which decoded frames are scored.
    #[serde(default)]
    pub max_fps: Option<f64>,
    /// ffmpeg `-q:v` for the emitted JPEGs (2 = best, 31 = worst).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_hamming_threshold")]
    pub hamming_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub pdf: bool,
    #[serde(default = "default_true")]
    pub deck: bool,
    #[serde(default = "default_pdf_command")]
    pub pdf_command: String,
    /// img2pdf page size (e.g. "A4^T"). Pages use the native image size when unset.
    #[serde(default)]
    pub page_size: Option<String>,
    /// External writer that turns `deck.json` into a presentation file,
    /// run as `<command> deck.json -o slides.pptx`. Only the manifest is
    /// written when unset.
    #[serde(default)]
    pub deck_command: Option<String>,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Rectangle cut out of every frame before scene scoring, in ffmpeg's
/// `w:h:x:y` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropRegion {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

impl CropRegion {
    /// Filter expression for ffmpeg's `crop` filter.
    pub fn to_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for CropRegion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() != 2 && parts.len() != 4 {
            return Err(ConfigError::InvalidCrop(s.to_string()));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ConfigError::InvalidCrop(s.to_string()))?;
        }
        Ok(Self {
            width: values[0],
            height: values[1],
            x: values[2],
            y: values[3],
        })
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            format: default_format(),
            downloader: default_downloader(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            scene_threshold: default_scene_threshold(),
            crop: None,
            start_secs: None,
            end_secs: None,
            max_fps: None,
            jpeg_quality: default_jpeg_quality(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: default_hamming_threshold(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            pdf: true,
            deck: true,
            pdf_command: default_pdf_command(),
            page_size: None,
            deck_command: None,
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Reject out-of-range values before any frame is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup.hamming_threshold > MAX_HAMMING_THRESHOLD {
            return Err(ConfigError::InvalidThreshold(self.dedup.hamming_threshold));
        }

        let sampler = &self.sampler;
        if !(sampler.scene_threshold > 0.0 && sampler.scene_threshold <= 1.0) {
            return Err(ConfigError::InvalidSceneThreshold(sampler.scene_threshold));
        }
        if !(2..=31).contains(&sampler.jpeg_quality) {
            return Err(ConfigError::InvalidJpegQuality(sampler.jpeg_quality));
        }
        if let Some(crop) = sampler.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(ConfigError::InvalidCrop(crop.to_string()));
            }
        }
        if let Some(fps) = sampler.max_fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(ConfigError::InvalidFps(fps));
            }
        }
        if let Some(start) = sampler.start_secs {
            if !(start.is_finite() && (0.0..=MAX_WINDOW_SECS).contains(&start)) {
                return Err(ConfigError::InvalidWindow(format!(
                    "start {start} is outside 0..={MAX_WINDOW_SECS}"
                )));
            }
        }
        if let Some(end) = sampler.end_secs {
            if !(end.is_finite() && end > 0.0 && end <= MAX_WINDOW_SECS) {
                return Err(ConfigError::InvalidWindow(format!(
                    "end {end} is outside (0, {MAX_WINDOW_SECS}]"
                )));
            }
        }
        if let (Some(start), Some(end)) = (sampler.start_secs, sampler.end_secs) {
            if end <= start {
                return Err(ConfigError::InvalidWindow(format!(
                    "end {end} is not after start {start}"
                )));
            }
        }

        if self.export.canvas_width == 0 || self.export.canvas_height == 0 {
            return Err(ConfigError::InvalidCanvas(
                self.export.canvas_width,
                self.export.canvas_height,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("hamming threshold {0} is outside 0..={MAX_HAMMING_THRESHOLD}")]
    InvalidThreshold(u32),
    #[error("scene threshold {0} is outside (0, 1]")]
    InvalidSceneThreshold(f64),
    #[error("jpeg quality {0} is outside 2..=31")]
    InvalidJpegQuality(u32),
    #[error("invalid crop region {0:?}, expected W:H[:X:Y] with non-zero size")]
    InvalidCrop(String),
    #[error("max fps must be positive, got {0}")]
    InvalidFps(f64),
    #[error("invalid time window: {0}")]
    InvalidWindow(String),
    #[error("invalid deck canvas {0}x{1}")]
    InvalidCanvas(u32, u32),
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_format() -> String {
    "bestvideo[height<=1080]/best".into()
}
fn default_downloader() -> String {
    "yt-dlp".into()
}
fn default_scene_threshold() -> f64 {
    0.3
}
fn default_jpeg_quality() -> u32 {
    2
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_hamming_threshold() -> u32 {
    6
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("slides")
}
fn default_true() -> bool {
    true
}
fn default_pdf_command() -> String {
    "img2pdf".into()
}
fn default_canvas_width() -> u32 {
    1280
}
fn default_canvas_height() -> u32 {
    720
}
fn default_log_level() -> String {
    "info".into()
}
