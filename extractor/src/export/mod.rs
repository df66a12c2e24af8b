pub mod deck;
pub mod layout;
pub mod names;
pub mod pdf;

use slidereel_common::frame::Frame;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub use deck::DeckExporter;
pub use pdf::PdfExporter;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no slides to export")]
    EmptySequence,
    #[error("failed to create directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
    #[error("failed to encode slide: {0}")]
    Encode(String),
    #[error("failed to serialize {0}: {1}")]
    Serialize(String, String),
    #[error("failed to spawn {0}: {1}")]
    Spawn(String, String),
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// A retained slide written to disk.
#[derive(Debug, Clone)]
pub struct SavedSlide {
    /// 1-based position in the deck.
    pub index: usize,
    pub path: PathBuf,
    pub seq: u64,
    pub pts: Option<Duration>,
    pub width: u32,
    pub height: u32,
}

/// Consumer of the final, ordered slide sequence.
#[allow(async_fn_in_trait)]
pub trait Exporter {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Write the artifact and return its path. Fails on an empty sequence.
    async fn export(&self, slides: &[SavedSlide]) -> Result<PathBuf, ExportError>;
}

/// Writes retained frames into a directory in retention order.
pub struct SlideWriter {
    dir: PathBuf,
    slides: Vec<SavedSlide>,
}

impl SlideWriter {
    pub async fn create(dir: &Path) -> Result<Self, ExportError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ExportError::CreateDir(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            slides: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `frame` unchanged (encoded frames are written byte for byte).
    pub async fn save(
        &mut self,
        frame: &Frame,
        width: u32,
        height: u32,
    ) -> Result<&SavedSlide, ExportError> {
        let index = self.slides.len() + 1;
        let path = self
            .dir
            .join(names::slide_file_name(index, frame.pts, frame.extension()));
        let bytes = frame
            .to_file_bytes()
            .map_err(|e| ExportError::Encode(e.to_string()))?;
        tokio::fs::write(&path, bytes.as_ref())
            .await
            .map_err(|e| ExportError::Write(path.display().to_string(), e))?;

        debug!(index, seq = frame.seq, path = %path.display(), "slide saved");
        self.slides.push(SavedSlide {
            index,
            path,
            seq: frame.seq,
            pts: frame.pts,
            width,
            height,
        });
        Ok(&self.slides[index - 1])
    }

    pub fn slides(&self) -> &[SavedSlide] {
        &self.slides
    }

    pub fn into_slides(self) -> Vec<SavedSlide> {
        self.slides
    }
}

#[cfg(test)]
pub(crate) fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slidereel-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
