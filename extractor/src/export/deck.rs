use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use super::layout::{canvas_height_emu, fit_centered, EmuRect, Placement, DECK_WIDTH_EMU};
use super::{ExportError, Exporter, SavedSlide};

#[derive(Debug, Serialize)]
pub struct Deck {
    pub canvas: Canvas,
    pub slides: Vec<DeckSlide>,
}

#[derive(Debug, Serialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub width_emu: i64,
    pub height_emu: i64,
}

#[derive(Debug, Serialize)]
pub struct DeckSlide {
    pub index: usize,
    /// Image path relative to the manifest.
    pub image: String,
    pub seq: u64,
    pub pts_secs: Option<f64>,
    pub image_width: u32,
    pub image_height: u32,
    pub placement: Placement,
    pub placement_emu: EmuRect,
}

/// Lays slides out on a fixed 16:9 canvas, one image per page, each
/// centered and scaled to fit, and writes the layout as `deck.json`.
///
/// With a writer configured, the manifest is then handed to that command to
/// produce the presentation file.
pub struct DeckExporter {
    canvas_width: u32,
    canvas_height: u32,
    output: PathBuf,
    writer: Option<(String, PathBuf)>,
}

impl DeckExporter {
    pub fn new(canvas_width: u32, canvas_height: u32, output: PathBuf) -> Self {
        Self {
            canvas_width,
            canvas_height,
            output,
            writer: None,
        }
    }

    /// Run `command <manifest> -o <presentation>` after writing the manifest.
    pub fn with_writer(mut self, command: impl Into<String>, presentation: PathBuf) -> Self {
        self.writer = Some((command.into(), presentation));
        self
    }

    pub fn writer_args(&self, presentation: &Path) -> Vec<String> {
        vec![
            self.output.display().to_string(),
            "-o".into(),
            presentation.display().to_string(),
        ]
    }

    async fn run_writer(&self, command: &str, presentation: &Path) -> Result<(), ExportError> {
        let output = Command::new(command)
            .args(self.writer_args(presentation))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExportError::Spawn(command.to_string(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(program = command, stderr = %stderr, "deck writer exited with error");
            let _ = tokio::fs::remove_file(presentation).await;
            return Err(ExportError::ToolFailed {
                program: command.to_string(),
                status: output.status.to_string(),
                stderr: stderr.into_owned(),
            });
        }
        Ok(())
    }

    pub fn build(&self, slides: &[SavedSlide]) -> Deck {
        let base = self.output.parent().unwrap_or_else(|| Path::new(""));
        let slides = slides
            .iter()
            .map(|s| {
                let placement =
                    fit_centered(s.width, s.height, self.canvas_width, self.canvas_height);
                let image = s.path.strip_prefix(base).unwrap_or(&s.path);
                DeckSlide {
                    index: s.index,
                    image: image.display().to_string(),
                    seq: s.seq,
                    pts_secs: s.pts.map(|t| t.as_secs_f64()),
                    image_width: s.width,
                    image_height: s.height,
                    placement,
                    placement_emu: placement.to_emu(self.canvas_width),
                }
            })
            .collect();

        Deck {
            canvas: Canvas {
                width: self.canvas_width,
                height: self.canvas_height,
                width_emu: DECK_WIDTH_EMU,
                height_emu: canvas_height_emu(self.canvas_width, self.canvas_height),
            },
            slides,
        }
    }
}

impl Exporter for DeckExporter {
    fn name(&self) -> &str {
        "deck"
    }

    async fn export(&self, slides: &[SavedSlide]) -> Result<PathBuf, ExportError> {
        if slides.is_empty() {
            return Err(ExportError::EmptySequence);
        }

        let deck = self.build(slides);
        let json = serde_json::to_vec_pretty(&deck)
            .map_err(|e| ExportError::Serialize(self.output.display().to_string(), e.to_string()))?;
        tokio::fs::write(&self.output, json)
            .await
            .map_err(|e| ExportError::Write(self.output.display().to_string(), e))?;

        info!(
            slides = deck.slides.len(),
            canvas = %format!("{}x{}", self.canvas_width, self.canvas_height),
            path = %self.output.display(),
            "deck written"
        );

        match &self.writer {
            Some((command, presentation)) => {
                self.run_writer(command, presentation).await?;
                info!(path = %presentation.display(), "presentation written");
                Ok(presentation.clone())
            }
            None => Ok(self.output.clone()),
        }
    }
}
