use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use super::{ExportError, Exporter, SavedSlide};

/// Builds a PDF with one page per slide using `img2pdf`.
///
/// img2pdf embeds JPEGs without re-encoding. Pages take the native image
/// size unless a page size is configured, in which case each image is
/// scaled into the page and centered.
pub struct PdfExporter {
    command: String,
    page_size: Option<String>,
    output: PathBuf,
}

impl PdfExporter {
    pub fn new(command: impl Into<String>, page_size: Option<String>, output: PathBuf) -> Self {
        Self {
            command: command.into(),
            page_size,
            output,
        }
    }

    pub fn args(&self, slides: &[SavedSlide]) -> Vec<String> {
        let mut args: Vec<String> = slides
            .iter()
            .map(|s| s.path.display().to_string())
            .collect();
        if let Some(size) = &self.page_size {
            args.extend(["--pagesize".into(), size.clone(), "--fit".into(), "into".into()]);
        }
        args.push("-o".into());
        args.push(self.output.display().to_string());
        args
    }
}

impl Exporter for PdfExporter {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn export(&self, slides: &[SavedSlide]) -> Result<PathBuf, ExportError> {
        if slides.is_empty() {
            return Err(ExportError::EmptySequence);
        }

        let output = Command::new(&self.command)
            .args(self.args(slides))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExportError::Spawn(self.command.clone(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "img2pdf exited with error");
            // Don't leave a truncated PDF behind
            let _ = tokio::fs::remove_file(&self.output).await;
            return Err(ExportError::ToolFailed {
                program: self.command.clone(),
                status: output.status.to_string(),
                stderr: stderr.into_owned(),
            });
        }

        info!(
            pages = slides.len(),
            path = %self.output.display(),
            "PDF written"
        );
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide(index: usize, name: &str) -> SavedSlide {
        SavedSlide {
            index,
            path: PathBuf::from("run").join(name),
            seq: index as u64,
            pts: None,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn pages_follow_slide_order() {
        let exporter = PdfExporter::new("img2pdf", None, PathBuf::from("run/slides.pdf"));
        let slides = [slide(1, "slide_0001.jpg"), slide(2, "slide_0002.jpg")];
        let args = exporter.args(&slides);
        let expected: Vec<String> = [
            PathBuf::from("run").join("slide_0001.jpg").display().to_string(),
            PathBuf::from("run").join("slide_0002.jpg").display().to_string(),
            "-o".to_string(),
            "run/slides.pdf".to_string(),
        ]
        .to_vec();
        assert_eq!(args, expected);
    }

    #[test]
    fn page_size_letterboxes() {
        let exporter = PdfExporter::new(
            "img2pdf",
            Some("A4^T".into()),
            PathBuf::from("out.pdf"),
        );
        let args = exporter.args(&[slide(1, "a.jpg")]);
        assert!(args.windows(2).any(|w| w[0] == "--pagesize" && w[1] == "A4^T"));
        assert!(args.windows(2).any(|w| w[0] == "--fit" && w[1] == "into"));
    }

    #[tokio::test]
    async fn empty_sequence_fails_loudly() {
        let exporter = PdfExporter::new("img2pdf", None, PathBuf::from("never.pdf"));
        assert!(matches!(
            exporter.export(&[]).await,
            Err(ExportError::EmptySequence)
        ));
    }
}
