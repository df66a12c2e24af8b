use chrono::Utc;
use serde::Serialize;
use slidereel_common::config::{Config, ConfigError};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::export::names::run_dir_name;
use crate::export::{DeckExporter, ExportError, Exporter, PdfExporter, SavedSlide, SlideWriter};
use crate::filter::dedup::{DedupError, DedupStats, Deduplicator, Verdict};
use crate::sampler::{FfmpegSampler, FrameSource, SamplerError};
use crate::source::{video_stem, FetchError, VideoSource};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Dedup(#[from] DedupError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What one run produced, also written to `summary.json` in the run directory.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub video: PathBuf,
    pub run_dir: PathBuf,
    pub hamming_threshold: u32,
    pub scene_threshold: f64,
    pub stats: DedupStats,
    pub artifacts: Vec<PathBuf>,
}

/// Pull candidates from `source` one at a time, keep the ones that start a
/// new slide and save them through `writer`, in input order.
pub async fn extract_slides<S: FrameSource>(
    source: &mut S,
    deduplicator: &mut Deduplicator,
    writer: &mut SlideWriter,
) -> Result<DedupStats, PipelineError> {
    while let Some(frame) = source.next_frame().await? {
        if let Verdict::Retained {
            distance,
            width,
            height,
        } = deduplicator.offer(&frame)
        {
            let slide = writer.save(&frame, width, height).await?;
            info!(
                index = slide.index,
                seq = frame.seq,
                pts_secs = frame.pts.map(|t| t.as_secs_f64()),
                ?distance,
                "slide retained"
            );
        }
    }
    Ok(deduplicator.finish()?)
}

async fn export_with<E: Exporter>(
    exporter: &E,
    slides: &[SavedSlide],
) -> Result<PathBuf, ExportError> {
    info!(exporter = exporter.name(), slides = slides.len(), "exporting");
    exporter.export(slides).await
}

/// Run the whole tool: resolve the video, sample, deduplicate, export.
pub async fn run(input: &str, config: &Config) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let mut deduplicator = Deduplicator::new(config.dedup.hamming_threshold)?;

    let video = VideoSource::parse(input).resolve(&config.source).await?;
    let run_dir = config.export.output_dir.join(run_dir_name(
        &video_stem(&video),
        Utc::now().timestamp_millis(),
    ));

    info!(
        video = %video.display(),
        run_dir = %run_dir.display(),
        hamming_threshold = deduplicator.threshold(),
        scene_threshold = config.sampler.scene_threshold,
        "extracting slides"
    );

    let mut sampler = FfmpegSampler::start(&video, &config.sampler).await?;
    let mut writer = SlideWriter::create(&run_dir).await?;
    let stats = match extract_slides(&mut sampler, &mut deduplicator, &mut writer).await {
        Ok(stats) => stats,
        Err(e) => {
            if writer.slides().is_empty() {
                // Only removes the directory if nothing was written
                let _ = tokio::fs::remove_dir(writer.dir()).await;
            }
            return Err(e);
        }
    };
    let slides = writer.into_slides();

    let mut artifacts = Vec::new();
    if config.export.pdf {
        let exporter = PdfExporter::new(
            config.export.pdf_command.clone(),
            config.export.page_size.clone(),
            run_dir.join("slides.pdf"),
        );
        artifacts.push(export_with(&exporter, &slides).await?);
    }
    if config.export.deck {
        let mut exporter = DeckExporter::new(
            config.export.canvas_width,
            config.export.canvas_height,
            run_dir.join("deck.json"),
        );
        if let Some(command) = &config.export.deck_command {
            exporter = exporter.with_writer(command.clone(), run_dir.join("slides.pptx"));
        }
        artifacts.push(export_with(&exporter, &slides).await?);
    }

    let summary = RunSummary {
        video,
        run_dir,
        hamming_threshold: deduplicator.threshold(),
        scene_threshold: config.sampler.scene_threshold,
        stats,
        artifacts,
    };
    write_summary(&summary).await;

    info!(
        candidates = stats.candidates,
        unreadable = stats.unreadable,
        duplicates = stats.duplicates,
        slides = stats.retained,
        run_dir = %summary.run_dir.display(),
        "run complete"
    );
    Ok(summary)
}

async fn write_summary(summary: &RunSummary) {
    let path = summary.run_dir.join("summary.json");
    let json = match serde_json::to_vec_pretty(summary) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize run summary");
            return;
        }
    };
    if let Err(e) = tokio::fs::write(&path, json).await {
        warn!(path = %path.display(), error = %e, "failed to write run summary");
    }
}

/// Hint printed when a run finds nothing to keep.
pub fn suggestion(err: &PipelineError) -> Option<&'static str> {
    match err {
        PipelineError::Dedup(DedupError::NoCandidates) => Some(
            "no scene changes were detected; try a lower --scene value or check --start/--end/--crop",
        ),
        PipelineError::Dedup(DedupError::NoReadableCandidates { .. }) => {
            Some("ffmpeg produced frames that could not be decoded; check the input video")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_dir;
    use image::{DynamicImage, GrayImage, Luma};
    use slidereel_common::frame::Frame;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct VecSource(VecDeque<Frame>);

    impl FrameSource for VecSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>, SamplerError> {
            Ok(self.0.pop_front())
        }
    }

    fn frame(bits: u64, seq: u64) -> Frame {
        let img = GrayImage::from_fn(8, 8, |x, y| {
            if bits & (1 << (y * 8 + x)) != 0 {
                Luma([220])
            } else {
                Luma([30])
            }
        });
        Frame::decoded(
            DynamicImage::ImageLuma8(img),
            seq,
            Some(Duration::from_secs(seq * 2)),
        )
    }

    #[tokio::test]
    async fn saves_new_slides_in_order() {
        let dir = test_dir("pipeline");
        let a = 0xFFFF_0000_FFFF_0000;
        let b = 0x00FF_00FF_00FF_00FF;
        let mut source = VecSource(
            [frame(a, 0), frame(a, 1), frame(b, 2), frame(b, 3), frame(a, 4)].into(),
        );
        let mut dedup = Deduplicator::new(6).unwrap();
        let mut writer = SlideWriter::create(&dir).await.unwrap();

        let stats = extract_slides(&mut source, &mut dedup, &mut writer).await.unwrap();
        assert_eq!(stats.candidates, 5);
        assert_eq!(stats.retained, 3);
        assert_eq!(stats.duplicates, 2);

        let seqs: Vec<u64> = writer.slides().iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![0, 2, 4]);
        for slide in writer.slides() {
            assert!(slide.path.is_file());
            assert_eq!((slide.width, slide.height), (8, 8));
        }

        let deck = DeckExporter::new(1280, 720, dir.join("deck.json"));
        deck.export(writer.slides()).await.unwrap();
        assert!(dir.join("deck.json").is_file());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn empty_source_is_no_candidates() {
        let dir = test_dir("pipeline-empty");
        let mut source = VecSource(VecDeque::new());
        let mut dedup = Deduplicator::new(6).unwrap();
        let mut writer = SlideWriter::create(&dir).await.unwrap();

        let err = extract_slides(&mut source, &mut dedup, &mut writer)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Dedup(DedupError::NoCandidates)));
        assert!(suggestion(&err).is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn sampler_spawn_failure_leaves_no_run_dir() {
        let dir = test_dir("pipeline-spawn");
        std::fs::create_dir_all(&dir).unwrap();
        let video = dir.join("talk.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let mut config = Config::default();
        config.sampler.ffmpeg = "slidereel-no-such-ffmpeg".into();
        config.export.output_dir = dir.join("out");

        let err = run(&video.display().to_string(), &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sampler(SamplerError::Spawn(_))));
        assert!(!config.export.output_dir.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn invalid_config_rejected_before_sampling() {
        let mut config = Config::default();
        config.dedup.hamming_threshold = 100;
        let err = run("missing.mp4", &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::InvalidThreshold(100))));
    }
}
