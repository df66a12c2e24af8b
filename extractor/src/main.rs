use clap::Parser;
use slidereel::source::VideoSource;
use slidereel::{pipeline, tools};
use slidereel_common::config::{Config, CropRegion};
use std::path::PathBuf;
use tracing::{error, info};

/// Turn a recorded talk into its unique slides.
#[derive(Parser, Debug)]
#[command(name = "slidereel")]
#[command(version)]
#[command(about = "Extract unique slides from a video into a PDF and a deck", long_about = None)]
struct Args {
    /// Video file path or URL
    input: String,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hamming distance (0-64) a frame must exceed to count as a new slide
    #[arg(short, long)]
    threshold: Option<u32>,

    /// ffmpeg scene-change threshold in (0, 1]; lower finds more candidates
    #[arg(short, long)]
    scene: Option<f64>,

    /// Crop region as W:H[:X:Y]
    #[arg(long)]
    crop: Option<CropRegion>,

    /// Start of the time window in seconds
    #[arg(long)]
    start: Option<f64>,

    /// End of the time window in seconds
    #[arg(long)]
    end: Option<f64>,

    /// Cap on the frame rate scored for scene changes
    #[arg(long)]
    fps: Option<f64>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the PDF
    #[arg(long)]
    no_pdf: bool,

    /// Skip the deck
    #[arg(long)]
    no_deck: bool,
}

impl Args {
    /// Command-line values win over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(t) = self.threshold {
            config.dedup.hamming_threshold = t;
        }
        if let Some(s) = self.scene {
            config.sampler.scene_threshold = s;
        }
        if self.crop.is_some() {
            config.sampler.crop = self.crop;
        }
        if self.start.is_some() {
            config.sampler.start_secs = self.start;
        }
        if self.end.is_some() {
            config.sampler.end_secs = self.end;
        }
        if self.fps.is_some() {
            config.sampler.max_fps = self.fps;
        }
        if let Some(dir) = &self.output {
            config.export.output_dir = dir.clone();
        }
        if self.no_pdf {
            config.export.pdf = false;
        }
        if self.no_deck {
            config.export.deck = false;
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        input = %args.input,
        hamming_threshold = config.dedup.hamming_threshold,
        scene_threshold = config.sampler.scene_threshold,
        output_dir = %config.export.output_dir.display(),
        "starting slidereel"
    );

    if VideoSource::parse(&args.input).is_remote() {
        tools::check_tool_available(&config.source.downloader, "--version", "downloading").await;
    }
    tools::check_tool_available(&config.sampler.ffmpeg, "-version", "frame sampling").await;
    if config.export.pdf {
        tools::check_tool_available(&config.export.pdf_command, "--version", "PDF export").await;
    }
    if let (true, Some(command)) = (config.export.deck, &config.export.deck_command) {
        tools::check_tool_available(command, "--version", "presentation export").await;
    }

    match pipeline::run(&args.input, &config).await {
        Ok(summary) => {
            println!("{} slides -> {}", summary.stats.retained, summary.run_dir.display());
        }
        Err(e) => {
            error!(error = %e, "run failed");
            if let Some(hint) = pipeline::suggestion(&e) {
                eprintln!("{hint}");
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "slidereel",
            "talk.mp4",
            "--threshold",
            "10",
            "--scene",
            "0.2",
            "--crop",
            "1280:720:0:180",
            "--start",
            "5",
            "--no-pdf",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.dedup.hamming_threshold, 10);
        assert_eq!(config.sampler.scene_threshold, 0.2);
        assert_eq!(
            config.sampler.crop,
            Some(CropRegion { width: 1280, height: 720, x: 0, y: 180 })
        );
        assert_eq!(config.sampler.start_secs, Some(5.0));
        assert_eq!(config.sampler.end_secs, None);
        assert!(!config.export.pdf);
        assert!(config.export.deck);
    }

    #[test]
    fn bad_crop_rejected_by_parser() {
        assert!(Args::try_parse_from(["slidereel", "talk.mp4", "--crop", "wide"]).is_err());
    }

    #[test]
    fn config_file_values_survive_without_flags() {
        let args = Args::parse_from(["slidereel", "talk.mp4"]);
        let mut config = Config::default();
        config.dedup.hamming_threshold = 3;
        args.apply(&mut config);
        assert_eq!(config.dedup.hamming_threshold, 3);
    }
}
