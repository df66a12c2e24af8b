use slidereel_common::config::SamplerConfig;
use slidereel_common::frame::Frame;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::jpeg::JpegSplitter;
use super::{FrameSource, SamplerError};

const READ_CHUNK: usize = 64 * 1024;
const STDERR_TAIL_LINES: usize = 20;

/// Scene-change sampler backed by an ffmpeg child process.
///
/// ffmpeg decodes the video, applies the optional crop and rate cap, keeps
/// the first frame plus every frame whose scene score exceeds the
/// threshold, and writes the survivors to stdout as concatenated JPEGs.
/// The `showinfo` filter logs each survivor's timestamp to stderr, which a
/// helper task forwards in order.
pub struct FfmpegSampler {
    child: Child,
    stdout: ChildStdout,
    splitter: JpegSplitter,
    read_buf: Vec<u8>,
    timestamps: mpsc::UnboundedReceiver<Option<Duration>>,
    stderr_task: Option<JoinHandle<Vec<String>>>,
    /// Start of the time window; ffmpeg reports times relative to it.
    offset: Duration,
    seq: u64,
    exhausted: bool,
}

impl FfmpegSampler {
    /// Spawn ffmpeg on `input` and start streaming candidates.
    pub async fn start(input: &Path, config: &SamplerConfig) -> Result<Self, SamplerError> {
        let start = config.start_secs.unwrap_or(0.0);
        let offset =
            Duration::try_from_secs_f64(start).map_err(|_| SamplerError::InvalidStart(start))?;
        let args = build_args(input, config);

        let mut child = Command::new(&config.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SamplerError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SamplerError::Spawn("could not get stdout handle".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SamplerError::Spawn("could not get stderr handle".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stderr_task = tokio::spawn(forward_stderr(stderr, tx));

        info!(
            input = %input.display(),
            filter = %filter_graph(config),
            "ffmpeg sampler started"
        );

        Ok(Self {
            child,
            stdout,
            splitter: JpegSplitter::new(),
            read_buf: vec![0; READ_CHUNK],
            timestamps: rx,
            stderr_task: Some(stderr_task),
            offset,
            seq: 0,
            exhausted: false,
        })
    }

    /// Wait for ffmpeg to exit and surface a failure status with its stderr tail.
    async fn finish(&mut self) -> Result<(), SamplerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SamplerError::Wait(e.to_string()))?;

        let tail = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            return Err(SamplerError::FfmpegFailed {
                status: status.to_string(),
                stderr: tail.join("\n"),
            });
        }

        if self.splitter.pending() > 0 {
            warn!(
                bytes = self.splitter.pending(),
                "ffmpeg output ended with a partial image"
            );
        }
        debug!(frames = self.seq, "ffmpeg sampler finished");
        Ok(())
    }
}

impl FrameSource for FfmpegSampler {
    async fn next_frame(&mut self) -> Result<Option<Frame>, SamplerError> {
        loop {
            if let Some(jpeg) = self.splitter.next_image() {
                // showinfo logs a frame before the encoder emits it
                let pts = self
                    .timestamps
                    .recv()
                    .await
                    .flatten()
                    .and_then(|t| t.checked_add(self.offset));
                let frame = Frame::encoded(jpeg, self.seq, pts);
                self.seq += 1;
                debug!(
                    seq = frame.seq,
                    pts_ms = pts.map(|t| t.as_millis() as u64),
                    bytes = frame.payload_size(),
                    "candidate frame"
                );
                return Ok(Some(frame));
            }

            if self.exhausted {
                return Ok(None);
            }

            let n = self
                .stdout
                .read(&mut self.read_buf)
                .await
                .map_err(|e| SamplerError::Read(e.to_string()))?;
            if n == 0 {
                self.exhausted = true;
                self.finish().await?;
                continue;
            }
            self.splitter.push(&self.read_buf[..n]);
        }
    }
}

/// Filter graph: crop, rate cap, scene selection, timestamp logging.
pub fn filter_graph(config: &SamplerConfig) -> String {
    let mut filters = Vec::new();
    if let Some(crop) = &config.crop {
        filters.push(crop.to_filter());
    }
    if let Some(fps) = config.max_fps {
        filters.push(format!("fps={fps}"));
    }
    // The first frame has no predecessor to score against, so let it through
    filters.push(format!(
        "select='eq(n,0)+gt(scene,{})'",
        config.scene_threshold
    ));
    filters.push("showinfo".to_string());
    filters.join(",")
}

/// Full ffmpeg argument list for sampling `input`.
pub fn build_args(input: &Path, config: &SamplerConfig) -> Vec<String> {
    let mut args: Vec<String> =
        ["-hide_banner", "-nostdin", "-nostats", "-loglevel", "info"].map(String::from).to_vec();

    if let Some(start) = config.start_secs {
        args.push("-ss".into());
        args.push(start.to_string());
    }
    if let Some(end) = config.end_secs {
        args.push("-to".into());
        args.push(end.to_string());
    }
    args.push("-i".into());
    args.push(input.display().to_string());

    args.push("-an".into());
    args.push("-vf".into());
    args.push(filter_graph(config));
    // -fps_mode needs ffmpeg 5.1 or newer
    args.extend(["-fps_mode", "vfr", "-f", "image2pipe", "-c:v", "mjpeg", "-q:v"].map(String::from));
    args.push(config.jpeg_quality.to_string());
    args.push("pipe:1".into());
    args
}

/// Extract `pts_time` from a `showinfo` frame line. The outer `Option` is
/// `None` for lines that do not describe a frame; the inner one is `None`
/// when the frame's time is unusable.
pub fn parse_showinfo_pts(line: &str) -> Option<Option<Duration>> {
    if !line.contains("showinfo") || !line.contains(" n:") {
        return None;
    }
    let rest = &line[line.find("pts_time:")? + "pts_time:".len()..];
    let value = rest.split_whitespace().next().unwrap_or("");
    Some(
        value
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
    )
}

/// Drain ffmpeg's stderr, forwarding frame timestamps and keeping a tail
/// of the log for error reports.
async fn forward_stderr(
    stderr: ChildStderr,
    tx: mpsc::UnboundedSender<Option<Duration>>,
) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(pts) = parse_showinfo_pts(&line) {
                    // Receiver gone means the sampler was dropped.
                    let _ = tx.send(pts);
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read ffmpeg stderr");
                break;
            }
        }
    }
    tail.into_iter().collect()
}
