//! Progress sources polled while an encoder runs.
//!
//! The child has no IPC channel back to us, so progress is read from files it
//! leaves behind. Sources are asked in priority order; the first one that
//! yields a fraction wins, and an unreadable or malformed source simply
//! yields nothing so the next one is consulted.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Cap for size-based estimates, which cannot know when encoding ends.
const SIZE_ESTIMATE_CEILING: f64 = 0.99;

/// One reading from a progress source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub fraction: Option<f64>,
    pub stage: Option<String>,
    pub error: Option<String>,
}

impl ProgressSample {
    fn is_empty(&self) -> bool {
        self.fraction.is_none() && self.stage.is_none() && self.error.is_none()
    }
}

pub trait ProgressSource: Send {
    fn name(&self) -> &'static str;

    /// Non-blocking read. `output_bytes` is the current size of the output.
    fn sample(&mut self, output_bytes: u64) -> Option<ProgressSample>;
}

/// Contents of the JSON status file a cooperating child writes.
#[derive(Debug, Deserialize)]
struct StatusReport {
    stage: Option<String>,
    progress: Option<f64>,
    error: Option<String>,
}

/// JSON `{stage, progress, error}` written by the child.
pub struct StatusFileSource {
    path: PathBuf,
}

impl StatusFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProgressSource for StatusFileSource {
    fn name(&self) -> &'static str {
        "status-file"
    }

    fn sample(&mut self, _output_bytes: u64) -> Option<ProgressSample> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let report: StatusReport = match serde_json::from_str(&text) {
            Ok(report) => report,
            Err(e) => {
                tracing::debug!("ignoring unreadable status file {}: {}", self.path.display(), e);
                return None;
            }
        };
        let sample = ProgressSample {
            fraction: report
                .progress
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 1.0)),
            stage: report.stage.filter(|s| !s.is_empty()),
            error: report.error.filter(|e| !e.is_empty()),
        };
        (!sample.is_empty()).then_some(sample)
    }
}

/// Latest state in an FFmpeg `-progress` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfmpegReport {
    pub frame: Option<u64>,
    pub ended: bool,
}

impl FfmpegReport {
    /// Parse repeated `key=value` blocks; later blocks win.
    pub fn parse(text: &str) -> Self {
        let mut report = Self::default();
        for line in text.lines() {
            match line.trim().split_once('=') {
                Some(("frame", v)) => report.frame = v.trim().parse::<u64>().ok().or(report.frame),
                Some(("progress", v)) => report.ended = v.trim() == "end",
                _ => {}
            }
        }
        report
    }

    pub fn read(path: &Path) -> Option<Self> {
        std::fs::read_to_string(path).ok().map(|text| Self::parse(&text))
    }
}

/// FFmpeg's `-progress` output: repeated `key=value` blocks.
pub struct FfmpegProgressSource {
    path: PathBuf,
    total_frames: u64,
}

impl FfmpegProgressSource {
    pub fn new(path: impl Into<PathBuf>, total_frames: u64) -> Self {
        Self {
            path: path.into(),
            total_frames,
        }
    }
}

impl ProgressSource for FfmpegProgressSource {
    fn name(&self) -> &'static str {
        "ffmpeg-progress"
    }

    fn sample(&mut self, _output_bytes: u64) -> Option<ProgressSample> {
        if self.total_frames == 0 {
            return None;
        }
        let report = FfmpegReport::read(&self.path)?;
        let frame = report.frame?;
        Some(ProgressSample {
            fraction: Some((frame as f64 / self.total_frames as f64).min(1.0)),
            stage: Some(if report.ended { "finalizing" } else { "encoding" }.to_string()),
            error: None,
        })
    }
}

/// Growth of the output file, optionally against an expected final size.
pub struct OutputSizeSource {
    expected_bytes: Option<u64>,
}

impl OutputSizeSource {
    pub fn new(expected_bytes: Option<u64>) -> Self {
        Self { expected_bytes }
    }
}

impl ProgressSource for OutputSizeSource {
    fn name(&self) -> &'static str {
        "output-size"
    }

    fn sample(&mut self, output_bytes: u64) -> Option<ProgressSample> {
        if output_bytes == 0 {
            return Some(ProgressSample {
                fraction: None,
                stage: Some("initializing".to_string()),
                error: None,
            });
        }
        let fraction = self
            .expected_bytes
            .filter(|e| *e > 0)
            .map(|e| (output_bytes as f64 / e as f64).min(SIZE_ESTIMATE_CEILING));
        Some(ProgressSample {
            fraction,
            stage: Some("encoding".to_string()),
            error: None,
        })
    }
}

/// Sources in priority order.
#[derive(Default)]
pub struct ProgressChain {
    sources: Vec<Box<dyn ProgressSource>>,
}

impl ProgressChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl ProgressSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Merge readings: each field comes from the highest-priority source that has it.
    pub fn sample(&mut self, output_bytes: u64) -> ProgressSample {
        let mut merged = ProgressSample::default();
        for source in &mut self.sources {
            let Some(sample) = source.sample(output_bytes) else {
                continue;
            };
            if merged.fraction.is_none() {
                merged.fraction = sample.fraction;
            }
            if merged.stage.is_none() {
                merged.stage = sample.stage;
            }
            if merged.error.is_none() {
                merged.error = sample.error;
            }
            if merged.fraction.is_some() && merged.stage.is_some() {
                break;
            }
        }
        merged
    }
}
