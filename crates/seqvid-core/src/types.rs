use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SeqvidError, SeqvidResult};
use crate::sequence::ImageSequence;

/// Lowest and highest frame rate accepted by an [`EncodeRequest`].
pub const FPS_RANGE: (f64, f64) = (1.0, 120.0);

/// Target video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 in an MP4 container.
    H264,
    /// VP9 in a WebM container. Carries alpha.
    Vp9,
    /// AV1 in a WebM container.
    Av1,
    /// Apple ProRes in a QuickTime container. Carries alpha with 4444 profiles.
    #[serde(rename = "prores")]
    ProRes,
}

impl Codec {
    pub fn all() -> &'static [Codec] {
        &[Codec::H264, Codec::Vp9, Codec::Av1, Codec::ProRes]
    }

    /// Whether the codec/container pair can store an alpha plane.
    pub fn supports_alpha(&self) -> bool {
        matches!(self, Codec::Vp9 | Codec::ProRes)
    }

    /// Output file extension of the container this codec is written to.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::H264 => "mp4",
            Codec::Vp9 | Codec::Av1 => "webm",
            Codec::ProRes => "mov",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::H264 => write!(f, "H.264"),
            Codec::Vp9 => write!(f, "VP9"),
            Codec::Av1 => write!(f, "AV1"),
            Codec::ProRes => write!(f, "ProRes"),
        }
    }
}

impl FromStr for Codec {
    type Err = SeqvidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "mp4" => Ok(Codec::H264),
            "vp9" | "webm" => Ok(Codec::Vp9),
            "av1" => Ok(Codec::Av1),
            "prores" | "mov" => Ok(Codec::ProRes),
            other => Err(SeqvidError::InvalidArgument(format!(
                "unknown codec '{}' (expected h264, vp9, av1 or prores)",
                other
            ))),
        }
    }
}

/// Quality preset, from smallest file to best picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

impl Quality {
    pub fn all() -> &'static [Quality] {
        &[
            Quality::Lowest,
            Quality::Low,
            Quality::Medium,
            Quality::High,
            Quality::Highest,
        ]
    }

    /// Zero-based position in the ladder (Lowest = 0).
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Medium
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Lowest => write!(f, "lowest"),
            Quality::Low => write!(f, "low"),
            Quality::Medium => write!(f, "medium"),
            Quality::High => write!(f, "high"),
            Quality::Highest => write!(f, "highest"),
        }
    }
}

impl FromStr for Quality {
    type Err = SeqvidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowest" => Ok(Quality::Lowest),
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "highest" => Ok(Quality::Highest),
            other => Err(SeqvidError::InvalidArgument(format!(
                "unknown quality '{}' (expected lowest, low, medium, high or highest)",
                other
            ))),
        }
    }
}

/// Which encoder produces the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Invoke the FFmpeg binary directly.
    Ffmpeg,
    /// Hand a setup artifact to a headless instance of the host application.
    Host,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Ffmpeg
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Ffmpeg => write!(f, "ffmpeg"),
            Backend::Host => write!(f, "host"),
        }
    }
}

impl FromStr for Backend {
    type Err = SeqvidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Backend::Ffmpeg),
            "host" | "blender" => Ok(Backend::Host),
            other => Err(SeqvidError::InvalidArgument(format!(
                "unknown backend '{}' (expected ffmpeg or host)",
                other
            ))),
        }
    }
}

/// Color management strings forwarded untouched to the host encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorManagement {
    pub view_transform: String,
    pub look: String,
    pub exposure: f64,
    pub gamma: f64,
}

impl Default for ColorManagement {
    fn default() -> Self {
        Self {
            view_transform: "Standard".to_string(),
            look: "None".to_string(),
            exposure: 0.0,
            gamma: 1.0,
        }
    }
}

/// How a request's transparency flag is resolved against codec and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphaHandling {
    /// Alpha was not requested.
    Opaque,
    /// Alpha requested and carried through.
    Preserved,
    /// Alpha requested but dropped; the string says why.
    Dropped(String),
}

impl AlphaHandling {
    pub fn is_preserved(&self) -> bool {
        matches!(self, AlphaHandling::Preserved)
    }
}

/// Everything needed to turn one detected sequence into one video.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub sequence: ImageSequence,
    pub codec: Codec,
    pub quality: Quality,
    pub fps: f64,
    pub preserve_alpha: bool,
    pub output_directory: PathBuf,
    pub backend: Backend,
    /// Pass-through; the core never inspects it.
    pub resolution: Option<(u32, u32)>,
    /// Host backend only.
    pub color: ColorManagement,
}

impl EncodeRequest {
    /// Create a request with H.264, medium quality, 24 fps and the FFmpeg backend.
    pub fn new(sequence: ImageSequence, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            sequence,
            codec: Codec::H264,
            quality: Quality::Medium,
            fps: 24.0,
            preserve_alpha: false,
            output_directory: output_directory.into(),
            backend: Backend::Ffmpeg,
            resolution: None,
            color: ColorManagement::default(),
        }
    }

    pub fn validate(&self) -> SeqvidResult<()> {
        let (min, max) = FPS_RANGE;
        if !self.fps.is_finite() || self.fps < min || self.fps > max {
            return Err(SeqvidError::InvalidArgument(format!(
                "fps must be between {} and {}, got {}",
                min, max, self.fps
            )));
        }
        if self.sequence.frames.is_empty() {
            return Err(SeqvidError::NoSequenceFound {
                path: self.sequence.directory.clone(),
            });
        }
        Ok(())
    }

    /// Resolve `preserve_alpha` against the codec and the source format.
    ///
    /// Alpha is only kept when the codec can carry it and the source frames
    /// can contain it; it is never fabricated from RGB-only input.
    pub fn alpha_handling(&self) -> AlphaHandling {
        if !self.preserve_alpha {
            return AlphaHandling::Opaque;
        }
        if !self.codec.supports_alpha() {
            let reason = SeqvidError::UnsupportedCodecAlphaCombo { codec: self.codec };
            tracing::warn!("{}", reason);
            return AlphaHandling::Dropped(reason.to_string());
        }
        if !self.sequence.supports_alpha() {
            let reason = format!(
                ".{} frames have no alpha channel; encoding opaque",
                self.sequence.extension
            );
            tracing::warn!("{}", reason);
            return AlphaHandling::Dropped(reason);
        }
        AlphaHandling::Preserved
    }
}
