/// Core error types for seqvid.
use std::path::PathBuf;

use crate::types::Codec;

/// A specialized Result type for seqvid operations.
pub type SeqvidResult<T> = Result<T, SeqvidError>;

/// Top-level error type shared by detection, command building and supervision.
#[derive(Debug, thiserror::Error)]
pub enum SeqvidError {
    #[error("no image sequence found at {}", path.display())]
    NoSequenceFound { path: PathBuf },

    #[error(
        "{} image sequences found in {}: {}; pick one by prefix",
        candidates.len(),
        directory.display(),
        candidates.join(", ")
    )]
    AmbiguousSequence {
        directory: PathBuf,
        candidates: Vec<String>,
    },

    #[error("{codec} cannot carry an alpha channel; encoding opaque")]
    UnsupportedCodecAlphaCombo { codec: Codec },

    #[error("{name} not found. {remediation}")]
    EncoderNotFound { name: String, remediation: String },

    #[error("failed to launch {}: {message}", program.display())]
    LaunchFailed { program: PathBuf, message: String },

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("conversion cancelled by user")]
    Cancelled,

    #[error("no free output version for {base_name} in {}", directory.display())]
    VersionsExhausted {
        directory: PathBuf,
        base_name: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SeqvidError {
    /// Create an encoder-not-found error for FFmpeg with install instructions.
    pub fn ffmpeg_not_found() -> Self {
        SeqvidError::EncoderNotFound {
            name: "FFmpeg".to_string(),
            remediation: "Install FFmpeg (https://ffmpeg.org/download.html), set \
                          `encoder.ffmpeg_path` in seqvid.toml, or use the host backend."
                .to_string(),
        }
    }

    /// Create a launch error.
    pub fn launch(program: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SeqvidError::LaunchFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    /// User-initiated outcomes are not failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SeqvidError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = SeqvidError::AmbiguousSequence {
            directory: PathBuf::from("/renders"),
            candidates: vec!["beauty_".into(), "depth_".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 image sequences found"));
        assert!(msg.contains("beauty_, depth_"));
    }

    #[test]
    fn test_encoder_not_found_has_remediation() {
        let err = SeqvidError::ffmpeg_not_found();
        assert!(err.to_string().contains("https://ffmpeg.org/download.html"));
        assert!(!err.is_cancelled());
        assert!(SeqvidError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_alpha_combo_display() {
        let err = SeqvidError::UnsupportedCodecAlphaCombo { codec: Codec::H264 };
        assert_eq!(
            err.to_string(),
            "H.264 cannot carry an alpha channel; encoding opaque"
        );
    }
}
