//! # seqvid-encode
//!
//! Everything that involves an external encoder: locating it, building its
//! invocation (FFmpeg argument lists or host setup artifacts), launching it
//! as a detached child and supervising it to a terminal status.

pub mod discovery;
pub mod ffmpeg;
pub mod host;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod supervisor;

pub use discovery::{find_ffmpeg, find_host, verify_encoder};
pub use ffmpeg::{build_ffmpeg_command, EncoderCommand};
pub use host::{build_host_setup, HostSetup};
pub use pipeline::{prepare_ffmpeg, prepare_host, write_host_setup, PreparedEncode, WrittenSetup};
pub use progress::{FfmpegReport, ProgressChain, ProgressSample, ProgressSource};
pub use supervisor::{
    EncodeJob, ProcessHandle, ProcessStatus, ProcessSupervisor, SupervisorOptions, WorkDir,
};
