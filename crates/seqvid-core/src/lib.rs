//! # seqvid-core
//!
//! Core types for turning numbered image frames into a video.
//! This crate holds everything that never touches a child process:
//! natural filename ordering, sequence detection, versioned output naming,
//! the encode request model, configuration and error types.

pub mod config;
pub mod error;
pub mod format;
pub mod natural;
pub mod sequence;
pub mod types;
pub mod version;

pub use config::*;

pub use error::{SeqvidError, SeqvidResult};
pub use natural::{natural_cmp, sort_natural, NaturalKey, SortOptions};
pub use sequence::{select, FrameToken, ImageSequence, SequenceDetector};
pub use types::{AlphaHandling, Backend, Codec, ColorManagement, EncodeRequest, Quality};
pub use version::{next_versioned_path, reserve_output, OutputReservation, VersionedPath};
