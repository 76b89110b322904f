//! Versioned output naming: `name_v001.ext`, `name_v002.ext`, ...
//!
//! Existence is checked on every call; nothing is cached between calls.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{SeqvidError, SeqvidResult};

/// Minimum digits in the version tag.
pub const VERSION_WIDTH: usize = 3;

/// Highest version handed out. Past 999 the tag simply widens (`v1000`).
pub const MAX_VERSION: u32 = 9999;

/// Serializes version allocation across every request in this process.
static ALLOCATION_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// An output path that did not exist when it was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedPath {
    pub base_name: String,
    pub version: u32,
    pub full_path: PathBuf,
}

impl VersionedPath {
    /// `v001`, `v002`, ...
    pub fn tag(&self) -> String {
        version_tag(self.version)
    }

    /// `name_v001`
    pub fn stem(&self) -> String {
        format!("{}_{}", self.base_name, self.tag())
    }
}

pub fn version_tag(version: u32) -> String {
    format!("v{:0width$}", version, width = VERSION_WIDTH)
}

pub fn versioned_file_name(base_name: &str, version: u32, extension: &str) -> String {
    format!("{}_{}.{}", base_name, version_tag(version), extension)
}

/// Hidden sibling the encoder writes to before the result is moved into place.
pub fn partial_path(output: &VersionedPath) -> PathBuf {
    let extension = output
        .full_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let file_name = format!(".{}.partial.{}", output.stem(), extension);
    match output.full_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// First `base_name_vNNN.extension` in `directory` that does not exist.
pub fn next_versioned_path(
    directory: &Path,
    base_name: &str,
    extension: &str,
) -> SeqvidResult<VersionedPath> {
    next_versioned_path_paired(directory, base_name, extension, |_| None)
}

/// Like [`next_versioned_path`], but a version is only free when the
/// companion path returned for it is also absent.
pub fn next_versioned_path_paired<F>(
    directory: &Path,
    base_name: &str,
    extension: &str,
    companion: F,
) -> SeqvidResult<VersionedPath>
where
    F: Fn(u32) -> Option<PathBuf>,
{
    candidates(directory, base_name, extension)
        .find(|candidate| {
            !candidate.full_path.exists()
                && companion(candidate.version).map_or(true, |p| !p.exists())
        })
        .ok_or_else(|| exhausted(directory, base_name))
}

fn candidates<'a>(
    directory: &'a Path,
    base_name: &'a str,
    extension: &'a str,
) -> impl Iterator<Item = VersionedPath> + 'a {
    (1..=MAX_VERSION).map(move |version| VersionedPath {
        base_name: base_name.to_string(),
        version,
        full_path: directory.join(versioned_file_name(base_name, version, extension)),
    })
}

fn exhausted(directory: &Path, base_name: &str) -> SeqvidError {
    SeqvidError::VersionsExhausted {
        directory: directory.to_path_buf(),
        base_name: base_name.to_string(),
    }
}

/// A version claimed by creating its partial file.
#[derive(Debug, Clone)]
pub struct OutputReservation {
    pub output: VersionedPath,
    /// Zero-byte placeholder the encoder overwrites.
    pub partial: PathBuf,
    pub companion: Option<PathBuf>,
}

impl OutputReservation {
    /// Give the version back by deleting the placeholder.
    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.partial) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", self.partial.display(), e);
            }
        }
    }
}

/// Allocate and reserve the next free version in `directory`.
///
/// Runs under a process-wide lock, and the reservation itself is an
/// exclusive file creation, so two concurrent requests with the same base
/// name (in this process or another) never receive the same version.
pub fn reserve_output<F>(
    directory: &Path,
    base_name: &str,
    extension: &str,
    companion: F,
) -> SeqvidResult<OutputReservation>
where
    F: Fn(u32) -> Option<PathBuf>,
{
    let _guard = ALLOCATION_LOCK.lock();
    std::fs::create_dir_all(directory)?;

    for candidate in candidates(directory, base_name, extension) {
        if candidate.full_path.exists() {
            continue;
        }
        let companion_path = companion(candidate.version);
        if companion_path.as_ref().is_some_and(|p| p.exists()) {
            continue;
        }
        let partial = partial_path(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&partial) {
            Ok(_) => {
                tracing::debug!("reserved {}", candidate.full_path.display());
                return Ok(OutputReservation {
                    output: candidate,
                    partial,
                    companion: companion_path,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(exhausted(directory, base_name))
}
