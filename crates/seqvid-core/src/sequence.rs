//! Image sequence detection.
//!
//! A directory of rendered frames (`render.0001.png`, `render_0001.png`,
//! `render0001.png`, ...) is scanned, every recognized image is split into a
//! [`FrameToken`], tokens are grouped by `(prefix, extension)`, and every group
//! with at least two members becomes an [`ImageSequence`]. Missing frames are
//! tolerated and reported through [`ImageSequence::is_contiguous`] and
//! [`ImageSequence::gaps`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SeqvidError, SeqvidResult};
use crate::natural::{rightmost_digit_run, split_extension, NaturalKey, SortOptions};

/// Image extensions recognized as sequence members.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "exr", "bmp"];

/// Extensions whose formats can store an alpha channel.
pub const ALPHA_EXTENSIONS: &[&str] = &["png", "exr", "tif", "tiff"];

/// Fallback output name when neither the prefix nor the directory gives one.
pub const DEFAULT_BASE_NAME: &str = "rendered_video";

/// One filename decomposed around its frame number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameToken {
    pub prefix: String,
    /// Digits as written, padding included.
    pub numeric_text: String,
    pub numeric_value: u64,
    pub suffix: String,
    pub extension: String,
}

impl FrameToken {
    /// Split a filename around the rightmost digit run of its stem.
    ///
    /// Returns `None` when the stem has no digits or the run does not fit a `u64`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = split_extension(file_name);
        let (start, end) = rightmost_digit_run(stem)?;
        let numeric_text = &stem[start..end];
        let numeric_value = numeric_text.parse::<u64>().ok()?;
        Some(FrameToken {
            prefix: stem[..start].to_string(),
            numeric_text: numeric_text.to_string(),
            numeric_value,
            suffix: stem[end..].to_string(),
            extension: extension.to_string(),
        })
    }

    /// The frame number ends exactly at the extension boundary.
    pub fn is_sequence_member(&self) -> bool {
        self.suffix.is_empty() && !self.extension.is_empty()
    }

    /// Reassemble the original filename.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            format!("{}{}{}", self.prefix, self.numeric_text, self.suffix)
        } else {
            format!(
                "{}{}{}.{}",
                self.prefix, self.numeric_text, self.suffix, self.extension
            )
        }
    }
}

/// A run of numbered frames sharing prefix and extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSequence {
    pub directory: PathBuf,
    pub prefix: String,
    pub extension: String,
    /// Ascending by `numeric_value`.
    pub frames: Vec<FrameToken>,
    pub first_index: u64,
    pub last_index: u64,
    pub is_contiguous: bool,
}

impl ImageSequence {
    /// Build a sequence from tokens that must share prefix and extension.
    pub fn from_frames(directory: impl Into<PathBuf>, frames: Vec<FrameToken>) -> SeqvidResult<Self> {
        let directory = directory.into();
        let first = frames.first().ok_or_else(|| SeqvidError::NoSequenceFound {
            path: directory.clone(),
        })?;
        let (prefix, extension) = (first.prefix.clone(), first.extension.clone());
        if let Some(odd) = frames
            .iter()
            .find(|f| f.prefix != prefix || f.extension != extension)
        {
            return Err(SeqvidError::InvalidArgument(format!(
                "{} does not belong to the {}#.{} sequence",
                odd.file_name(),
                prefix,
                extension
            )));
        }
        Ok(Self::assemble(directory, prefix, extension, frames))
    }

    fn assemble(directory: PathBuf, prefix: String, extension: String, mut frames: Vec<FrameToken>) -> Self {
        // Members share prefix and extension, so case folding cannot matter here.
        let options = SortOptions::case_sensitive(true);
        frames.sort_by_cached_key(|f| (f.numeric_value, NaturalKey::new(&f.file_name(), options)));
        frames.dedup_by(|later, kept| {
            let duplicate = later.numeric_value == kept.numeric_value;
            if duplicate {
                tracing::warn!(
                    "duplicate frame {}: keeping {}, ignoring {}",
                    kept.numeric_value,
                    kept.file_name(),
                    later.file_name()
                );
            }
            duplicate
        });
        let first_index = frames.first().map(|f| f.numeric_value).unwrap_or(0);
        let last_index = frames.last().map(|f| f.numeric_value).unwrap_or(0);
        let is_contiguous = frames
            .windows(2)
            .all(|w| w[1].numeric_value == w[0].numeric_value + 1);
        Self {
            directory,
            prefix,
            extension,
            frames,
            first_index,
            last_index,
            is_contiguous,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Inclusive ranges of frame numbers missing between first and last.
    pub fn gaps(&self) -> Vec<(u64, u64)> {
        self.frames
            .windows(2)
            .filter(|w| w[1].numeric_value > w[0].numeric_value + 1)
            .map(|w| (w[0].numeric_value + 1, w[1].numeric_value - 1))
            .collect()
    }

    pub fn missing_count(&self) -> u64 {
        self.gaps().iter().map(|(a, b)| b - a + 1).sum()
    }

    /// Common digit width of the frame numbers, `None` when widths differ.
    pub fn padding(&self) -> Option<usize> {
        let width = self.frames.first()?.numeric_text.len();
        self.frames
            .iter()
            .all(|f| f.numeric_text.len() == width)
            .then_some(width)
    }

    /// Output base name: the prefix without trailing separators, else the
    /// directory name, else [`DEFAULT_BASE_NAME`].
    pub fn base_name(&self) -> String {
        let trimmed = self
            .prefix
            .trim_end_matches(|c: char| matches!(c, '_' | '-' | '.' | ' '));
        let trimmed = trimmed.trim_start_matches(|c: char| matches!(c, '_' | '-' | '.' | ' '));
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        match self.directory.file_name().and_then(|n| n.to_str()) {
            Some(name) if !name.is_empty() && name != "." && name != ".." => name.to_string(),
            _ => DEFAULT_BASE_NAME.to_string(),
        }
    }

    /// Whether the source image format can hold an alpha channel.
    pub fn supports_alpha(&self) -> bool {
        let ext = self.extension.to_ascii_lowercase();
        ALPHA_EXTENSIONS.contains(&ext.as_str())
    }

    pub fn file_names(&self) -> Vec<String> {
        self.frames.iter().map(FrameToken::file_name).collect()
    }

    pub fn frame_paths(&self) -> Vec<PathBuf> {
        self.frames
            .iter()
            .map(|f| self.directory.join(f.file_name()))
            .collect()
    }

    /// Human readable range such as `render.[0001-0010].png`.
    pub fn display_pattern(&self) -> String {
        let (first, last) = match (self.frames.first(), self.frames.last()) {
            (Some(a), Some(b)) => (a.numeric_text.as_str(), b.numeric_text.as_str()),
            _ => ("", ""),
        };
        format!("{}[{}-{}].{}", self.prefix, first, last, self.extension)
    }
}

/// Scans directories for image sequences.
#[derive(Debug, Clone, Default)]
pub struct SequenceDetector {
    options: SortOptions,
}

impl SequenceDetector {
    pub fn new(options: SortOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SortOptions {
        self.options
    }

    fn is_image(extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str())
    }

    fn group_key(&self, token: &FrameToken) -> (String, String) {
        (
            self.options.fold(&token.prefix),
            self.options.fold(&token.extension),
        )
    }

    /// Every qualifying sequence in `directory`, ordered by prefix then extension.
    pub fn scan(&self, directory: &Path) -> SeqvidResult<Vec<ImageSequence>> {
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SeqvidError::NoSequenceFound {
                    path: directory.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::debug!("skipping non UTF-8 filename {:?}", raw),
            }
        }
        names.sort_by_cached_key(|n| NaturalKey::new(n, self.options));

        let mut groups: BTreeMap<(String, String), Vec<FrameToken>> = BTreeMap::new();
        for name in &names {
            let Some(token) = FrameToken::parse(name) else {
                continue;
            };
            if !token.is_sequence_member() || !Self::is_image(&token.extension) {
                continue;
            }
            groups.entry(self.group_key(&token)).or_default().push(token);
        }

        let sequences: Vec<ImageSequence> = groups
            .into_values()
            .filter(|frames| frames.len() >= 2)
            .map(|frames| {
                let prefix = frames[0].prefix.clone();
                let extension = frames[0].extension.clone();
                ImageSequence::assemble(directory.to_path_buf(), prefix, extension, frames)
            })
            .filter(|seq| seq.len() >= 2)
            .collect();

        for seq in &sequences {
            tracing::debug!(
                "found {} ({} frames, contiguous: {})",
                seq.display_pattern(),
                seq.len(),
                seq.is_contiguous
            );
        }
        Ok(sequences)
    }

    /// Sequences in `directory`, or only the one containing `sample`.
    pub fn detect(&self, directory: &Path, sample: Option<&str>) -> SeqvidResult<Vec<ImageSequence>> {
        let mut sequences = self.scan(directory)?;
        if let Some(sample) = sample {
            let key = FrameToken::parse(sample)
                .filter(|t| t.is_sequence_member() && Self::is_image(&t.extension))
                .map(|t| self.group_key(&t));
            sequences.retain(|seq| {
                key.as_ref().is_some_and(|(prefix, ext)| {
                    self.options.fold(&seq.prefix) == *prefix
                        && self.options.fold(&seq.extension) == *ext
                })
            });
        }
        if sequences.is_empty() {
            let path = match sample {
                Some(s) => directory.join(s),
                None => directory.to_path_buf(),
            };
            return Err(SeqvidError::NoSequenceFound { path });
        }
        Ok(sequences)
    }

    /// Exactly one sequence, or `AmbiguousSequence` naming the candidates.
    pub fn detect_one(&self, directory: &Path, sample: Option<&str>) -> SeqvidResult<ImageSequence> {
        let sequences = self.detect(directory, sample)?;
        select(sequences, None)
    }

    /// Detect from whatever the user pointed at.
    ///
    /// A directory is scanned; a file selects its own sequence; a path that
    /// does not exist but whose parent does is read as a render-output prefix
    /// (`/renders/frame_`) and selects the sequence with that prefix.
    pub fn detect_path(&self, path: &Path) -> SeqvidResult<Vec<ImageSequence>> {
        let not_found = || SeqvidError::NoSequenceFound {
            path: path.to_path_buf(),
        };
        if path.as_os_str().is_empty() {
            return Err(not_found());
        }
        if path.is_dir() {
            return self.detect(path, None);
        }

        let parent = match path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => return Err(not_found()),
        };
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(not_found)?;

        if path.is_file() {
            return self.detect(parent, Some(name));
        }
        if !parent.is_dir() {
            return Err(not_found());
        }

        let wanted = self.options.fold(name);
        let sequences: Vec<ImageSequence> = self
            .scan(parent)?
            .into_iter()
            .filter(|seq| self.options.fold(&seq.prefix) == wanted)
            .collect();
        if sequences.is_empty() {
            return Err(not_found());
        }
        Ok(sequences)
    }
}

/// Pick one sequence from `candidates`, optionally by exact prefix.
pub fn select(candidates: Vec<ImageSequence>, prefix: Option<&str>) -> SeqvidResult<ImageSequence> {
    let directory = candidates
        .first()
        .map(|s| s.directory.clone())
        .unwrap_or_default();
    let mut matching: Vec<ImageSequence> = match prefix {
        Some(p) => candidates.into_iter().filter(|s| s.prefix == p).collect(),
        None => candidates,
    };
    match matching.len() {
        0 => Err(SeqvidError::NoSequenceFound {
            path: directory.join(prefix.unwrap_or_default()),
        }),
        1 => Ok(matching.remove(0)),
        _ => Err(SeqvidError::AmbiguousSequence {
            directory,
            candidates: matching.iter().map(|s| s.display_pattern()).collect(),
        }),
    }
}
