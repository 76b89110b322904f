use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use seqvid_core::{select, ImageSequence, SequenceDetector, SeqvidConfig};

/// What `detect --json` prints for each sequence.
#[derive(Debug, Serialize)]
pub(crate) struct SequenceSummary {
    pub directory: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub pattern: String,
    pub frames: usize,
    pub first_index: u64,
    pub last_index: u64,
    pub is_contiguous: bool,
    pub gaps: Vec<(u64, u64)>,
    pub padding: Option<usize>,
    pub base_name: String,
    pub supports_alpha: bool,
}

impl From<&ImageSequence> for SequenceSummary {
    fn from(seq: &ImageSequence) -> Self {
        Self {
            directory: seq.directory.clone(),
            prefix: seq.prefix.clone(),
            extension: seq.extension.clone(),
            pattern: seq.display_pattern(),
            frames: seq.len(),
            first_index: seq.first_index,
            last_index: seq.last_index,
            is_contiguous: seq.is_contiguous,
            gaps: seq.gaps(),
            padding: seq.padding(),
            base_name: seq.base_name(),
            supports_alpha: seq.supports_alpha(),
        }
    }
}

/// `5`, `8-9`, ...
pub(crate) fn describe_gaps(gaps: &[(u64, u64)]) -> String {
    gaps.iter()
        .map(|(a, b)| if a == b { a.to_string() } else { format!("{}-{}", a, b) })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn cmd_detect(path: &Path, prefix: Option<&str>, json: bool, config: &SeqvidConfig) -> Result<()> {
    let detector = SequenceDetector::new(config.sort.options());
    let mut sequences = detector.detect_path(path)?;
    if prefix.is_some() {
        sequences = vec![select(sequences, prefix)?];
    }

    if json {
        let summaries: Vec<SequenceSummary> = sequences.iter().map(SequenceSummary::from).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("🔎 {} sequence(s) in {}", sequences.len(), path.display());
    for seq in &sequences {
        println!(
            "   {}  {} frame(s), {}-{}",
            seq.display_pattern(),
            seq.len(),
            seq.first_index,
            seq.last_index
        );
        if !seq.is_contiguous {
            println!(
                "      ⚠️  {} missing frame(s): {}",
                seq.missing_count(),
                describe_gaps(&seq.gaps())
            );
        }
    }
    if sequences.len() > 1 {
        println!("   Use --sequence <prefix> to pick one.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_gaps() {
        assert_eq!(describe_gaps(&[(5, 5), (8, 9)]), "5, 8-9");
        assert_eq!(describe_gaps(&[]), "");
    }
}
