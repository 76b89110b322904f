//! Host-encoder backend.
//!
//! Instead of an argument list, this backend produces a [`HostSetup`]: a
//! structured description of the scene a headless host instance needs in
//! order to load the frames and render them with its own encoder. It is
//! saved as `setup_files/<name>_vNNN_setup.<ext>` and handed to the host via
//! a configurable argument template.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use seqvid_core::{AlphaHandling, Codec, ColorManagement, EncodeRequest, Quality, SeqvidResult};

use crate::ffmpeg::EncoderCommand;

/// Environment variable carrying the status file path to the child.
pub const STATUS_FILE_ENV: &str = "SEQVID_STATUS_FILE";

/// Bitrate tier in kbps for the bitrate-driven host codecs.
pub fn host_bitrate_kbps(quality: Quality) -> u32 {
    match quality {
        Quality::Lowest => 2000,
        Quality::Low => 4000,
        Quality::Medium => 6000,
        Quality::High => 10000,
        Quality::Highest => 20000,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostRateControl {
    /// Named constant-rate-factor preset (`MEDIUM`, `HIGH`, ...).
    Crf { preset: String },
    Bitrate { kbps: u32 },
    /// The codec's own profile decides.
    Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSetup {
    pub image_directory: PathBuf,
    /// Frame files in playback order.
    pub files: Vec<String>,
    pub frame_start: u64,
    pub frame_end: u64,
    pub fps: f64,
    /// Container name as the host spells it (`MPEG4`, `WEBM`, `QUICKTIME`).
    pub container: String,
    pub codec: String,
    pub rate_control: HostRateControl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gop_size: Option<u32>,
    /// `RGBA` only when alpha is carried through.
    pub color_mode: String,
    pub film_transparent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(u32, u32)>,
    pub color_management: ColorManagement,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,
}

fn host_codec(codec: Codec, quality: Quality) -> (&'static str, &'static str, HostRateControl, Option<u32>) {
    match codec {
        Codec::H264 => (
            "MPEG4",
            "H264",
            HostRateControl::Crf {
                preset: quality.to_string().to_uppercase(),
            },
            Some(18),
        ),
        Codec::Vp9 => (
            "WEBM",
            "WEBM",
            HostRateControl::Bitrate {
                kbps: host_bitrate_kbps(quality),
            },
            Some(250),
        ),
        Codec::Av1 => (
            "WEBM",
            "AV1",
            HostRateControl::Bitrate {
                kbps: host_bitrate_kbps(quality),
            },
            Some(250),
        ),
        Codec::ProRes => ("QUICKTIME", "PRORES", HostRateControl::Profile, None),
    }
}

/// Describe the scene for `request`, rendering to `output`.
pub fn build_host_setup(
    request: &EncodeRequest,
    output: &Path,
    status_file: Option<&Path>,
) -> SeqvidResult<(HostSetup, AlphaHandling)> {
    request.validate()?;
    let alpha = request.alpha_handling();
    let (container, codec, rate_control, gop_size) = host_codec(request.codec, request.quality);
    let seq = &request.sequence;

    let setup = HostSetup {
        image_directory: seq.directory.clone(),
        files: seq.file_names(),
        frame_start: seq.first_index,
        frame_end: seq.last_index,
        fps: request.fps,
        container: container.to_string(),
        codec: codec.to_string(),
        rate_control,
        gop_size,
        color_mode: if alpha.is_preserved() { "RGBA" } else { "RGB" }.to_string(),
        film_transparent: alpha.is_preserved(),
        resolution: request.resolution,
        color_management: request.color.clone(),
        output_path: output.to_path_buf(),
        status_file: status_file.map(Path::to_path_buf),
    };
    Ok((setup, alpha))
}

/// Save `setup` as pretty JSON, going through a temporary sibling so a
/// reader never sees a half-written file.
pub fn write_setup(setup: &HostSetup, path: &Path) -> SeqvidResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(setup)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    tracing::info!("wrote host setup {}", path.display());
    Ok(())
}

pub fn read_setup(path: &Path) -> SeqvidResult<HostSetup> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Expand `{setup}`, `{output}` and `{status}` in an argument template.
pub fn host_command(
    binary: &Path,
    template: &[String],
    setup: &Path,
    output: &Path,
    status_file: Option<&Path>,
) -> EncoderCommand {
    let status = status_file
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let setup = setup.to_string_lossy();
    let output = output.to_string_lossy();
    let args = template
        .iter()
        .map(|arg| {
            arg.replace("{setup}", &setup)
                .replace("{output}", &output)
                .replace("{status}", &status)
        })
        .collect();
    EncoderCommand {
        program: binary.to_path_buf(),
        args,
    }
}
