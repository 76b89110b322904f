use std::path::{Path, PathBuf};

use seqvid_core::{AlphaHandling, Codec, EncodeRequest, ImageSequence, Quality, SeqvidError, SeqvidResult};

/// A fully resolved encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EncoderCommand {
    /// Shell-like rendering for logs. Not meant to be re-parsed.
    pub fn display(&self) -> String {
        let mut out = quote(&self.program.to_string_lossy());
        for arg in &self.args {
            out.push(' ');
            out.push_str(&quote(arg));
        }
        out
    }
}

fn quote(token: &str) -> String {
    if !token.is_empty() && !token.contains(|c: char| c.is_whitespace() || c == '"') {
        token.to_string()
    } else {
        format!("\"{}\"", token.replace('"', "\\\""))
    }
}

/// Codec-specific FFmpeg arguments plus the container they target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecArgs {
    pub extension: &'static str,
    pub args: Vec<String>,
    pub pixel_format: &'static str,
}

/// Constant rate factor for the CRF codecs. Lower is better quality.
pub fn crf_for(quality: Quality) -> u8 {
    match quality {
        Quality::Lowest => 28,
        Quality::Low => 24,
        Quality::Medium => 20,
        Quality::High => 16,
        Quality::Highest => 12,
    }
}

/// `prores_ks` profile: 0 Proxy, 1 LT, 2 Standard, 3 HQ, 4 4444, 5 4444 XQ.
///
/// Alpha needs a 4444 profile whatever the quality.
pub fn prores_profile(quality: Quality, alpha: bool) -> u8 {
    if alpha {
        return if quality == Quality::Highest { 5 } else { 4 };
    }
    quality.rank() as u8
}

/// Encoder library, rate control and pixel format for `codec`.
pub fn codec_args(codec: Codec, quality: Quality, alpha: bool) -> CodecArgs {
    let alpha = alpha && codec.supports_alpha();
    let crf = crf_for(quality).to_string();
    let owned = |tokens: &[&str]| tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>();

    match codec {
        Codec::H264 => CodecArgs {
            extension: codec.extension(),
            pixel_format: "yuv420p",
            args: owned(&[
                "-c:v", "libx264",
                "-preset", "medium",
                "-crf", &crf,
                "-pix_fmt", "yuv420p",
                "-movflags", "+faststart",
            ]),
        },
        Codec::Vp9 => {
            let pixel_format = if alpha { "yuva420p" } else { "yuv420p" };
            CodecArgs {
                extension: codec.extension(),
                pixel_format,
                args: owned(&[
                    "-c:v", "libvpx-vp9",
                    "-crf", &crf,
                    "-b:v", "0",
                    "-pix_fmt", pixel_format,
                    "-row-mt", "1",
                ]),
            }
        }
        Codec::Av1 => CodecArgs {
            extension: codec.extension(),
            pixel_format: "yuv420p",
            args: owned(&[
                "-c:v", "libaom-av1",
                "-crf", &crf,
                "-b:v", "0",
                "-pix_fmt", "yuv420p",
                "-cpu-used", "4",
                "-row-mt", "1",
            ]),
        },
        Codec::ProRes => {
            let profile = prores_profile(quality, alpha);
            let pixel_format = match (alpha, profile >= 4) {
                (true, _) => "yuva444p10le",
                (false, true) => "yuv444p10le",
                (false, false) => "yuv422p10le",
            };
            CodecArgs {
                extension: codec.extension(),
                pixel_format,
                args: owned(&[
                    "-c:v", "prores_ks",
                    "-profile:v", &profile.to_string(),
                    "-pix_fmt", pixel_format,
                ]),
            }
        }
    }
}

/// printf-style input pattern for FFmpeg's image2 demuxer, e.g.
/// `/renders/shot/render.%04d.png`. Falls back to `%d` when no single
/// zero-padded width reproduces every frame name.
pub fn input_pattern(sequence: &ImageSequence) -> SeqvidResult<String> {
    let numbers = match pattern_width(sequence) {
        Some(width) if width > 1 => format!("%0{}d", width),
        _ => "%d".to_string(),
    };
    let file = format!(
        "{}{}.{}",
        sequence.prefix.replace('%', "%%"),
        numbers,
        sequence.extension
    );
    path_arg(&sequence.directory.join(file))
}

/// The `%0Nd` width that formats every frame number back to its file name.
///
/// `f_999` and `f_1000` still match `%03d`, since printf only pads up to the
/// width and never truncates.
fn pattern_width(sequence: &ImageSequence) -> Option<usize> {
    let width = sequence.frames.iter().map(|f| f.numeric_text.len()).min()?;
    sequence
        .frames
        .iter()
        .all(|f| f.numeric_text == format!("{:0width$}", f.numeric_value, width = width))
        .then_some(width)
}

/// fps as FFmpeg expects it: `24`, `29.97`.
pub fn format_fps(fps: f64) -> String {
    format!("{}", fps)
}

fn path_arg(path: &Path) -> SeqvidResult<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        SeqvidError::InvalidArgument(format!("path is not valid UTF-8: {}", path.display()))
    })
}

/// Build the FFmpeg invocation for `request`, writing to `output`.
///
/// The same request and paths always produce the same tokens.
pub fn build_ffmpeg_command(
    ffmpeg: &Path,
    request: &EncodeRequest,
    output: &Path,
    progress_file: Option<&Path>,
) -> SeqvidResult<(EncoderCommand, AlphaHandling)> {
    request.validate()?;
    let alpha = request.alpha_handling();
    let codec = codec_args(request.codec, request.quality, alpha.is_preserved());

    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-nostats"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(progress) = progress_file {
        args.push("-progress".to_string());
        args.push(path_arg(progress)?);
    }
    args.push("-framerate".to_string());
    args.push(format_fps(request.fps));
    args.push("-start_number".to_string());
    args.push(request.sequence.first_index.to_string());
    args.push("-i".to_string());
    args.push(input_pattern(&request.sequence)?);
    args.extend(codec.args);
    args.push(path_arg(output)?);

    Ok((
        EncoderCommand {
            program: ffmpeg.to_path_buf(),
            args,
        },
        alpha,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqvid_core::FrameToken;

    fn request(names: &[&str], codec: Codec) -> EncodeRequest {
        let frames = names.iter().map(|n| FrameToken::parse(n).unwrap()).collect();
        let seq = ImageSequence::from_frames("/renders/shot", frames).unwrap();
        let mut req = EncodeRequest::new(seq, "/renders/videos");
        req.codec = codec;
        req
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_crf_is_monotonic() {
        let values: Vec<u8> = Quality::all().iter().map(|q| crf_for(*q)).collect();
        assert!(values.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_pattern_and_start_number() {
        let req = request(&["render.0007.png", "render.0008.png"], Codec::H264);
        let (cmd, _) = build_ffmpeg_command(
            Path::new("ffmpeg"),
            &req,
            Path::new("/renders/videos/render_v001.mp4"),
            None,
        )
        .unwrap();
        let pattern = value_after(&cmd.args, "-i").unwrap();
        assert!(pattern.ends_with("render.%04d.png"), "{}", pattern);
        assert_eq!(value_after(&cmd.args, "-start_number"), Some("7"));
        assert_eq!(value_after(&cmd.args, "-framerate"), Some("24"));
        assert_eq!(cmd.args.last().unwrap(), "/renders/videos/render_v001.mp4");
    }

    #[test]
    fn test_unpadded_and_percent_prefix() {
        let req = request(&["50%_1.png", "50%_2.png", "50%_10.png"], Codec::H264);
        let pattern = input_pattern(&req.sequence).unwrap();
        assert!(pattern.ends_with("50%%_%d.png"), "{}", pattern);
    }

    #[test]
    fn test_padding_overflow_keeps_padded_pattern() {
        let req = request(&["f_001.png", "f_002.png", "f_999.png", "f_1000.png"], Codec::H264);
        assert_eq!(req.sequence.padding(), None);
        let pattern = input_pattern(&req.sequence).unwrap();
        assert!(pattern.ends_with("f_%03d.png"), "{}", pattern);
        assert_eq!(format!("f_{:03}.png", req.sequence.first_index), "f_001.png");
    }

    #[test]
    fn test_inconsistent_padding_falls_back_to_plain() {
        let req = request(&["f_001.png", "f_02.png", "f_3.png"], Codec::H264);
        let pattern = input_pattern(&req.sequence).unwrap();
        assert!(pattern.ends_with("f_%d.png"), "{}", pattern);
    }

    #[test]
    fn test_h264_alpha_is_dropped() {
        let mut req = request(&["a_01.png", "a_02.png"], Codec::H264);
        req.preserve_alpha = true;
        let (cmd, alpha) =
            build_ffmpeg_command(Path::new("ffmpeg"), &req, Path::new("/o/a_v001.mp4"), None).unwrap();
        assert!(matches!(alpha, AlphaHandling::Dropped(_)));
        assert_eq!(value_after(&cmd.args, "-pix_fmt"), Some("yuv420p"));
        assert!(!cmd.args.iter().any(|a| a.starts_with("yuva")));
    }

    #[test]
    fn test_vp9_alpha() {
        let mut req = request(&["a_01.png", "a_02.png"], Codec::Vp9);
        req.preserve_alpha = true;
        let (cmd, alpha) =
            build_ffmpeg_command(Path::new("ffmpeg"), &req, Path::new("/o/a_v001.webm"), None).unwrap();
        assert!(alpha.is_preserved());
        assert_eq!(value_after(&cmd.args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&cmd.args, "-pix_fmt"), Some("yuva420p"));
    }

    #[test]
    fn test_prores_profiles() {
        let opaque = codec_args(Codec::ProRes, Quality::Low, false);
        assert_eq!(opaque.extension, "mov");
        assert_eq!(value_after(&opaque.args, "-profile:v"), Some("1"));
        assert_eq!(opaque.pixel_format, "yuv422p10le");

        let alpha = codec_args(Codec::ProRes, Quality::Lowest, true);
        assert_eq!(value_after(&alpha.args, "-profile:v"), Some("4"));
        assert_eq!(alpha.pixel_format, "yuva444p10le");

        assert_eq!(prores_profile(Quality::Highest, true), 5);
        assert_eq!(codec_args(Codec::ProRes, Quality::Highest, false).pixel_format, "yuv444p10le");
    }

    #[test]
    fn test_jpeg_source_never_gets_alpha() {
        let mut req = request(&["a_01.jpg", "a_02.jpg"], Codec::ProRes);
        req.preserve_alpha = true;
        let (cmd, alpha) =
            build_ffmpeg_command(Path::new("ffmpeg"), &req, Path::new("/o/a_v001.mov"), None).unwrap();
        assert!(!alpha.is_preserved());
        assert_eq!(value_after(&cmd.args, "-pix_fmt"), Some("yuv422p10le"));
    }

    #[test]
    fn test_codec_container_mapping() {
        assert_eq!(codec_args(Codec::H264, Quality::Medium, false).extension, "mp4");
        assert_eq!(codec_args(Codec::Vp9, Quality::Medium, false).extension, "webm");
        let av1 = codec_args(Codec::Av1, Quality::Medium, true);
        assert_eq!(av1.extension, "webm");
        assert_eq!(value_after(&av1.args, "-c:v"), Some("libaom-av1"));
        assert_eq!(av1.pixel_format, "yuv420p");
    }

    #[test]
    fn test_deterministic() {
        let mut req = request(&["s.001.exr", "s.002.exr", "s.004.exr"], Codec::Vp9);
        req.fps = 29.97;
        req.quality = Quality::High;
        let out = Path::new("/o/s_v003.webm");
        let progress = Path::new("/tmp/p.txt");
        let a = build_ffmpeg_command(Path::new("/usr/bin/ffmpeg"), &req, out, Some(progress)).unwrap();
        let b = build_ffmpeg_command(Path::new("/usr/bin/ffmpeg"), &req, out, Some(progress)).unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(value_after(&a.0.args, "-framerate"), Some("29.97"));
        assert_eq!(value_after(&a.0.args, "-progress"), Some("/tmp/p.txt"));
    }

    #[test]
    fn test_invalid_fps_rejected() {
        let mut req = request(&["a_1.png", "a_2.png"], Codec::H264);
        req.fps = 500.0;
        assert!(build_ffmpeg_command(Path::new("ffmpeg"), &req, Path::new("/o/x.mp4"), None).is_err());
    }

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = EncoderCommand {
            program: PathBuf::from("ffmpeg"),
            args: vec!["-i".into(), "/my renders/a_%04d.png".into()],
        };
        assert_eq!(cmd.display(), "ffmpeg -i \"/my renders/a_%04d.png\"");
    }
}
