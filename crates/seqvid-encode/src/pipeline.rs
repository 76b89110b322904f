//! Glue between a request and a running encode: reserve the versioned
//! output, build the backend's command, and assemble the progress chain.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use seqvid_core::version::version_tag;
use seqvid_core::{
    reserve_output, AlphaHandling, Codec, EncodeRequest, HostConfig, ImageSequence,
    OutputReservation, SeqvidError, SeqvidResult, VersionedPath,
};

use crate::ffmpeg::{build_ffmpeg_command, EncoderCommand};
use crate::host::{build_host_setup, host_bitrate_kbps, host_command, write_setup, STATUS_FILE_ENV};
use crate::platform;
use crate::progress::{FfmpegProgressSource, OutputSizeSource, ProgressChain, StatusFileSource};
use crate::supervisor::{EncodeJob, ProcessSupervisor, SupervisorOptions, WorkDir};

pub const VIDEOS_DIR: &str = "videos";
pub const SETUP_DIR: &str = "setup_files";

/// `<render_folder>/videos`, where the render folder is the parent of the
/// image directory.
pub fn default_output_directory(sequence: &ImageSequence) -> PathBuf {
    sequence
        .directory
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(sequence.directory.as_path())
        .join(VIDEOS_DIR)
}

/// `setup_files` next to the videos directory.
pub fn setup_directory_for(output_directory: &Path) -> PathBuf {
    match output_directory.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(SETUP_DIR),
        _ => output_directory.join(SETUP_DIR),
    }
}

/// `<stem>_setup.<ext>` for one version.
pub fn setup_file_name(base_name: &str, version: u32, extension: &str) -> String {
    format!("{}_{}_setup.{}", base_name, version_tag(version), extension)
}

/// Rough final size used when nothing better than file growth is available.
///
/// Bitrate tier times duration; ProRes is closer to the source size.
pub fn expected_output_bytes(request: &EncodeRequest) -> Option<u64> {
    if request.fps <= 0.0 || request.sequence.is_empty() {
        return None;
    }
    match request.codec {
        Codec::ProRes => {
            let total: u64 = request
                .sequence
                .frame_paths()
                .iter()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
            (total > 0).then_some(total)
        }
        _ => {
            let seconds = request.sequence.len() as f64 / request.fps;
            let bytes = seconds * host_bitrate_kbps(request.quality) as f64 * 1000.0 / 8.0;
            Some(bytes.round().max(1.0) as u64)
        }
    }
}

/// A reserved output and a ready-to-launch job.
pub struct PreparedEncode {
    pub output: VersionedPath,
    pub alpha: AlphaHandling,
    pub setup_path: Option<PathBuf>,
    pub job: EncodeJob,
}

impl PreparedEncode {
    pub fn command(&self) -> &EncoderCommand {
        &self.job.command
    }

    pub fn launch(self, options: SupervisorOptions) -> ProcessSupervisor {
        ProcessSupervisor::launch(self.job, options)
    }

    /// Give the reserved version back without running anything.
    pub fn abandon(self) {
        let _ = std::fs::remove_file(&self.job.partial_output);
        self.job.work_dir.remove();
    }
}

fn release_on_err<T>(reservation: &OutputReservation, result: SeqvidResult<T>) -> SeqvidResult<T> {
    if result.is_err() {
        reservation.release();
    }
    result
}

/// Reserve `<name>_vNNN.<ext>` and build the FFmpeg job for `request`.
pub fn prepare_ffmpeg(request: &EncodeRequest, ffmpeg: &Path) -> SeqvidResult<PreparedEncode> {
    request.validate()?;
    let base_name = request.sequence.base_name();
    let reservation = reserve_output(
        &request.output_directory,
        &base_name,
        request.codec.extension(),
        |_| None,
    )?;
    let prepared = ffmpeg_job(request, ffmpeg, &reservation);
    release_on_err(&reservation, prepared)
}

fn ffmpeg_job(
    request: &EncodeRequest,
    ffmpeg: &Path,
    reservation: &OutputReservation,
) -> SeqvidResult<PreparedEncode> {
    let work_dir = WorkDir::create()?;
    let progress_file = work_dir.progress_file();
    let (command, alpha) =
        match build_ffmpeg_command(ffmpeg, request, &reservation.partial, Some(&progress_file)) {
            Ok(built) => built,
            Err(e) => {
                work_dir.remove();
                return Err(e);
            }
        };

    let status_file = work_dir.status_file();
    let progress = ProgressChain::new()
        .with(StatusFileSource::new(&status_file))
        .with(FfmpegProgressSource::new(&progress_file, request.sequence.len() as u64))
        .with(OutputSizeSource::new(expected_output_bytes(request)));
    let job = EncodeJob::new(
        command,
        reservation.partial.clone(),
        reservation.output.full_path.clone(),
        work_dir,
    )
    .with_env(STATUS_FILE_ENV, status_file)
    .with_progress(progress)
    .with_frame_check(progress_file, request.sequence.len() as u64);

    Ok(PreparedEncode {
        output: reservation.output.clone(),
        alpha,
        setup_path: None,
        job,
    })
}

fn reserve_with_setup(request: &EncodeRequest, config: &HostConfig) -> SeqvidResult<OutputReservation> {
    let base_name = request.sequence.base_name();
    let setup_dir = setup_directory_for(&request.output_directory);
    reserve_output(
        &request.output_directory,
        &base_name,
        request.codec.extension(),
        |version| {
            Some(setup_dir.join(setup_file_name(
                &base_name,
                version,
                &config.project_extension,
            )))
        },
    )
}

fn reserved_setup_path(reservation: &OutputReservation) -> SeqvidResult<PathBuf> {
    reservation
        .companion
        .clone()
        .ok_or_else(|| SeqvidError::InvalidArgument("no setup path was reserved".to_string()))
}

/// Write the setup artifact and build a headless host render of it.
pub fn prepare_host(
    request: &EncodeRequest,
    host_binary: &Path,
    config: &HostConfig,
) -> SeqvidResult<PreparedEncode> {
    request.validate()?;
    let reservation = reserve_with_setup(request, config)?;
    let prepared = host_job(request, host_binary, config, &reservation);
    release_on_err(&reservation, prepared)
}

fn host_job(
    request: &EncodeRequest,
    host_binary: &Path,
    config: &HostConfig,
    reservation: &OutputReservation,
) -> SeqvidResult<PreparedEncode> {
    let setup_path = reserved_setup_path(reservation)?;
    let work_dir = WorkDir::create()?;
    let status_file = work_dir.status_file();

    let written = build_host_setup(request, &reservation.partial, Some(&status_file))
        .and_then(|(setup, alpha)| write_setup(&setup, &setup_path).map(|_| alpha));
    let alpha = match written {
        Ok(alpha) => alpha,
        Err(e) => {
            work_dir.remove();
            return Err(e);
        }
    };

    let command = host_command(
        host_binary,
        &config.render_args,
        &setup_path,
        &reservation.partial,
        Some(&status_file),
    );
    let progress = ProgressChain::new()
        .with(StatusFileSource::new(&status_file))
        .with(OutputSizeSource::new(expected_output_bytes(request)));
    let job = EncodeJob::new(
        command,
        reservation.partial.clone(),
        reservation.output.full_path.clone(),
        work_dir,
    )
    .with_env(STATUS_FILE_ENV, status_file)
    .with_progress(progress);

    Ok(PreparedEncode {
        output: reservation.output.clone(),
        alpha,
        setup_path: Some(setup_path),
        job,
    })
}

/// A setup artifact written for a later, unsupervised render.
#[derive(Debug, Clone)]
pub struct WrittenSetup {
    pub setup_path: PathBuf,
    pub output: VersionedPath,
    pub alpha: AlphaHandling,
}

/// Write the setup artifact only, targeting the final versioned path.
pub fn write_host_setup(request: &EncodeRequest, config: &HostConfig) -> SeqvidResult<WrittenSetup> {
    request.validate()?;
    let reservation = reserve_with_setup(request, config)?;
    let written = reserved_setup_path(&reservation).and_then(|setup_path| {
        let (setup, alpha) = build_host_setup(request, &reservation.output.full_path, None)?;
        write_setup(&setup, &setup_path)?;
        Ok(WrittenSetup {
            setup_path,
            output: reservation.output.clone(),
            alpha,
        })
    });
    // The setup file now holds the version; the placeholder is not needed.
    reservation.release();
    written
}

/// Open a written setup in an interactive host instance and return its pid.
pub fn open_in_host(host_binary: &Path, config: &HostConfig, written: &WrittenSetup) -> SeqvidResult<u32> {
    let command = host_command(
        host_binary,
        &config.open_args,
        &written.setup_path,
        &written.output.full_path,
        None,
    );
    launch_detached(&command)
}

/// Start a process we do not supervise.
pub fn launch_detached(command: &EncoderCommand) -> SeqvidResult<u32> {
    tracing::debug!("launching detached: {}", command.display());
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    platform::detach(&mut cmd);
    let child = cmd
        .spawn()
        .map_err(|e| SeqvidError::launch(&command.program, e.to_string()))?;
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqvid_core::{Quality, SequenceDetector, SortOptions};

    fn render_folder(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("seqvid_pipeline_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let frames = root.join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        for i in 1..=6 {
            std::fs::write(frames.join(format!("shot_{:04}.png", i)), vec![0u8; 100]).unwrap();
        }
        root
    }

    fn request(root: &Path, codec: Codec) -> EncodeRequest {
        let seq = SequenceDetector::new(SortOptions::case_sensitive(true))
            .detect_one(&root.join("frames"), None)
            .unwrap();
        let out = default_output_directory(&seq);
        let mut req = EncodeRequest::new(seq, out);
        req.codec = codec;
        req
    }

    #[test]
    fn test_layout_directories() {
        let root = render_folder("layout");
        let req = request(&root, Codec::H264);
        assert_eq!(req.output_directory, root.join("videos"));
        assert_eq!(setup_directory_for(&req.output_directory), root.join("setup_files"));
        assert_eq!(setup_file_name("shot", 3, "json"), "shot_v003_setup.json");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_prepare_ffmpeg_reserves_versions() {
        let root = render_folder("ffmpeg");
        let req = request(&root, Codec::H264);
        let first = prepare_ffmpeg(&req, Path::new("ffmpeg")).unwrap();
        assert_eq!(first.output.full_path, root.join("videos").join("shot_v001.mp4"));
        assert!(first.job.partial_output.exists());
        assert_eq!(first.command().args.last().map(PathBuf::from), Some(first.job.partial_output.clone()));
        assert!(first.command().args.iter().any(|a| a == "-progress"));

        let second = prepare_ffmpeg(&req, Path::new("ffmpeg")).unwrap();
        assert_eq!(second.output.version, 2);

        let partial = first.job.partial_output.clone();
        first.abandon();
        assert!(!partial.exists());
        let third = prepare_ffmpeg(&req, Path::new("ffmpeg")).unwrap();
        assert_eq!(third.output.version, 1);

        second.abandon();
        third.abandon();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_invalid_request_reserves_nothing() {
        let root = render_folder("invalid");
        let mut req = request(&root, Codec::H264);
        req.fps = 0.0;
        assert!(prepare_ffmpeg(&req, Path::new("ffmpeg")).is_err());
        assert!(!root.join("videos").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_prepare_host_writes_setup() {
        let root = render_folder("host");
        let req = request(&root, Codec::Vp9);
        let config = HostConfig::default();
        let prepared = prepare_host(&req, Path::new("/apps/host"), &config).unwrap();
        let setup = prepared.setup_path.clone().unwrap();
        assert_eq!(setup, root.join("setup_files").join("shot_v001_setup.json"));
        assert!(setup.exists());
        assert_eq!(prepared.output.full_path, root.join("videos").join("shot_v001.webm"));
        assert_eq!(prepared.command().args[1], setup.to_string_lossy());
        prepared.abandon();

        // The setup artifact alone keeps v001 taken.
        let next = prepare_host(&req, Path::new("/apps/host"), &config).unwrap();
        assert_eq!(next.output.version, 2);
        next.abandon();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_write_host_setup_targets_final_path() {
        let root = render_folder("setup_only");
        let req = request(&root, Codec::ProRes);
        let written = write_host_setup(&req, &HostConfig::default()).unwrap();
        let setup = crate::host::read_setup(&written.setup_path).unwrap();
        assert_eq!(setup.output_path, written.output.full_path);
        assert!(setup.status_file.is_none());
        assert!(!seqvid_core::version::partial_path(&written.output).exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_expected_output_bytes() {
        let root = render_folder("expected");
        let mut req = request(&root, Codec::H264);
        req.fps = 6.0;
        req.quality = Quality::Lowest;
        // One second at 2000 kbps.
        assert_eq!(expected_output_bytes(&req), Some(250_000));
        req.codec = Codec::ProRes;
        assert_eq!(expected_output_bytes(&req), Some(600));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_detached_reports_missing_binary() {
        let command = EncoderCommand {
            program: PathBuf::from("/definitely/not/here/host"),
            args: Vec::new(),
        };
        let err = launch_detached(&command).unwrap_err();
        assert!(matches!(err, SeqvidError::LaunchFailed { .. }));
    }
}
