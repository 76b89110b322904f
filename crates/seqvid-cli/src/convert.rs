use std::time::Duration;

use anyhow::{Context, Result};
use seqvid_core::format::{format_duration, format_percent, format_size};
use seqvid_core::{
    select, AlphaHandling, Backend, EncodeRequest, ImageSequence, SequenceDetector, SeqvidConfig,
};
use seqvid_encode::pipeline::{default_output_directory, open_in_host, VIDEOS_DIR};
use seqvid_encode::{
    find_ffmpeg, find_host, prepare_ffmpeg, prepare_host, write_host_setup, PreparedEncode,
    ProcessHandle, ProcessStatus, ProcessSupervisor, SupervisorOptions,
};

use crate::detect::describe_gaps;
use crate::{ConvertArgs, HostAction};

pub(crate) fn build_request(
    sequence: ImageSequence,
    args: &ConvertArgs,
    config: &SeqvidConfig,
) -> EncodeRequest {
    let output_directory = match &args.output_dir {
        Some(render_folder) => render_folder.join(VIDEOS_DIR),
        None => default_output_directory(&sequence),
    };
    let defaults = &config.defaults;
    let mut request = EncodeRequest::new(sequence, output_directory);
    request.codec = args.codec.unwrap_or(defaults.codec);
    request.quality = args.quality.unwrap_or(defaults.quality);
    request.fps = args.fps.unwrap_or(defaults.fps);
    request.preserve_alpha = args.alpha || defaults.preserve_alpha;
    request.backend = args.backend.unwrap_or(defaults.backend);
    request.resolution = args.resolution;
    request.color = config.color.clone();
    request
}

pub(crate) fn cmd_convert(args: ConvertArgs, config: &SeqvidConfig) -> Result<()> {
    let detector = SequenceDetector::new(config.sort.options());
    let sequence = select(detector.detect_path(&args.path)?, args.sequence.as_deref())?;

    println!("🎞️  seqvid v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Sequence: {} ({} frame(s))",
        sequence.display_pattern(),
        sequence.len()
    );
    if !sequence.is_contiguous {
        println!(
            "   ⚠️  {} missing frame(s): {}",
            sequence.missing_count(),
            describe_gaps(&sequence.gaps())
        );
    }

    let request = build_request(sequence, &args, config);
    request.validate()?;
    println!(
        "   Encode: {} / {} / {} fps via {}",
        request.codec, request.quality, request.fps, request.backend
    );

    let prepared = match request.backend {
        Backend::Ffmpeg => {
            let ffmpeg = find_ffmpeg(config.encoder.ffmpeg_path.as_deref())?;
            prepare_ffmpeg(&request, &ffmpeg)?
        }
        Backend::Host => match args.action {
            HostAction::SetupOnly => {
                let written = write_host_setup(&request, &config.host)?;
                report_alpha(&written.alpha);
                println!("   ✓ Setup written: {}", written.setup_path.display());
                println!("   Renders to: {}", written.output.full_path.display());
                return Ok(());
            }
            HostAction::Open => {
                let host = find_host(config.host.binary.as_deref())?;
                let written = write_host_setup(&request, &config.host)?;
                report_alpha(&written.alpha);
                let pid = open_in_host(&host, &config.host, &written)?;
                println!("   ✓ Setup written: {}", written.setup_path.display());
                println!("   Opened in host (pid {})", pid);
                return Ok(());
            }
            HostAction::Render => {
                let host = find_host(config.host.binary.as_deref())?;
                prepare_host(&request, &host, &config.host)?
            }
        },
    };

    report_alpha(&prepared.alpha);
    if let Some(setup) = &prepared.setup_path {
        println!("   Setup: {}", setup.display());
    }
    println!("   Output: {}", prepared.output.full_path.display());

    if args.dry_run {
        println!("   {}", prepared.command().display());
        prepared.abandon();
        return Ok(());
    }

    let options = SupervisorOptions::from(&config.supervisor);
    let interval = config.supervisor.poll_interval();
    let handle = crate::run_async(supervise(prepared, options, interval))?;
    finish(&handle)
}

fn report_alpha(alpha: &AlphaHandling) {
    match alpha {
        AlphaHandling::Preserved => println!("   Alpha: preserved"),
        AlphaHandling::Dropped(reason) => println!("   ⚠️  Alpha dropped: {}", reason),
        AlphaHandling::Opaque => {}
    }
}

/// Poll until the encode ends, cancelling on Ctrl-C.
async fn supervise(
    prepared: PreparedEncode,
    options: SupervisorOptions,
    interval: Duration,
) -> Result<ProcessHandle> {
    let mut supervisor: ProcessSupervisor = prepared.launch(options);
    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_line = String::new();

    while !supervisor.is_finished() {
        tokio::select! {
            _ = ticker.tick() => {
                let handle = supervisor.poll();
                let line = progress_line(handle);
                if handle.status == ProcessStatus::Running && line != last_line {
                    println!("   {}", line);
                    last_line = line;
                }
            }
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl-C")?;
                println!("   Cancelling...");
                supervisor.cancel();
            }
        }
    }
    Ok(supervisor.handle().clone())
}

pub(crate) fn progress_line(handle: &ProcessHandle) -> String {
    format!(
        "⏳ {} {} ({}, {})",
        handle.stage.as_deref().unwrap_or("encoding"),
        format_percent(handle.last_known_progress),
        format_size(handle.output_size_bytes),
        format_duration(handle.elapsed())
    )
}

fn finish(handle: &ProcessHandle) -> Result<()> {
    if handle.status == ProcessStatus::Cancelled {
        println!("   Conversion cancelled; no output was written.");
        return Ok(());
    }
    let path = handle
        .outcome()
        .with_context(|| format!("conversion to {} failed", handle.output_path.display()))?;
    println!(
        "   ✓ Wrote {} ({}) in {}",
        path.display(),
        format_size(handle.output_size_bytes),
        format_duration(handle.elapsed())
    );
    if let Some(warning) = &handle.warning {
        println!("   ⚠️  {}", warning);
    }
    Ok(())
}
