mod convert;
mod detect;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seqvid_core::{Backend, Codec, Quality, SeqvidConfig};

#[derive(Parser)]
#[command(
    name = "seqvid",
    version,
    about = "seqvid: turn numbered image frames into a video",
    long_about = "seqvid finds image sequences in a folder, builds the encoder invocation for the\nchosen codec and quality, and supervises the encoder until the video is written\nto <render folder>/videos/<name>_vNNN.<ext>."
)]
struct Cli {
    /// Config file (default: ./seqvid.toml, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the image sequences found at a path
    Detect {
        /// A frame directory, one frame of a sequence, or a path prefix
        #[arg()]
        path: PathBuf,

        /// Only report the sequence with this prefix
        #[arg(long)]
        sequence: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Encode an image sequence into a versioned video
    Convert(ConvertArgs),

    /// Check encoder availability and configuration
    Doctor,
}

#[derive(clap::Args)]
pub(crate) struct ConvertArgs {
    /// A frame directory, one frame of a sequence, or a path prefix
    #[arg()]
    path: PathBuf,

    /// Pick among several sequences by prefix
    #[arg(long)]
    sequence: Option<String>,

    /// h264, vp9, av1 or prores
    #[arg(short, long)]
    codec: Option<Codec>,

    /// lowest, low, medium, high or highest
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Frames per second (1-120)
    #[arg(long)]
    fps: Option<f64>,

    /// Keep the alpha channel when the codec and source allow it
    #[arg(long)]
    alpha: bool,

    /// ffmpeg or host
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Render folder receiving videos/ and setup_files/ (default: parent of the frames)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output resolution as WIDTHxHEIGHT (host backend)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// What to do with the host setup: render, open or setup-only
    #[arg(long, value_enum, default_value_t = HostAction::Render)]
    action: HostAction,

    /// Print the encoder command without running it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum HostAction {
    /// Headless render, supervised until done
    Render,
    /// Open the setup in an interactive host instance
    Open,
    /// Only write the setup artifact
    SetupOnly,
}

fn parse_resolution(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("resolution must be non-zero".to_string());
    }
    Ok((w, h))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    // Logs go to stderr so `detect --json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, config_path) =
        SeqvidConfig::discover(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = &config_path {
        tracing::debug!("using config {}", path.display());
    }

    match cli.command {
        Commands::Detect {
            path,
            sequence,
            json,
        } => detect::cmd_detect(&path, sequence.as_deref(), json, &config),
        Commands::Convert(args) => convert::cmd_convert(args, &config),
        Commands::Doctor => cmd_doctor(&config, config_path.as_deref()),
    }
}

pub(crate) fn run_async<F, T>(future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn cmd_doctor(config: &SeqvidConfig, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut warnings: Vec<String> = Vec::new();

    println!("🩺 seqvid doctor");
    println!("   CLI version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "   OS: {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!(
        "   Config: {}",
        config_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none found, using defaults)".to_string())
    );

    match seqvid_encode::find_ffmpeg(config.encoder.ffmpeg_path.as_deref()) {
        Ok(path) => println!("   FFmpeg: {}", path.display()),
        Err(e) => warnings.push(e.to_string()),
    }

    match &config.host.binary {
        Some(_) => match seqvid_encode::find_host(config.host.binary.as_deref()) {
            Ok(path) => println!("   Host encoder: {}", path.display()),
            Err(e) => warnings.push(e.to_string()),
        },
        None => println!("   Host encoder: (not configured)"),
    }

    let sort = config.sort.options();
    println!(
        "   Name sorting: {}",
        if sort.case_sensitive {
            "case-sensitive"
        } else {
            "case-insensitive"
        }
    );
    println!(
        "   Defaults: {} / {} / {} fps / {}",
        config.defaults.codec, config.defaults.quality, config.defaults.fps, config.defaults.backend
    );

    println!("   Codecs: {}", join_names(Codec::all()));
    println!("   Qualities: {}", join_names(Quality::all()));

    match seqvid_encode::WorkDir::create() {
        Ok(dir) => {
            let probe = dir.status_file();
            if let Err(e) = std::fs::write(&probe, b"{}") {
                warnings.push(format!("temp directory not writable: {}", e));
            }
            dir.remove();
        }
        Err(e) => warnings.push(format!("cannot create a work directory: {}", e)),
    }

    if warnings.is_empty() {
        println!("   Status: OK");
        return Ok(());
    }

    println!("   Status: WARN ({} issue(s))", warnings.len());
    for w in &warnings {
        println!("   - {}", w);
    }
    Ok(())
}

fn join_names<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&[Codec::H264, Codec::ProRes]), format!("{}, {}", Codec::H264, Codec::ProRes));
        assert_eq!(join_names::<Codec>(&[]), "");
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_resolution("640X480"), Ok((640, 480)));
        assert!(parse_resolution("1920").is_err());
        assert!(parse_resolution("0x10").is_err());
        assert!(parse_resolution("axb").is_err());
    }

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "seqvid", "convert", "/renders/shot", "--codec", "vp9", "--quality", "highest", "--alpha",
            "--fps", "30", "--action", "setup-only",
        ])
        .unwrap();
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.codec, Some(Codec::Vp9));
        assert_eq!(args.quality, Some(Quality::Highest));
        assert!(args.alpha);
        assert_eq!(args.fps, Some(30.0));
        assert_eq!(args.action, HostAction::SetupOnly);
    }

    #[test]
    fn test_cli_rejects_unknown_codec() {
        assert!(Cli::try_parse_from(["seqvid", "convert", "/x", "--codec", "mpeg2"]).is_err());
    }
}
