//! Locating encoder executables.
//!
//! FFmpeg is looked up in order: the configured path, `PATH`, then the usual
//! install locations for the current OS. Every candidate must answer
//! `-version` successfully before it is accepted.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use seqvid_core::{SeqvidError, SeqvidResult};

use crate::platform;

#[cfg(windows)]
const FFMPEG_EXE: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_EXE: &str = "ffmpeg";

/// How long a candidate may take to answer `-version`.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

const VERIFY_POLL: Duration = Duration::from_millis(25);

/// Check that `path` runs and exits successfully with `-version` within
/// [`VERIFY_TIMEOUT`].
pub fn verify_encoder(path: &Path) -> bool {
    verify_encoder_within(path, VERIFY_TIMEOUT)
}

/// [`verify_encoder`] with an explicit deadline. A candidate still running
/// at the deadline is killed and rejected.
pub fn verify_encoder_within(path: &Path, timeout: Duration) -> bool {
    if !path.is_file() {
        return false;
    }
    let mut cmd = Command::new(path);
    cmd.arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    platform::hide_console(&mut cmd);
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!("{} did not start: {}", path.display(), e);
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) if Instant::now() < deadline => std::thread::sleep(VERIFY_POLL),
            Ok(None) => {
                tracing::warn!(
                    "{} did not answer -version within {:?}; skipping",
                    path.display(),
                    timeout
                );
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
            Err(e) => {
                tracing::debug!("lost track of {}: {}", path.display(), e);
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
        }
    }
}

/// Every `dir/exe` on `PATH` that exists, in `PATH` order.
pub fn search_path(exe: &str) -> Vec<PathBuf> {
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(exe))
        .filter(|candidate| candidate.is_file())
        .collect()
}

/// Common FFmpeg install locations for this platform.
pub fn common_ffmpeg_locations() -> Vec<PathBuf> {
    let home = dirs::home_dir();
    let mut paths: Vec<PathBuf> = Vec::new();

    if cfg!(windows) {
        let program_files = std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        let program_files_x86 = std::env::var_os("ProgramFiles(x86)")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        paths.push(PathBuf::from(r"C:\ffmpeg\bin\ffmpeg.exe"));
        paths.push(PathBuf::from(r"C:\ffmpeg\ffmpeg.exe"));
        paths.push(program_files.join(r"ffmpeg\bin\ffmpeg.exe"));
        paths.push(program_files.join(r"ffmpeg\ffmpeg.exe"));
        paths.push(program_files_x86.join(r"ffmpeg\bin\ffmpeg.exe"));
        paths.push(program_files.join(r"Shotcut\ffmpeg.exe"));
        paths.push(PathBuf::from(r"C:\ProgramData\chocolatey\bin\ffmpeg.exe"));
        if let Some(home) = &home {
            paths.push(home.join(r"ffmpeg\bin\ffmpeg.exe"));
            paths.push(home.join(r"scoop\shims\ffmpeg.exe"));
            paths.push(home.join(r"scoop\apps\ffmpeg\current\bin\ffmpeg.exe"));
        }
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            paths.push(PathBuf::from(local).join(r"Programs\ffmpeg\bin\ffmpeg.exe"));
        }
    } else if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/opt/homebrew/bin/ffmpeg"));
        paths.push(PathBuf::from("/usr/local/bin/ffmpeg"));
        paths.push(PathBuf::from("/opt/local/bin/ffmpeg"));
        paths.push(PathBuf::from("/Applications/FFmpeg/ffmpeg"));
        if let Some(home) = &home {
            paths.push(home.join("bin/ffmpeg"));
        }
    } else {
        paths.push(PathBuf::from("/usr/bin/ffmpeg"));
        paths.push(PathBuf::from("/usr/local/bin/ffmpeg"));
        paths.push(PathBuf::from("/snap/bin/ffmpeg"));
        paths.push(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        if let Some(home) = &home {
            paths.push(home.join(".local/bin/ffmpeg"));
            paths.push(home.join("bin/ffmpeg"));
        }
    }
    paths
}

/// Find a working FFmpeg, preferring `configured` when it verifies.
pub fn find_ffmpeg(configured: Option<&Path>) -> SeqvidResult<PathBuf> {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        if verify_encoder(path) {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "configured ffmpeg {} did not run; falling back to auto-detection",
            path.display()
        );
    }

    let found = search_path(FFMPEG_EXE)
        .into_iter()
        .chain(common_ffmpeg_locations())
        .find(|candidate| verify_encoder(candidate));

    match found {
        Some(path) => {
            tracing::debug!("using ffmpeg at {}", path.display());
            Ok(path)
        }
        None => Err(SeqvidError::ffmpeg_not_found()),
    }
}

/// Resolve the host application executable.
///
/// A bare name (`blender`) is looked up on `PATH`; anything else must exist.
pub fn find_host(configured: Option<&Path>) -> SeqvidResult<PathBuf> {
    let not_found = |detail: String| SeqvidError::EncoderNotFound {
        name: "host application".to_string(),
        remediation: detail,
    };
    let Some(binary) = configured.filter(|p| !p.as_os_str().is_empty()) else {
        return Err(not_found(
            "Set `host.binary` in seqvid.toml to the application used for headless renders."
                .to_string(),
        ));
    };
    if binary.is_file() {
        return Ok(binary.to_path_buf());
    }
    let is_bare = binary.components().count() == 1;
    if is_bare {
        if let Some(name) = binary.to_str() {
            let mut names = vec![name.to_string()];
            if cfg!(windows) && binary.extension().is_none() {
                names.insert(0, format!("{}.exe", name));
            }
            if let Some(found) = names.iter().find_map(|n| search_path(n).into_iter().next()) {
                return Ok(found);
            }
        }
    }
    Err(not_found(format!(
        "{} does not exist; check `host.binary` in seqvid.toml.",
        binary.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_rejects_missing_binary() {
        assert!(!verify_encoder(Path::new("/definitely/not/here/ffmpeg")));
    }

    #[test]
    fn test_common_locations_not_empty() {
        assert!(!common_ffmpeg_locations().is_empty());
    }

    #[test]
    fn test_find_ffmpeg_does_not_panic() {
        // Result depends on the machine; only the error shape is checked.
        if let Err(e) = find_ffmpeg(Some(Path::new("/definitely/not/here/ffmpeg"))) {
            assert!(matches!(e, SeqvidError::EncoderNotFound { .. }));
        }
    }

    #[test]
    fn test_find_host_requires_configuration() {
        let err = find_host(None).unwrap_err();
        assert!(err.to_string().contains("host.binary"));
        let err = find_host(Some(Path::new("/definitely/not/here/host"))).unwrap_err();
        assert!(matches!(err, SeqvidError::EncoderNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_host_on_path() {
        let found = find_host(Some(Path::new("sh"))).unwrap();
        assert!(found.ends_with("sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_candidate_is_rejected_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("seqvid_discovery_hang_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let stub = dir.join("ffmpeg");
        std::fs::write(&stub, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = Instant::now();
        assert!(!verify_encoder_within(&stub, Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(10));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_quick_candidate_is_accepted() {
        let truthy = Path::new("/bin/true");
        if truthy.is_file() {
            assert!(verify_encoder(truthy));
        }
    }
}
