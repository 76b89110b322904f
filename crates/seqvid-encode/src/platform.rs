//! OS-specific process plumbing: hidden consoles, process groups, signals.

use std::io;
use std::process::{Child, Command};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Never pop up a console window for this command (Windows only).
pub fn hide_console(cmd: &mut Command) {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(windows))]
    let _ = cmd;
}

/// Run the child without a console and, on Unix, as leader of its own
/// process group so signals reach everything it spawns.
pub fn detach(cmd: &mut Command) {
    hide_console(cmd);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
}

/// Politely ask the child and its descendants to exit.
#[cfg(unix)]
pub fn terminate(child: &Child) -> io::Result<()> {
    signal_group(child, libc::SIGTERM)
}

/// Forcefully kill the child and its descendants.
#[cfg(unix)]
pub fn kill(child: &mut Child) -> io::Result<()> {
    let group = signal_group(child, libc::SIGKILL);
    match child.kill() {
        Ok(()) => group,
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => group,
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(windows)]
pub fn terminate(child: &Child) -> io::Result<()> {
    taskkill(child.id(), false)
}

#[cfg(windows)]
pub fn kill(child: &mut Child) -> io::Result<()> {
    let tree = taskkill(child.id(), true);
    let _ = child.kill();
    tree
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) -> io::Result<()> {
    let mut cmd = Command::new("taskkill");
    cmd.arg("/T");
    if force {
        cmd.arg("/F");
    }
    cmd.arg("/PID").arg(pid.to_string());
    cmd.stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    hide_console(&mut cmd);
    cmd.status().map(|_| ())
}

#[cfg(not(any(unix, windows)))]
pub fn terminate(child: &Child) -> io::Result<()> {
    let _ = child;
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn kill(child: &mut Child) -> io::Result<()> {
    child.kill()
}
