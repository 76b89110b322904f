//! Out-of-process encoder supervision.
//!
//! A [`ProcessSupervisor`] owns one child process and its [`ProcessHandle`].
//! The handle only changes inside [`ProcessSupervisor::poll`] and
//! [`ProcessSupervisor::cancel`]; every failure, including a failed spawn,
//! ends as a terminal `Failed` status rather than an error.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime};

use seqvid_core::{SeqvidError, SeqvidResult, SupervisorConfig};

use crate::ffmpeg::EncoderCommand;
use crate::platform;
use crate::progress::{FfmpegReport, OutputSizeSource, ProgressChain};

/// Lines of stderr quoted in a failure message.
const STDERR_TAIL_LINES: usize = 12;

/// Pause between `try_wait` checks while waiting for a cancelled child.
const CANCEL_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Observable state of one encode.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub start_time: SystemTime,
    pub status: ProcessStatus,
    /// In `[0, 1]`, never decreasing.
    pub last_known_progress: f64,
    pub stage: Option<String>,
    pub output_size_bytes: u64,
    pub error_message: Option<String>,
    /// Set on a `Completed` encode that looks short, e.g. FFmpeg stopping at a
    /// missing frame.
    pub warning: Option<String>,
    /// Final versioned path; only exists once `Completed`.
    pub output_path: PathBuf,
    started: Instant,
}

impl ProcessHandle {
    fn pending(output_path: PathBuf) -> Self {
        Self {
            pid: None,
            start_time: SystemTime::now(),
            status: ProcessStatus::Pending,
            last_known_progress: 0.0,
            stage: None,
            output_size_bytes: 0,
            error_message: None,
            warning: None,
            output_path,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The final result of a terminal handle.
    pub fn outcome(&self) -> SeqvidResult<PathBuf> {
        match self.status {
            ProcessStatus::Completed => Ok(self.output_path.clone()),
            ProcessStatus::Cancelled => Err(SeqvidError::Cancelled),
            ProcessStatus::Failed => Err(SeqvidError::EncodeFailed(
                self.error_message
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            )),
            ProcessStatus::Pending | ProcessStatus::Running => Err(SeqvidError::EncodeFailed(
                format!("encode is still {}", self.status),
            )),
        }
    }
}

/// Per-run scratch directory: `<temp>/seqvid-<id>/`.
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn create() -> SeqvidResult<Self> {
        let root = std::env::temp_dir().join(format!("seqvid-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join("status.json")
    }

    pub fn progress_file(&self) -> PathBuf {
        self.root.join("progress.txt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("stderr.log")
    }

    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("could not remove {}: {}", self.root.display(), e);
            }
        }
    }
}

/// Everything the supervisor needs to run one encode.
pub struct EncodeJob {
    pub command: EncoderCommand,
    /// Where the child writes; moved onto `final_output` on success.
    pub partial_output: PathBuf,
    pub final_output: PathBuf,
    pub work_dir: WorkDir,
    pub env: Vec<(String, OsString)>,
    pub progress: ProgressChain,
    /// FFmpeg `-progress` file and the frame count it should reach.
    pub frame_check: Option<(PathBuf, u64)>,
}

impl EncodeJob {
    pub fn new(
        command: EncoderCommand,
        partial_output: impl Into<PathBuf>,
        final_output: impl Into<PathBuf>,
        work_dir: WorkDir,
    ) -> Self {
        Self {
            command,
            partial_output: partial_output.into(),
            final_output: final_output.into(),
            work_dir,
            env: Vec::new(),
            progress: ProgressChain::new().with(OutputSizeSource::new(None)),
            frame_check: None,
        }
    }

    /// Warn on completion if `progress_file` reports fewer than `frames`.
    pub fn with_frame_check(mut self, progress_file: impl Into<PathBuf>, frames: u64) -> Self {
        self.frame_check = Some((progress_file.into(), frames));
        self
    }

    pub fn with_progress(mut self, progress: ProgressChain) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// How long a terminated child gets before it is killed.
    pub cancel_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SupervisorConfig> for SupervisorOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            cancel_timeout: config.cancel_timeout(),
        }
    }
}

pub struct ProcessSupervisor {
    job: EncodeJob,
    child: Option<Child>,
    handle: ProcessHandle,
    options: SupervisorOptions,
    reported_error: Option<String>,
}

impl ProcessSupervisor {
    /// Spawn the job's command. Never fails: a spawn error yields a
    /// supervisor whose handle is already `Failed`.
    pub fn launch(job: EncodeJob, options: SupervisorOptions) -> Self {
        let handle = ProcessHandle::pending(job.final_output.clone());
        let mut supervisor = Self {
            job,
            child: None,
            handle,
            options,
            reported_error: None,
        };

        match supervisor.spawn() {
            Ok(child) => {
                tracing::info!(
                    "started {} (pid {})",
                    supervisor.job.command.program.display(),
                    child.id()
                );
                tracing::debug!("progress sources: {:?}", supervisor.job.progress.names());
                supervisor.handle.pid = Some(child.id());
                supervisor.handle.start_time = SystemTime::now();
                supervisor.handle.status = ProcessStatus::Running;
                supervisor.child = Some(child);
            }
            Err(e) => {
                let message = SeqvidError::launch(&supervisor.job.command.program, e.to_string());
                supervisor.fail(message.to_string());
            }
        }
        supervisor
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let command = &self.job.command;
        tracing::debug!("spawning: {}", command.display());

        let stderr = match File::create(self.job.work_dir.log_file()) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                tracing::warn!("stderr log unavailable, discarding: {}", e);
                Stdio::null()
            }
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr);
        for (key, value) in &self.job.env {
            cmd.env(key, value);
        }
        platform::detach(&mut cmd);
        cmd.spawn()
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.handle.status.is_terminal()
    }

    /// One non-blocking tick: check for exit, refresh progress, classify.
    pub fn poll(&mut self) -> &ProcessHandle {
        if self.is_finished() {
            return &self.handle;
        }
        let Some(child) = self.child.as_mut() else {
            self.fail("encoder process was never started".to_string());
            return &self.handle;
        };

        match child.try_wait() {
            Ok(None) => self.refresh_progress(),
            Ok(Some(status)) => {
                self.child = None;
                self.refresh_progress();
                self.classify(status);
            }
            Err(e) => {
                if let Some(mut child) = self.child.take() {
                    let _ = platform::kill(&mut child);
                    let _ = child.wait();
                }
                self.fail(format!("lost track of encoder process: {}", e));
            }
        }
        &self.handle
    }

    /// Terminate the child (and its children), escalating to a kill after
    /// `cancel_timeout`. Blocks for at most that bound.
    pub fn cancel(&mut self) -> &ProcessHandle {
        if self.is_finished() {
            return &self.handle;
        }
        if let Some(mut child) = self.child.take() {
            tracing::info!("cancelling encoder (pid {})", child.id());
            if let Err(e) = platform::terminate(&child) {
                tracing::warn!("terminate failed: {}", e);
            }
            let deadline = Instant::now() + self.options.cancel_timeout;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => std::thread::sleep(CANCEL_POLL),
                    _ => {
                        tracing::warn!("encoder ignored termination; killing");
                        if let Err(e) = platform::kill(&mut child) {
                            tracing::warn!("kill failed: {}", e);
                        }
                        let _ = child.wait();
                        break;
                    }
                }
            }
        }
        self.discard_partial();
        self.handle.status = ProcessStatus::Cancelled;
        self.handle.stage = Some("cancelled".to_string());
        self.job.work_dir.remove();
        &self.handle
    }

    fn output_bytes(&self) -> u64 {
        std::fs::metadata(&self.job.partial_output)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn refresh_progress(&mut self) {
        let bytes = self.output_bytes();
        let sample = self.job.progress.sample(bytes);
        self.handle.output_size_bytes = bytes;
        if let Some(fraction) = sample.fraction {
            self.handle.last_known_progress = self.handle.last_known_progress.max(fraction);
        }
        if sample.stage.is_some() {
            self.handle.stage = sample.stage;
        }
        if sample.error.is_some() {
            self.reported_error = sample.error;
        }
    }

    fn classify(&mut self, status: ExitStatus) {
        if !status.success() {
            let detail = self
                .reported_error
                .clone()
                .or_else(|| stderr_tail(&self.job.work_dir.log_file()))
                .unwrap_or_else(|| "no diagnostic output".to_string());
            self.fail(format!("encoder {}: {}", status, detail));
            return;
        }

        let bytes = self.output_bytes();
        if bytes == 0 {
            self.fail(format!(
                "encoder exited successfully but produced no output for {}",
                self.job.final_output.display()
            ));
            return;
        }

        if let Err(e) = std::fs::rename(&self.job.partial_output, &self.job.final_output) {
            self.fail(format!(
                "could not move output into place at {}: {}",
                self.job.final_output.display(),
                e
            ));
            return;
        }

        tracing::info!("wrote {}", self.job.final_output.display());
        if let Some(warning) = self.short_encode() {
            tracing::warn!("{}", warning);
            self.handle.warning = Some(warning);
        }
        self.handle.status = ProcessStatus::Completed;
        self.handle.output_size_bytes = bytes;
        self.handle.last_known_progress = 1.0;
        self.handle.stage = Some("done".to_string());
        self.job.work_dir.remove();
    }

    fn short_encode(&self) -> Option<String> {
        let (progress_file, expected) = self.job.frame_check.as_ref()?;
        let encoded = FfmpegReport::read(progress_file)?.frame?;
        (encoded < *expected).then(|| {
            format!(
                "encoder wrote {} of {} frame(s); the sequence likely has a gap",
                encoded, expected
            )
        })
    }

    fn fail(&mut self, message: String) {
        tracing::error!("{}", message);
        self.discard_partial();
        self.handle.status = ProcessStatus::Failed;
        self.handle.error_message = Some(message);
        self.job.work_dir.remove();
    }

    fn discard_partial(&self) {
        if let Err(e) = std::fs::remove_file(&self.job.partial_output) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", self.job.partial_output.display(), e);
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.handle.status == ProcessStatus::Running {
            self.cancel();
        }
    }
}

/// Last non-empty lines of the stderr log, joined.
fn stderr_tail(log: &Path) -> Option<String> {
    let file = File::open(log).ok()?;
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    if tail.is_empty() {
        None
    } else {
        Some(Vec::from(tail).join("\n"))
    }
}
