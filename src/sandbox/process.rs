//! Process-per-job sandbox.
//!
//! Each session owns a private scratch directory and one renderer process. The renderer sees a
//! cleared environment with only `PATH`, `TMPDIR`, `REPLAY_INPUT` (the injected payload) and
//! `REPLAY_OUTPUT` (where it must publish its frame list). Publishing must be atomic (write a
//! temporary file, then rename): a present, non-blank output file is treated as complete.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::foundation::config::ToolCommand;
use crate::foundation::core::{JobId, RenderJob, ReplayPayload};
use crate::foundation::error::{ReelError, ReelResult};
use crate::sandbox::session::{FrameSequence, RenderSession, SandboxLauncher};

const INPUT_FILE: &str = "input.txt";
const OUTPUT_FILE: &str = "output.txt";
const REAP_GRACE: Duration = Duration::from_secs(5);
const STDERR_TAIL_CHARS: usize = 2048;
// Enough bytes for the char tail even if every char is 4 bytes wide.
const STDERR_KEEP_BYTES: usize = STDERR_TAIL_CHARS * 4;

/// Launches one renderer process per job.
#[derive(Clone, Debug)]
pub struct ProcessSandbox {
    renderer: ToolCommand,
    poll_interval: Duration,
    scratch_root: Option<PathBuf>,
}

impl ProcessSandbox {
    pub fn new(renderer: ToolCommand, poll_interval: Duration) -> Self {
        Self {
            renderer,
            poll_interval,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Acquire a concrete session; [`SandboxLauncher::start`] boxes this.
    pub fn open_session(&self, job: &RenderJob) -> ReelResult<ProcessSession> {
        let program = resolve_program(&self.renderer.program)?;

        let prefix = format!("replay-{}-", job.id.short());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let workdir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| ReelError::environment_unavailable(format!("create scratch dir: {e}")))?;

        tracing::debug!(job = %job.id, dir = %workdir.path().display(), "sandbox acquired");

        Ok(ProcessSession {
            job_id: job.id,
            program,
            args: self.renderer.args.clone(),
            poll_interval: self.poll_interval,
            input_path: workdir.path().join(INPUT_FILE),
            output_path: workdir.path().join(OUTPUT_FILE),
            workdir: Some(workdir),
            phase: Phase::Fresh,
            child: None,
            stderr_drain: None,
        })
    }
}

#[async_trait]
impl SandboxLauncher for ProcessSandbox {
    async fn start(&self, job: &RenderJob) -> ReelResult<Box<dyn RenderSession>> {
        Ok(Box::new(self.open_session(job)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Fresh,
    Injected,
    Running,
    TornDown,
}

/// A live renderer environment. Dropping it kills the process and removes the scratch dir, but
/// callers are expected to go through [`RenderSession::teardown`].
pub struct ProcessSession {
    job_id: JobId,
    program: PathBuf,
    args: Vec<String>,
    poll_interval: Duration,
    workdir: Option<TempDir>,
    input_path: PathBuf,
    output_path: PathBuf,
    phase: Phase,
    child: Option<Child>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl ProcessSession {
    /// Scratch directory, until teardown removes it.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }

    async fn poll_output(&mut self) -> ReelResult<FrameSequence> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(text) = read_published(&self.output_path).await? {
                return FrameSequence::parse(&text);
            }

            let exited = match self.child.as_mut() {
                Some(child) => child.try_wait().context("poll renderer status")?,
                None => None,
            };
            if let Some(status) = exited {
                // The renderer may publish and exit between two ticks.
                if let Some(text) = read_published(&self.output_path).await? {
                    return FrameSequence::parse(&text);
                }
                let stderr = self.take_stderr().await;
                let detail = if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                };
                return Err(ReelError::sandbox_fault(format!(
                    "renderer exited with {status} before publishing output{detail}"
                )));
            }
        }
    }

    async fn take_stderr(&mut self) -> String {
        let Some(handle) = self.stderr_drain.take() else {
            return String::new();
        };
        match tokio::time::timeout(REAP_GRACE, handle).await {
            Ok(Ok(Ok(bytes))) => tail(String::from_utf8_lossy(&bytes).trim(), STDERR_TAIL_CHARS),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl RenderSession for ProcessSession {
    async fn inject(&mut self, payload: &ReplayPayload) -> ReelResult<()> {
        if self.phase != Phase::Fresh {
            return Err(ReelError::sandbox_fault(
                "payload can only be injected into a fresh session",
            ));
        }
        tokio::fs::write(&self.input_path, payload.as_str())
            .await
            .map_err(|e| ReelError::environment_unavailable(format!("write payload: {e}")))?;
        self.phase = Phase::Injected;
        Ok(())
    }

    async fn trigger(&mut self) -> ReelResult<()> {
        if self.phase != Phase::Injected {
            return Err(ReelError::sandbox_fault(
                "renderer triggered before the payload was injected",
            ));
        }
        let workdir = self
            .workdir
            .as_ref()
            .ok_or_else(|| ReelError::sandbox_fault("session is already torn down"))?
            .path()
            .to_path_buf();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&workdir)
            .env_clear()
            .env("TMPDIR", &workdir)
            .env("REPLAY_INPUT", &self.input_path)
            .env("REPLAY_OUTPUT", &self.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::environment_unavailable(format!(
                "failed to spawn renderer '{}': {e}",
                self.program.display()
            ))
        })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::environment_unavailable("renderer stderr not captured"))?;
        self.stderr_drain = Some(tokio::spawn(read_tail(stderr, STDERR_KEEP_BYTES)));

        tracing::debug!(job = %self.job_id, pid = ?child.id(), "renderer started");
        self.child = Some(child);
        self.phase = Phase::Running;
        Ok(())
    }

    async fn await_output(&mut self, timeout: Duration) -> ReelResult<FrameSequence> {
        if self.phase != Phase::Running {
            return Err(ReelError::sandbox_fault("renderer is not running"));
        }
        tokio::time::timeout(timeout, self.poll_output())
            .await
            .map_err(|_| ReelError::RenderTimeout(timeout))?
    }

    async fn teardown(&mut self) -> ReelResult<()> {
        if self.phase == Phase::TornDown {
            return Ok(());
        }
        self.phase = Phase::TornDown;

        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.start_kill();
            }
            if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
                tracing::warn!(job = %self.job_id, "renderer did not exit after kill");
            }
        }
        if let Some(handle) = self.stderr_drain.take() {
            handle.abort();
        }
        if let Some(dir) = self.workdir.take() {
            let path = dir.path().to_path_buf();
            dir.close()
                .with_context(|| format!("remove scratch dir '{}'", path.display()))?;
        }
        tracing::debug!(job = %self.job_id, "sandbox released");
        Ok(())
    }
}

fn resolve_program(program: &str) -> ReelResult<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ReelError::environment_unavailable(format!(
            "renderer '{program}' does not exist"
        )));
    }
    which::which(program).map_err(|e| {
        ReelError::environment_unavailable(format!("renderer '{program}' not found on PATH: {e}"))
    })
}

async fn read_published(path: &Path) -> ReelResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ReelError::sandbox_fault(format!("read renderer output: {e}"))),
    }
}

/// Read `reader` to the end, keeping only its last `keep` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, keep: usize) -> std::io::Result<Vec<u8>> {
    let mut tail = Vec::with_capacity(keep);
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(tail);
        }
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > keep {
            let excess = tail.len() - keep;
            tail.drain(..excess);
        }
    }
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}

#[cfg(test)]
#[path = "../../tests/unit/sandbox/process.rs"]
mod tests;
