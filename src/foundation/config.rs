use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// External program invocation: `program` followed by leading `args`.
///
/// For the encoder, the ffmpeg argument list is appended after `args`, which lets deployments
/// wrap the binary (`nice -n 10 ffmpeg`, a container shim, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Split a whitespace-separated command line (no quoting).
    pub fn parse(line: &str) -> ReelResult<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ReelError::validation("command line must not be empty"))?;
        Ok(Self::new(program).with_args(parts))
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Deployment configuration for the render pipeline.
///
/// Loaded from JSON (every field optional) and then overridden from the environment by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Hard ceiling on waiting for the renderer's output.
    pub render_timeout_secs: u64,
    /// How often the sandbox output location is checked.
    pub poll_interval_ms: u64,
    /// Lifetime of a published artifact.
    pub artifact_ttl_secs: u64,
    /// Output frame rate; frames are assumed equally spaced.
    pub fps: u32,
    /// Admission limit on jobs holding a sandbox or encoder at once.
    pub max_concurrent_jobs: usize,
    /// Directory artifacts are written to (served externally).
    pub artifact_dir: PathBuf,
    /// Public URL prefix the artifact directory is served under.
    pub base_url: String,
    pub renderer: ToolCommand,
    pub encoder: ToolCommand,
    /// Background used to flatten frame alpha (RGBA8, straight alpha).
    pub background_rgba: [u8; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_timeout_secs: 300,
            poll_interval_ms: 500,
            artifact_ttl_secs: 3600,
            fps: 30,
            max_concurrent_jobs: 2,
            artifact_dir: PathBuf::from("artifacts"),
            base_url: "http://localhost:3000/videos".to_string(),
            renderer: ToolCommand::new("replay-renderer"),
            encoder: ToolCommand::new("ffmpeg"),
            background_rgba: [0, 0, 0, 255],
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| ReelError::validation(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.render_timeout_secs == 0 {
            return Err(ReelError::validation("render_timeout_secs must be non-zero"));
        }
        if !(10..=10_000).contains(&self.poll_interval_ms) {
            return Err(ReelError::validation(
                "poll_interval_ms must be between 10 and 10000",
            ));
        }
        if self.artifact_ttl_secs == 0 {
            return Err(ReelError::validation("artifact_ttl_secs must be non-zero"));
        }
        if self.fps == 0 {
            return Err(ReelError::validation("fps must be non-zero"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ReelError::validation("max_concurrent_jobs must be non-zero"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ReelError::validation("base_url must not be empty"));
        }
        if self.renderer.program.trim().is_empty() {
            return Err(ReelError::validation("renderer program must not be empty"));
        }
        if self.encoder.program.trim().is_empty() {
            return Err(ReelError::validation("encoder program must not be empty"));
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn output_fps(&self) -> ReelResult<Fps> {
        Fps::new(self.fps, 1)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
