use std::time::Duration;

use async_trait::async_trait;

use crate::foundation::core::{RenderJob, ReplayPayload};
use crate::foundation::error::{ReelError, ReelResult};

/// Ordered encoded frames recovered from one render, in playback order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSequence(Vec<String>);

impl FrameSequence {
    pub fn new(frames: Vec<String>) -> Self {
        Self(frames)
    }

    /// Parse the renderer's published output.
    ///
    /// A leading `[` selects a JSON array of strings; anything else is split on whitespace, one
    /// frame per token. An output with no frames is a sandbox fault.
    pub fn parse(text: &str) -> ReelResult<Self> {
        let text = text.trim();
        let frames: Vec<String> = if text.starts_with('[') {
            serde_json::from_str(text).map_err(|e| {
                ReelError::sandbox_fault(format!("renderer output is not a JSON string array: {e}"))
            })?
        } else {
            text.split_whitespace().map(str::to_owned).collect()
        };
        if frames.is_empty() {
            return Err(ReelError::sandbox_fault("renderer produced no frames"));
        }
        Ok(Self(frames))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl IntoIterator for FrameSequence {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Acquires a fresh isolated environment per job.
#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    /// Acquire an environment for `job`. Fails with [`ReelError::EnvironmentUnavailable`].
    async fn start(&self, job: &RenderJob) -> ReelResult<Box<dyn RenderSession>>;
}

/// One isolated render environment, used for exactly one job.
///
/// Call order is `inject`, `trigger`, `await_output`; `teardown` must follow every successful
/// `start` exactly once, whatever happened in between.
#[async_trait]
pub trait RenderSession: Send {
    /// Make the payload visible to the sandboxed program before it starts computing.
    async fn inject(&mut self, payload: &ReplayPayload) -> ReelResult<()>;

    /// Tell the sandboxed program to begin.
    async fn trigger(&mut self) -> ReelResult<()>;

    /// Wait until the program publishes its output, or fail with
    /// [`ReelError::RenderTimeout`] once `timeout` elapses.
    async fn await_output(&mut self, timeout: Duration) -> ReelResult<FrameSequence>;

    /// Release the environment.
    async fn teardown(&mut self) -> ReelResult<()>;
}

#[cfg(test)]
#[path = "../../tests/unit/sandbox/session.rs"]
mod tests;
