use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::foundation::core::JobId;

/// Caller-owned surface that shows a job's progress as one evolving message.
///
/// Each delivery carries the complete rendered log and replaces the previous one. Implementations
/// must not block; an error is logged and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn deliver(&self, rendered: &str) -> anyhow::Result<()>;
}

/// Discards every delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn deliver(&self, _rendered: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Emits each delivery as a tracing event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn deliver(&self, rendered: &str) -> anyhow::Result<()> {
        tracing::info!(target: "replay_reel::progress", "{rendered}");
        Ok(())
    }
}

/// Publishes the latest rendered log on a `watch` channel.
#[derive(Debug)]
pub struct WatchSink {
    tx: watch::Sender<String>,
}

impl WatchSink {
    pub fn channel() -> (Self, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(String::new());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchSink {
    fn deliver(&self, rendered: &str) -> anyhow::Result<()> {
        self.tx
            .send(rendered.to_owned())
            .map_err(|_| anyhow::anyhow!("progress receiver dropped"))
    }
}

/// Append-only status log for one job.
///
/// Cloning yields another handle to the same log.
#[derive(Clone)]
pub struct ProgressLog {
    job_id: JobId,
    lines: Arc<Mutex<Vec<String>>>,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for ProgressLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressLog")
            .field("job_id", &self.job_id)
            .field("lines", &self.lines())
            .finish_non_exhaustive()
    }
}

impl ProgressLog {
    pub fn new(job_id: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            lines: Arc::new(Mutex::new(Vec::new())),
            sink,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Append a line and push the full log to the sink.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(job = %self.job_id, "{line}");

        // Deliver under the lock so the sink never sees an older log after a newer one.
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push(line);
        let rendered = render(&lines);
        if let Err(e) = self.sink.deliver(&rendered) {
            tracing::warn!(job = %self.job_id, "progress delivery failed: {e:#}");
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn render(&self) -> String {
        render(&self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn render(lines: &[String]) -> String {
    let mut out = String::from("```\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("```");
    out
}

#[cfg(test)]
#[path = "../../tests/unit/progress/log.rs"]
mod tests;
