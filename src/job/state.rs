use crate::foundation::core::JobId;
use crate::foundation::error::{ReelError, ReelResult};
use crate::progress::log::ProgressLog;

/// Lifecycle of a render job. Forward-only; `Failed` is reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    Queued,
    SessionStarting,
    Injecting,
    Rendering,
    Decoding,
    Encoding,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn successor(self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::SessionStarting),
            Self::SessionStarting => Some(Self::Injecting),
            Self::Injecting => Some(Self::Rendering),
            Self::Rendering => Some(Self::Decoding),
            Self::Decoding => Some(Self::Encoding),
            Self::Encoding => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        match next {
            Self::Failed => !self.is_terminal(),
            _ => self.successor() == Some(next),
        }
    }
}

/// Current state of one job plus its progress log. Every transition appends exactly one line.
#[derive(Debug)]
pub struct JobTracker {
    job_id: JobId,
    state: JobState,
    progress: ProgressLog,
}

impl JobTracker {
    /// Start in [`JobState::Queued`], announcing it on the log.
    pub fn new(progress: ProgressLog, line: impl Into<String>) -> Self {
        progress.append(line);
        Self {
            job_id: progress.job_id(),
            state: JobState::Queued,
            progress,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    pub fn advance(&mut self, next: JobState, line: impl Into<String>) -> ReelResult<()> {
        if next == JobState::Failed || !self.state.can_advance_to(next) {
            return Err(ReelError::validation(format!(
                "illegal job transition {:?} -> {next:?}",
                self.state
            )));
        }
        tracing::debug!(job = %self.job_id, from = ?self.state, to = ?next, "job transition");
        self.state = next;
        self.progress.append(line);
        Ok(())
    }

    /// Enter [`JobState::Failed`]. A no-op once the job is terminal.
    pub fn fail(&mut self, err: &ReelError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(job = %self.job_id, during = ?self.state, kind = %err.kind(), "job failed: {err}");
        self.state = JobState::Failed;
        self.progress
            .append(format!("Failed ({}): {err}", err.kind()));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/state.rs"]
mod tests;
