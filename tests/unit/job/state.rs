use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::progress::log::NullSink;

const ORDER: [JobState; 7] = [
    JobState::Queued,
    JobState::SessionStarting,
    JobState::Injecting,
    JobState::Rendering,
    JobState::Decoding,
    JobState::Encoding,
    JobState::Done,
];

fn tracker() -> JobTracker {
    JobTracker::new(ProgressLog::new(JobId::new(), Arc::new(NullSink)), "queued")
}

#[test]
fn only_the_next_state_or_failed_is_reachable() {
    for (i, from) in ORDER.iter().enumerate() {
        for (j, to) in ORDER.iter().enumerate() {
            assert_eq!(from.can_advance_to(*to), j == i + 1, "{from:?} -> {to:?}");
        }
        assert_eq!(from.can_advance_to(JobState::Failed), !from.is_terminal());
    }
    assert!(!JobState::Failed.can_advance_to(JobState::Failed));
    assert!(!JobState::Failed.can_advance_to(JobState::Queued));
}

#[test]
fn happy_path_emits_one_line_per_transition() {
    let mut t = tracker();
    for next in &ORDER[1..] {
        t.advance(*next, format!("{next:?}")).unwrap();
    }
    assert_eq!(t.state(), JobState::Done);
    assert_eq!(t.progress().lines().len(), ORDER.len());

    // Terminal: nothing moves any more.
    t.fail(&ReelError::Cancelled);
    assert_eq!(t.state(), JobState::Done);
    assert_eq!(t.progress().lines().len(), ORDER.len());
}

#[test]
fn skipping_or_rewinding_is_rejected() {
    let mut t = tracker();
    assert!(t.advance(JobState::Rendering, "skip").is_err());
    t.advance(JobState::SessionStarting, "start").unwrap();
    assert!(t.advance(JobState::Queued, "rewind").is_err());
    assert!(t.advance(JobState::Failed, "use fail()").is_err());
    assert_eq!(t.progress().lines().len(), 2);
}

#[test]
fn failure_is_logged_with_kind_and_cause() {
    let mut t = tracker();
    t.advance(JobState::SessionStarting, "start").unwrap();
    t.fail(&ReelError::RenderTimeout(Duration::from_secs(300)));
    assert_eq!(t.state(), JobState::Failed);
    let last = t.progress().lines().pop().unwrap();
    assert_eq!(last, "Failed (RenderTimeout): render timed out after 300s");
}
