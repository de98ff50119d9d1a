//! Deterministic test environment setup
//!
//! Pins the time source so session ids, synthesized filenames and manifest
//! dates are reproducible.

use std::sync::Arc;

use pagepack::agent::AgentLauncher;
use pagepack::capture::CoordinatorEvent;
use pagepack::coordinator::{Coordinator, MemorySink};
use pagepack::util::{Clock, FixedClock};
use tokio::sync::mpsc;

/// 2024-05-01T12:00:00Z
pub const FIXED_MILLIS: i64 = 1_714_564_800_000;

pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::from_millis(FIXED_MILLIS))
}

/// A coordinator over `launcher` that saves into memory.
pub fn memory_coordinator(
    launcher: Arc<dyn AgentLauncher>,
) -> (
    Coordinator,
    mpsc::UnboundedReceiver<CoordinatorEvent>,
    MemorySink,
) {
    let sink = MemorySink::new();
    let (coordinator, events) = Coordinator::new(launcher, Arc::new(sink.clone()), fixed_clock());
    (coordinator, events, sink)
}

/// Everything queued on `events` right now.
pub fn drain(events: &mut mpsc::UnboundedReceiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Progress percentages in the order they were reported.
pub fn percents(events: &[CoordinatorEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            CoordinatorEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}
