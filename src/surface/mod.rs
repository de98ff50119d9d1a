//! Control surface: a view-state machine fed only by coordinator events.

use std::fmt::Write as _;

use crate::capture::messages::{CaptureSummary, CoordinatorEvent, SurfaceCommand};
use crate::capture::session::TargetContextId;

pub const CANCELED_MESSAGE: &str = "Capture canceled by user";

/// What the surface currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SurfaceState {
    #[default]
    Idle,
    InProgress {
        percent: u8,
        task: String,
    },
    Finished(CaptureSummary),
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SurfaceView {
    state: SurfaceState,
    saved_to: Option<std::path::PathBuf>,
}

impl SurfaceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.state, SurfaceState::InProgress { .. })
    }

    pub fn saved_to(&self) -> Option<&std::path::Path> {
        self.saved_to.as_deref()
    }

    /// Update from a coordinator event.
    pub fn apply(&mut self, event: &CoordinatorEvent) {
        match event {
            CoordinatorEvent::Progress { percent, message } => {
                // A cancelled capture keeps its message even if progress
                // from the abandoned run still trickles in.
                if matches!(self.state, SurfaceState::Failed { .. }) && *percent > 10 {
                    return;
                }
                self.state = SurfaceState::InProgress {
                    percent: (*percent).min(100),
                    task: message.clone(),
                };
            }
            CoordinatorEvent::Complete(summary) => {
                self.state = SurfaceState::Finished(summary.clone());
                self.saved_to = None;
            }
            CoordinatorEvent::Error { message } => {
                self.state = SurfaceState::Failed {
                    message: message.clone(),
                };
            }
            CoordinatorEvent::Saved { path, .. } => {
                self.saved_to = Some(path.clone());
            }
        }
    }

    /// Start a capture. Rejected while one is running.
    pub fn start(
        &mut self,
        target: TargetContextId,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Option<SurfaceCommand> {
        if self.is_in_progress() {
            return None;
        }
        self.saved_to = None;
        self.state = SurfaceState::InProgress {
            percent: 0,
            task: "Starting capture...".to_string(),
        };
        Some(SurfaceCommand::Start {
            target,
            source_url: source_url.into(),
            title: title.into(),
        })
    }

    /// Cancel the running capture. Rejected when nothing is running.
    pub fn cancel(&mut self) -> Option<SurfaceCommand> {
        if !self.is_in_progress() {
            return None;
        }
        self.state = SurfaceState::Failed {
            message: CANCELED_MESSAGE.to_string(),
        };
        Some(SurfaceCommand::Cancel)
    }

    /// Ask for the finished archive. Rejected without a result.
    pub fn download(&self) -> Option<SurfaceCommand> {
        match &self.state {
            SurfaceState::Finished(summary) => Some(SurfaceCommand::Download {
                session_id: summary.session_id.clone(),
            }),
            _ => None,
        }
    }

    /// Back to idle. Local only; the coordinator keeps its session.
    pub fn reset(&mut self) {
        self.state = SurfaceState::Idle;
        self.saved_to = None;
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.state {
            SurfaceState::Idle => out.push_str("Ready to capture"),
            SurfaceState::InProgress { percent, task } => {
                let filled = usize::from(*percent) / 5;
                let _ = write!(
                    out,
                    "[{}{}] {:>3}% {}",
                    "#".repeat(filled),
                    "-".repeat(20 - filled),
                    percent,
                    task
                );
            }
            SurfaceState::Finished(summary) => {
                let c = &summary.counts;
                let _ = writeln!(out, "Capture complete");
                let _ = writeln!(out, "  HTML files:  {}", c.html);
                let _ = writeln!(out, "  CSS files:   {}", c.css);
                let _ = writeln!(out, "  JS files:    {}", c.js);
                let _ = writeln!(out, "  Other:       {}", c.other);
                let _ = write!(
                    out,
                    "  Total size:  {}",
                    format_file_size(summary.total_size_bytes)
                );
                if let Some(path) = &self.saved_to {
                    let _ = write!(out, "\n  Saved to:    {}", path.display());
                }
            }
            SurfaceState::Failed { message } => {
                let _ = write!(out, "Error: {}", message);
            }
        }
        out
    }
}

/// Human-readable size in base-1024 units with at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
