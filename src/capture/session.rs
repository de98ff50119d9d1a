//! Capture session state and its stage progression.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::capture::error::CaptureError;
use crate::capture::files::CapturedFile;
use crate::util::Clock;

/// Opaque, process-unique identifier of one capture attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Millisecond clock reading plus a random suffix.
    pub fn generate(clock: &dyn Clock) -> Self {
        let suffix: u32 = rand::rng().random();
        Self(format!("capture_{}_{:08x}", clock.timestamp_ms(), suffix))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The page context a capture runs against (a tab, or a loaded document).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetContextId(String);

impl TargetContextId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the four extraction phases, in delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Markup,
    Styles,
    Scripts,
    Assets,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Markup => Some(Stage::Styles),
            Stage::Styles => Some(Stage::Scripts),
            Stage::Scripts => Some(Stage::Assets),
            Stage::Assets => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Markup => "markup",
            Stage::Styles => "styles",
            Stage::Scripts => "scripts",
            Stage::Assets => "assets",
        }
    }

    /// Progress checkpoint reported once this stage has been received.
    pub fn checkpoint(self) -> (u8, &'static str) {
        match self {
            Stage::Markup => (30, "Collecting CSS resources..."),
            Stage::Styles => (50, "Collecting JavaScript resources..."),
            Stage::Scripts => (70, "Collecting additional assets..."),
            Stage::Assets => (80, "Creating ZIP package..."),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for the given stage to be delivered
    Collecting(Stage),
    /// All four stages arrived; archive not built yet
    Collected,
    /// Archive built
    Complete,
    /// Cancelled by the user
    Cancelled,
}

impl SessionPhase {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SessionPhase::Collecting(_) | SessionPhase::Collected)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Collecting(stage) => write!(f, "awaiting {}", stage),
            SessionPhase::Collected => f.write_str("collected"),
            SessionPhase::Complete => f.write_str("complete"),
            SessionPhase::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-category tallies of stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub html: usize,
    pub css: usize,
    pub js: usize,
    pub other: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.html + self.css + self.js + self.other
    }
}

/// The four resource slots. Each is `None` until its stage is delivered.
#[derive(Debug, Clone, Default)]
pub struct CapturedResources {
    pub html: Option<String>,
    pub css: Option<Vec<CapturedFile>>,
    pub js: Option<Vec<CapturedFile>>,
    pub assets: Option<Vec<CapturedFile>>,
}

impl CapturedResources {
    pub fn is_complete(&self) -> bool {
        self.html.is_some() && self.css.is_some() && self.js.is_some() && self.assets.is_some()
    }
}

/// A stage payload handed to [`Session::advance`].
#[derive(Debug, Clone)]
pub enum Delivery {
    Markup(String),
    Styles(Vec<CapturedFile>),
    Scripts(Vec<CapturedFile>),
    Assets(Vec<CapturedFile>),
}

impl Delivery {
    pub fn stage(&self) -> Stage {
        match self {
            Delivery::Markup(_) => Stage::Markup,
            Delivery::Styles(_) => Stage::Styles,
            Delivery::Scripts(_) => Stage::Scripts,
            Delivery::Assets(_) => Stage::Assets,
        }
    }
}

/// One capture attempt and everything collected for it so far.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub target: TargetContextId,
    pub source_url: String,
    pub title: String,
    pub resources: CapturedResources,
    pub counts: ResourceCounts,
    pub total_size_bytes: u64,
    archive: Option<Vec<u8>>,
    phase: SessionPhase,
}

impl Session {
    pub fn new(
        id: SessionId,
        target: TargetContextId,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            target,
            source_url: source_url.into(),
            title: title.into(),
            resources: CapturedResources::default(),
            counts: ResourceCounts::default(),
            total_size_bytes: 0,
            archive: None,
            phase: SessionPhase::Collecting(Stage::Markup),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_in_progress(&self) -> bool {
        self.phase.is_in_progress()
    }

    /// All four slots are filled and the archive can be built.
    pub fn is_collected(&self) -> bool {
        self.phase == SessionPhase::Collected
    }

    pub fn archive(&self) -> Option<&[u8]> {
        self.archive.as_deref()
    }

    /// Apply one stage delivery.
    ///
    /// This is the only transition out of `Collecting`: the delivery must be
    /// for exactly the stage the session is waiting on, otherwise it is
    /// rejected and nothing changes.
    pub fn advance(&mut self, delivery: Delivery) -> Result<(), CaptureError> {
        let stage = delivery.stage();
        match self.phase {
            SessionPhase::Collecting(expected) if expected == stage => {}
            phase => return Err(CaptureError::OutOfOrder { stage, phase }),
        }

        match delivery {
            Delivery::Markup(html) => {
                self.total_size_bytes += html.len() as u64;
                self.counts.html = 1;
                self.resources.html = Some(html);
            }
            Delivery::Styles(files) => {
                self.total_size_bytes += files.iter().map(CapturedFile::size).sum::<u64>();
                self.counts.css = files.len();
                self.resources.css = Some(files);
            }
            Delivery::Scripts(files) => {
                self.total_size_bytes += files.iter().map(CapturedFile::size).sum::<u64>();
                self.counts.js = files.len();
                self.resources.js = Some(files);
            }
            Delivery::Assets(files) => {
                self.total_size_bytes += files.iter().map(CapturedFile::size).sum::<u64>();
                self.counts.other = files.len();
                self.resources.assets = Some(files);
            }
        }

        self.phase = match stage.next() {
            Some(next) => SessionPhase::Collecting(next),
            None => SessionPhase::Collected,
        };
        debug_assert_eq!(self.is_collected(), self.resources.is_complete());
        Ok(())
    }

    /// Store the built archive and close the session.
    pub fn complete(&mut self, archive: Vec<u8>) -> Result<(), CaptureError> {
        if !self.resources.is_complete() {
            return Err(CaptureError::Assembly(
                "archive built before all resources were collected".to_string(),
            ));
        }
        self.archive = Some(archive);
        self.phase = SessionPhase::Complete;
        Ok(())
    }

    pub fn cancel(&mut self) {
        if self.is_in_progress() {
            self.phase = SessionPhase::Cancelled;
        }
    }
}

/// Owner of the single process-wide session slot.
///
/// `begin` and `reset` are the only ways a session is created or dropped.
#[derive(Debug, Default)]
pub struct CaptureState {
    session: Option<Session>,
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever session exists with a fresh one.
    pub fn begin(&mut self, session: Session) -> &mut Session {
        if let Some(previous) = self.session.take() {
            tracing::debug!(
                previous = %previous.id,
                next = %session.id,
                "Discarding previous capture session"
            );
        }
        self.session.insert(session)
    }

    /// Drop the current session, returning to idle.
    pub fn reset(&mut self) -> Option<Session> {
        self.session.take()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn is_in_progress(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_in_progress)
    }

    /// The current session, only while it is still collecting.
    pub fn active_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut().filter(|s| s.is_in_progress())
    }
}
