//! Session coordination: owns the capture state, sequences agent
//! deliveries, assembles the archive and reports to the surface.

pub mod archive;
pub mod service;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::launcher::{AgentLauncher, AgentLink, LaunchRequest};
use crate::capture::files::{archive_filename, CapturedFile};
use crate::capture::messages::{AgentCommand, AgentEnvelope, CaptureSummary, CoordinatorEvent};
use crate::capture::session::{CaptureState, Delivery, Session, SessionId, TargetContextId};
use crate::capture::CaptureError;
use crate::util::Clock;

pub use archive::{ArchiveLayout, Manifest};
pub use service::{CoordinatorHandle, CoordinatorService};
pub use sink::{ArchiveSink, DirectorySink, MemorySink};

const STARTING: (u8, &str) = (10, "Capturing HTML structure...");
const FINALIZING: (u8, &str) = (90, "Finalizing package...");
const COMPLETE: (u8, &str) = (100, "Capture complete!");

/// Owner of the single capture session.
///
/// Everything that mutates session state goes through `&mut self`, so the
/// coordinator is the only writer.
pub struct Coordinator {
    state: CaptureState,
    launcher: Arc<dyn AgentLauncher>,
    sink: Arc<dyn ArchiveSink>,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    agent: Option<AgentLink>,
}

impl Coordinator {
    pub fn new(
        launcher: Arc<dyn AgentLauncher>,
        sink: Arc<dyn ArchiveSink>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            state: CaptureState::new(),
            launcher,
            sink,
            clock,
            events,
            agent: None,
        };
        (coordinator, rx)
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.state.session()
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.is_in_progress()
    }

    /// The running agent's link, polled by the service loop.
    pub(crate) fn agent_mut(&mut self) -> &mut Option<AgentLink> {
        &mut self.agent
    }

    /// Start a fresh capture of `target`, replacing any previous session.
    pub async fn begin_session(
        &mut self,
        target: TargetContextId,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<SessionId, CaptureError> {
        self.release_agent();

        let id = SessionId::generate(self.clock.as_ref());
        let source_url = source_url.into();
        let session = Session::new(id.clone(), target.clone(), source_url.clone(), title);
        self.state.begin(session);

        tracing::info!(session_id = %id, context = %target, url = %source_url, "Capture started");
        self.emit(CoordinatorEvent::progress(STARTING.0, STARTING.1));

        let request = LaunchRequest {
            session_id: id.clone(),
            target,
            source_url: source_url.clone(),
        };

        let link = match self.launcher.launch(&request).await {
            Ok(link) => link,
            Err(e) => {
                let err = if e.is_terminal() {
                    e
                } else {
                    CaptureError::Injection(e.to_string())
                };
                self.fail(&err);
                return Err(err);
            }
        };

        let start = AgentCommand::Start {
            session_id: id.clone(),
            source_url,
        };
        if let Err(e) = link.commands.send(start).await {
            let err = CaptureError::Injection(format!("agent did not accept start: {}", e));
            self.fail(&err);
            return Err(err);
        }

        self.agent = Some(link);
        Ok(id)
    }

    /// Best-effort cancel. Does nothing unless a capture is running.
    pub fn cancel_session(&mut self) {
        let Some(session) = self.state.active_mut() else {
            tracing::debug!("Cancel ignored, no capture in progress");
            return;
        };
        session.cancel();
        tracing::info!(session_id = %session.id, "Capture cancelled");
        self.release_agent();
    }

    /// Route one agent envelope. Messages for any session other than the
    /// current one are dropped.
    pub fn receive(&mut self, envelope: AgentEnvelope) {
        let current = self.state.session().map(|s| s.id.clone());
        if current.as_ref() != Some(&envelope.session_id) {
            tracing::debug!(
                session_id = %envelope.session_id,
                message = envelope.message.type_name(),
                "Dropping message for stale session"
            );
            return;
        }

        match envelope.message.into_delivery() {
            Ok(delivery) => self.deliver(delivery),
            Err(message) => self.agent_failed(message),
        }
    }

    pub fn receive_markup(&mut self, html: String) {
        self.deliver(Delivery::Markup(html));
    }

    pub fn receive_styles(&mut self, files: Vec<CapturedFile>) {
        self.deliver(Delivery::Styles(files));
    }

    pub fn receive_scripts(&mut self, files: Vec<CapturedFile>) {
        self.deliver(Delivery::Scripts(files));
    }

    pub fn receive_assets(&mut self, files: Vec<CapturedFile>) {
        self.deliver(Delivery::Assets(files));
    }

    /// The agent reported an unrecoverable error.
    pub fn agent_failed(&mut self, message: impl Into<String>) {
        if !self.state.is_in_progress() {
            return;
        }
        self.fail(&CaptureError::Agent(message.into()));
    }

    fn deliver(&mut self, delivery: Delivery) {
        let stage = delivery.stage();
        let Some(session) = self.state.active_mut() else {
            tracing::debug!(stage = %stage, "Dropping delivery, no capture in progress");
            return;
        };

        if let Err(e) = session.advance(delivery) {
            tracing::warn!(session_id = %session.id, error = %e, "Rejected delivery");
            return;
        }
        tracing::debug!(
            session_id = %session.id,
            stage = %stage,
            total_size_bytes = session.total_size_bytes,
            "Stage received"
        );
        let collected = session.is_collected();

        let (percent, message) = stage.checkpoint();
        self.emit(CoordinatorEvent::progress(percent, message));

        if collected {
            self.assemble_archive();
        }
    }

    /// Build the zip for a fully collected session and mark it complete.
    pub fn assemble_archive(&mut self) {
        if !self.state.session().is_some_and(Session::is_collected) {
            tracing::debug!("Nothing to assemble");
            return;
        }
        self.events_progress(FINALIZING);

        let captured_at = self.clock.now();
        let Some(session) = self.state.session_mut() else {
            return;
        };
        let built = Self::build_archive(session, captured_at).and_then(|bytes| {
            session.complete(bytes)?;
            Ok(CaptureSummary {
                session_id: session.id.clone(),
                counts: session.counts,
                total_size_bytes: session.total_size_bytes,
            })
        });

        match built {
            Ok(summary) => {
                tracing::info!(
                    session_id = %summary.session_id,
                    files = summary.counts.total(),
                    total_size_bytes = summary.total_size_bytes,
                    "Capture complete"
                );
                self.release_agent();
                self.events_progress(COMPLETE);
                self.emit(CoordinatorEvent::Complete(summary));
            }
            Err(e) => {
                let err = if e.is_terminal() {
                    e
                } else {
                    CaptureError::Assembly(e.to_string())
                };
                self.fail(&err);
            }
        }
    }

    fn build_archive(
        session: &Session,
        captured_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<u8>, CaptureError> {
        let manifest = Manifest::new(session, captured_at);
        ArchiveLayout::from_session(session, &manifest)?.write_zip()
    }

    /// Save the archive of `session_id` through the sink.
    pub async fn retrieve_archive(
        &mut self,
        session_id: &SessionId,
    ) -> Result<PathBuf, CaptureError> {
        let ready = self
            .state
            .session()
            .filter(|s| &s.id == session_id)
            .and_then(|s| s.archive().map(|bytes| (archive_filename(&s.title), bytes.to_vec())));

        let Some((filename, bytes)) = ready else {
            tracing::warn!(session_id = %session_id, "Download requested for unavailable capture");
            let err = CaptureError::StaleRequest;
            self.emit(CoordinatorEvent::error(err.to_string()));
            return Err(err);
        };

        match self.sink.save(&filename, &bytes).await {
            Ok(path) => {
                tracing::info!(session_id = %session_id, path = %path.display(), "Archive saved");
                self.emit(CoordinatorEvent::Saved {
                    session_id: session_id.clone(),
                    path: path.clone(),
                });
                Ok(path)
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to save archive");
                self.emit(CoordinatorEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// The agent's channel closed. Only matters if it left the session
    /// unfinished.
    pub fn agent_disconnected(&mut self) {
        self.agent = None;
        if self.state.is_in_progress() {
            self.agent_failed("capture agent stopped unexpectedly");
        }
    }

    /// Terminal failure: report it and return to idle.
    fn fail(&mut self, err: &CaptureError) {
        let session_id = self.state.session().map(|s| s.id.to_string());
        tracing::error!(session_id = ?session_id, error = %err, "Capture failed");
        self.release_agent();
        self.state.reset();
        self.emit(CoordinatorEvent::error(err.to_string()));
    }

    fn release_agent(&mut self) {
        if let Some(link) = self.agent.take() {
            link.cancel();
        }
    }

    fn events_progress(&self, (percent, message): (u8, &str)) {
        self.emit(CoordinatorEvent::progress(percent, message));
    }

    fn emit(&self, event: CoordinatorEvent) {
        let kind = event.event_type_name();
        if self.events.send(event).is_err() {
            tracing::debug!(event = kind, "Event receiver dropped");
        }
    }
}
