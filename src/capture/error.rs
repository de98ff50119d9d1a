use thiserror::Error;

use crate::capture::session::{SessionPhase, Stage};

/// Errors raised while capturing, assembling or saving a page archive.
///
/// The `Display` text of the terminal kinds is what the surface shows, so it
/// is phrased for users.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture agent could not be started in the target context.
    #[error("Failed to inject capture script: {0}")]
    Injection(String),

    /// A single resource could not be fetched. Always recovered locally.
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Building the archive failed.
    #[error("Failed to create ZIP package: {0}")]
    Assembly(String),

    /// Download requested for a session that is not current or not finished.
    #[error("Capture data not available. Please try again.")]
    StaleRequest,

    /// The agent aborted its pipeline.
    #[error("Error during capture: {0}")]
    Agent(String),

    /// A stage was delivered twice or ahead of its turn.
    #[error("{stage} delivered out of order (session is {phase})")]
    OutOfOrder { stage: Stage, phase: SessionPhase },

    /// Writing the archive to its destination failed.
    #[error("Failed to save archive: {0}")]
    Save(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether this error ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureError::Injection(_) | CaptureError::Assembly(_) | CaptureError::Agent(_)
        )
    }
}

impl From<zip::result::ZipError> for CaptureError {
    fn from(err: zip::result::ZipError) -> Self {
        CaptureError::Assembly(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Assembly(err.to_string())
    }
}
