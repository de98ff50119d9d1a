use serde::{Deserialize, Serialize};

use crate::capture::files::CapturedFile;
use crate::capture::session::{Delivery, ResourceCounts, SessionId, TargetContextId};

/// Commands issued by the control surface to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SurfaceCommand {
    /// Begin capturing the page loaded in `target`
    Start {
        target: TargetContextId,
        source_url: String,
        title: String,
    },

    /// Best-effort cancel of the running capture
    Cancel,

    /// Save the archive of a finished session
    Download { session_id: SessionId },
}

/// Commands sent from the coordinator into the capture agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentCommand {
    /// Begin extraction
    Start {
        session_id: SessionId,
        source_url: String,
    },

    /// Advisory stop
    Cancel,
}

/// Results pushed by the capture agent, one per stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMessage {
    MarkupDelivered { html: String },
    StylesDelivered { files: Vec<CapturedFile> },
    ScriptsDelivered { files: Vec<CapturedFile> },
    AssetsDelivered { files: Vec<CapturedFile> },

    /// The pipeline hit an unrecoverable error and stopped
    Failed { message: String },
}

impl AgentMessage {
    /// Get a human-readable message type name for logs
    pub fn type_name(&self) -> &'static str {
        match self {
            AgentMessage::MarkupDelivered { .. } => "markup-delivered",
            AgentMessage::StylesDelivered { .. } => "styles-delivered",
            AgentMessage::ScriptsDelivered { .. } => "scripts-delivered",
            AgentMessage::AssetsDelivered { .. } => "assets-delivered",
            AgentMessage::Failed { .. } => "failed",
        }
    }

    /// The stage payload, if this is a delivery.
    pub fn into_delivery(self) -> Result<Delivery, String> {
        match self {
            AgentMessage::MarkupDelivered { html } => Ok(Delivery::Markup(html)),
            AgentMessage::StylesDelivered { files } => Ok(Delivery::Styles(files)),
            AgentMessage::ScriptsDelivered { files } => Ok(Delivery::Scripts(files)),
            AgentMessage::AssetsDelivered { files } => Ok(Delivery::Assets(files)),
            AgentMessage::Failed { message } => Err(message),
        }
    }
}

impl From<Delivery> for AgentMessage {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Markup(html) => AgentMessage::MarkupDelivered { html },
            Delivery::Styles(files) => AgentMessage::StylesDelivered { files },
            Delivery::Scripts(files) => AgentMessage::ScriptsDelivered { files },
            Delivery::Assets(files) => AgentMessage::AssetsDelivered { files },
        }
    }
}

/// An agent message tagged with the session it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEnvelope {
    pub session_id: SessionId,
    pub message: AgentMessage,
}

impl AgentEnvelope {
    pub fn new(session_id: SessionId, message: impl Into<AgentMessage>) -> Self {
        Self {
            session_id,
            message: message.into(),
        }
    }
}

/// Summary carried by the completion event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub session_id: SessionId,
    pub counts: ResourceCounts,
    pub total_size_bytes: u64,
}

/// Events pushed from the coordinator to the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoordinatorEvent {
    Progress { percent: u8, message: String },

    /// Terminal success
    Complete(CaptureSummary),

    /// Terminal failure, or a rejected download
    Error { message: String },

    /// The archive was written by the download facility
    Saved {
        session_id: SessionId,
        path: std::path::PathBuf,
    },
}

impl CoordinatorEvent {
    pub fn progress(percent: u8, message: impl Into<String>) -> Self {
        CoordinatorEvent::Progress {
            percent,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CoordinatorEvent::Error {
            message: message.into(),
        }
    }

    pub fn event_type_name(&self) -> &'static str {
        match self {
            CoordinatorEvent::Progress { .. } => "progress",
            CoordinatorEvent::Complete(_) => "complete",
            CoordinatorEvent::Error { .. } => "error",
            CoordinatorEvent::Saved { .. } => "saved",
        }
    }
}
