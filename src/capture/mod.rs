//! Shared capture vocabulary: session state, captured files, protocol
//! messages and errors. Used by the agent, the coordinator and the surface.

pub mod error;
pub mod files;
pub mod messages;
pub mod session;

pub use error::CaptureError;
pub use files::{archive_filename, filename_from_url, sanitize_title, CapturedFile};
pub use messages::{
    AgentCommand, AgentEnvelope, AgentMessage, CaptureSummary, CoordinatorEvent, SurfaceCommand,
};
pub use session::{
    CaptureState, Delivery, ResourceCounts, Session, SessionId, SessionPhase, Stage,
    TargetContextId,
};
