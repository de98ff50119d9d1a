pub mod agent;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod snapshot;
pub mod surface;
pub mod util;

pub use agent::{
    AgentLauncher, AgentOptions, HttpFetcher, PageCaptureAgent, PageDocument, PageLauncher,
    ResourceFetcher,
};
pub use capture::{
    CaptureError, CapturedFile, CoordinatorEvent, ResourceCounts, Session, SessionId,
    SurfaceCommand, TargetContextId,
};
pub use config::Config;
pub use coordinator::{ArchiveSink, Coordinator, CoordinatorService, DirectorySink, MemorySink};
pub use snapshot::{DomSnapshot, SnapshotFormat};
pub use surface::{format_file_size, SurfaceView};
pub use util::{Clock, FixedClock, SystemClock};
