pub mod fetch;
pub mod launcher;
pub mod mock;
pub mod page;
pub mod pipeline;

pub use fetch::{HttpFetcher, ResourceFetcher, DEFAULT_USER_AGENT};
pub use launcher::{spawn_agent, AgentLauncher, AgentLink, LaunchRequest, PageLauncher};
pub use page::{InlineScript, PageDocument, PageScan};
pub use pipeline::{AgentOptions, PageCaptureAgent, DEFAULT_INJECTION_MARKER};
