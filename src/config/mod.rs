mod settings;

pub use settings::{AgentConfig, Config, DownloadConfig, FetchConfig, EXAMPLE_CONFIG};
