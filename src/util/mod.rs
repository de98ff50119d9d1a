//! Utility modules

pub mod clock;
pub mod paths;

pub use clock::{Clock, FixedClock, SystemClock};
pub use paths::{config_path, data_dir, default_download_dir, log_file_path, logs_dir};
