//! CLI definitions for pagepack.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pagepack::snapshot::SnapshotFormat;

/// pagepack CLI.
#[derive(Parser)]
#[command(name = "pagepack")]
#[command(about = "Capture a web page's markup, stylesheets and scripts into a zip archive")]
#[command(version)]
pub(crate) struct Cli {
    /// Data directory for config and logs (default: ~/.pagepack)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Capture a page into <title>-frontend.zip
    Capture {
        /// Page URL
        url: String,

        /// Title used for the archive name (default: the page's <title>)
        #[arg(long)]
        title: Option<String>,

        /// Capture this saved HTML file instead of fetching the page
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Output directory (default: [download] output_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Resources fetched at once within a category
        #[arg(long)]
        concurrency: Option<usize>,

        /// Replace an existing archive with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Export a DOM snapshot of a page
    Snapshot {
        /// Page URL
        url: String,

        /// Snapshot this saved HTML file instead of fetching the page
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = SnapshotFormat::Json)]
        format: SnapshotFormat,

        /// Output file (default: <title>-snapshot.<ext> in the download directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
