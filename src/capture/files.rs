//! Captured resource units and the naming rules applied to them.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Longest sanitized title used in an archive filename.
pub const MAX_TITLE_LEN: usize = 50;

/// Suffix appended to every downloaded archive.
pub const ARCHIVE_SUFFIX: &str = "-frontend.zip";

/// One captured stylesheet, script or asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFile {
    pub filename: String,
    pub content: String,
    /// Absolute URL the content came from; absent for inline blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub is_inline: bool,
    /// Set for cross-origin resources whose content was not fetched
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_external: bool,
    /// Archive subfolder under `assets/`; only meaningful for assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

impl CapturedFile {
    pub fn inline(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            source_url: None,
            is_inline: true,
            is_external: false,
            asset_type: None,
        }
    }

    pub fn fetched(
        filename: impl Into<String>,
        content: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            source_url: Some(source_url.into()),
            is_inline: false,
            is_external: false,
            asset_type: None,
        }
    }

    /// Stand-in for a cross-origin script that was deliberately not fetched.
    pub fn external_placeholder(filename: impl Into<String>, source_url: &str) -> Self {
        Self {
            filename: filename.into(),
            content: format!(
                "// External script from {}\n// Note: Content not available due to cross-origin restrictions",
                source_url
            ),
            source_url: Some(source_url.to_string()),
            is_inline: false,
            is_external: true,
            asset_type: None,
        }
    }

    pub fn with_asset_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = Some(asset_type.into());
        self
    }

    /// Content length in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Derive an archive filename from a resource URL.
///
/// Takes the last path segment; when it is missing or has no extension, a
/// `file-<timestamp>.<ext>` name is synthesized instead. Every character
/// outside `[A-Za-z0-9.]` is then replaced with `_`, so a synthesized name
/// for a parsed URL reads `file_<timestamp>.<ext>`. A URL that does not parse
/// gets the synthesized name as is.
pub fn filename_from_url(url: &str, default_ext: &str, timestamp_ms: i64) -> String {
    let synthesized = || format!("file-{}.{}", timestamp_ms, default_ext);

    let name = match Url::parse(url) {
        Ok(parsed) => match parsed.path().rsplit('/').next() {
            Some(segment) if segment.contains('.') => segment.to_string(),
            _ => synthesized(),
        },
        Err(_) => return synthesized(),
    };

    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn non_alphanumeric_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"))
}

/// Turn a page title into a filesystem-safe stem.
///
/// Runs of non-alphanumeric characters collapse to a single `_` and the
/// result is cut to [`MAX_TITLE_LEN`] characters. Applying it twice yields
/// the same string.
pub fn sanitize_title(title: &str) -> String {
    let collapsed = non_alphanumeric_runs().replace_all(title, "_");
    collapsed.chars().take(MAX_TITLE_LEN).collect()
}

/// Filename offered when saving the archive for `title`.
pub fn archive_filename(title: &str) -> String {
    let stem = sanitize_title(title);
    let stem = if stem.is_empty() { "page".to_string() } else { stem };
    format!("{}{}", stem, ARCHIVE_SUFFIX)
}

/// Pick the `assets/<type>` folder for a file from its MIME type.
pub fn asset_type_for(filename: &str) -> &'static str {
    match mime_guess::from_path(filename).first() {
        Some(mime) => match mime.type_().as_str() {
            "image" => "images",
            "font" => "fonts",
            "audio" | "video" => "media",
            _ => "other",
        },
        None => "other",
    }
}
