//! Zip archive layout for a finished capture.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use zip::write::FileOptions;

use crate::capture::files::{asset_type_for, CapturedFile};
use crate::capture::session::{ResourceCounts, Session};
use crate::capture::CaptureError;

pub const INDEX_HTML: &str = "index.html";
pub const MANIFEST_JSON: &str = "manifest.json";
const CSS_DIR: &str = "css";
const JS_DIR: &str = "js";
const ASSETS_DIR: &str = "assets";

/// Summary stored as `manifest.json` at the archive root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub title: String,
    pub url: String,
    /// ISO-8601, millisecond precision, UTC
    pub capture_date: String,
    pub counts: ResourceCounts,
}

impl Manifest {
    pub fn new(session: &Session, captured_at: DateTime<Utc>) -> Self {
        Self {
            title: session.title.clone(),
            url: session.source_url.clone(),
            capture_date: captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            counts: session.counts,
        }
    }
}

/// Ordered archive entries. Writing a path twice keeps the first position
/// and the last content.
#[derive(Debug, Default)]
pub struct ArchiveLayout {
    entries: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl ArchiveLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out a collected session. Fails if any slot is still empty.
    pub fn from_session(session: &Session, manifest: &Manifest) -> Result<Self, CaptureError> {
        let resources = &session.resources;
        let missing = || CaptureError::Assembly("capture data incomplete".to_string());
        let html = resources.html.as_ref().ok_or_else(missing)?;
        let css = resources.css.as_ref().ok_or_else(missing)?;
        let js = resources.js.as_ref().ok_or_else(missing)?;
        let assets = resources.assets.as_ref().ok_or_else(missing)?;

        let mut layout = Self::new();
        layout.insert(INDEX_HTML, html.as_bytes().to_vec());
        for file in css {
            layout.insert_file(CSS_DIR, file);
        }
        for file in js {
            layout.insert_file(JS_DIR, file);
        }
        for file in assets {
            let folder = match file.asset_type.as_deref() {
                Some(t) if !safe_component(t).is_empty() => safe_component(t),
                _ => asset_type_for(&file.filename).to_string(),
            };
            layout.insert_file(&format!("{}/{}", ASSETS_DIR, folder), file);
        }
        layout.insert(MANIFEST_JSON, serde_json::to_vec_pretty(manifest)?);
        Ok(layout)
    }

    pub fn insert(&mut self, path: impl Into<String>, content: Vec<u8>) {
        let path = path.into();
        match self.index.get(&path) {
            Some(&i) => {
                tracing::debug!(path = %path, "Archive entry overwritten");
                self.entries[i].1 = content;
            }
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, content));
            }
        }
    }

    fn insert_file(&mut self, folder: &str, file: &CapturedFile) {
        let name = safe_component(&file.filename);
        let name = if name.is_empty() { "unnamed".to_string() } else { name };
        self.insert(format!("{}/{}", folder, name), file.content.as_bytes().to_vec());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry, deflate-compressed, into an in-memory zip.
    pub fn write_zip(&self) -> Result<Vec<u8>, CaptureError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (path, content) in &self.entries {
            zip.start_file(path.as_str(), options)?;
            zip.write_all(content)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Keep a single path component: separators and `..` cannot escape the
/// folder the entry is placed in.
fn safe_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}
