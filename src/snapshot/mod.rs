//! DOM snapshot export: a serializable tree of the loaded page, written as
//! pretty JSON or as the raw markup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use scraper::node::Node;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use crate::agent::page::{doctype_string, PageDocument};
use crate::capture::files::sanitize_title;
use crate::capture::CaptureError;
use crate::util::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Html,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Html => "html",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DomNode {
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<DomNode>,
    },
    Text {
        content: String,
    },
    Comment {
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub url: String,
    pub title: Option<String>,
    pub doctype: Option<String>,
    pub captured_at: String,
    pub root: DomNode,
    #[serde(skip)]
    markup: String,
}

impl DomSnapshot {
    pub fn capture(page: &PageDocument, clock: &dyn Clock) -> Self {
        Self::capture_at(page, clock.now())
    }

    fn capture_at(page: &PageDocument, at: DateTime<Utc>) -> Self {
        let doc = page.parse();
        Self {
            url: page.url().to_string(),
            title: page.title(),
            doctype: doctype_string(&doc),
            captured_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            root: element_node(doc.root_element()),
            markup: page.markup(),
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn render(&self, format: SnapshotFormat) -> Result<String, CaptureError> {
        match format {
            SnapshotFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            SnapshotFormat::Html => Ok(self.markup.clone()),
        }
    }

    /// `<title>-snapshot.<ext>`, or `page-snapshot.<ext>` without a title.
    pub fn default_filename(&self, format: SnapshotFormat) -> String {
        let stem = self
            .title
            .as_deref()
            .map(sanitize_title)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "page".to_string());
        format!("{}-snapshot.{}", stem, format.extension())
    }
}

fn element_node(element: ElementRef<'_>) -> DomNode {
    let el = element.value();
    let attributes = el
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let children = element
        .children()
        .filter_map(|child| match child.value() {
            Node::Element(_) => ElementRef::wrap(child).map(element_node),
            Node::Text(text) if !text.text.trim().is_empty() => Some(DomNode::Text {
                content: text.text.to_string(),
            }),
            Node::Comment(comment) => Some(DomNode::Comment {
                content: comment.comment.to_string(),
            }),
            _ => None,
        })
        .collect();

    DomNode::Element {
        tag: el.name().to_string(),
        attributes,
        children,
    }
}

/// Write `snapshot` to `path` in `format`.
pub fn write_snapshot(
    snapshot: &DomSnapshot,
    format: SnapshotFormat,
    path: &Path,
) -> Result<PathBuf, CaptureError> {
    let rendered = snapshot.render(format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, rendered)?;
    tracing::info!(path = %path.display(), format = format.extension(), "Snapshot written");
    Ok(path.to_path_buf())
}
