//! Loaded page documents and the DOM walk that finds their resources.
//!
//! `scraper::Html` is not `Send`, so every read parses the source inside a
//! synchronous call and hands back owned data. Nothing here holds a parsed
//! tree across an await point.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A page as loaded in a target context: its source and the URL it was
/// served from.
#[derive(Debug, Clone)]
pub struct PageDocument {
    html: String,
    url: Url,
}

/// Resource references found by one walk of the document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScan {
    /// URL relative references resolve against (`<base href>` or the page URL)
    pub base_url: Url,
    /// Text of every `<style>` element
    pub inline_styles: Vec<String>,
    /// `href` of every `<link rel="stylesheet">`
    pub stylesheet_hrefs: Vec<String>,
    /// Every `<script>` without a `src` attribute
    pub inline_scripts: Vec<InlineScript>,
    /// `src` of every `<script src>`
    pub script_srcs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineScript {
    pub content: String,
    /// Carries a `data-extension-id` attribute
    pub extension_tagged: bool,
}

impl PageDocument {
    pub fn new(html: impl Into<String>, url: Url) -> Self {
        Self {
            html: html.into(),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Serialize the document: reconstructed doctype plus the root element's
    /// outer HTML.
    pub fn markup(&self) -> String {
        if self.html.trim().is_empty() {
            return String::new();
        }
        let doc = self.parse();
        let mut out = doctype_string(&doc).unwrap_or_default();
        out.push_str(&doc.root_element().html());
        out
    }

    /// Text of the first `<title>`, trimmed.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        let doc = self.parse();
        let title = doc
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())?;
        (!title.is_empty()).then_some(title)
    }

    /// Walk the element tree once and collect every resource reference.
    pub fn scan(&self) -> PageScan {
        let doc = self.parse();
        let mut walk = Walk::default();
        walk.visit(doc.root_element());

        let base_url = walk
            .base_href
            .as_deref()
            .and_then(|href| self.url.join(href).ok())
            .unwrap_or_else(|| self.url.clone());

        PageScan {
            base_url,
            inline_styles: walk.inline_styles,
            stylesheet_hrefs: walk.stylesheet_hrefs,
            inline_scripts: walk.inline_scripts,
            script_srcs: walk.script_srcs,
        }
    }
}

/// `<!DOCTYPE name PUBLIC "public-id" "system-id">`, omitting empty parts.
pub(crate) fn doctype_string(doc: &Html) -> Option<String> {
    doc.tree.root().children().find_map(|node| match node.value() {
        Node::Doctype(doctype) => {
            let mut out = format!("<!DOCTYPE {}", doctype.name());
            if !doctype.public_id().is_empty() {
                out.push_str(&format!(" PUBLIC \"{}\"", doctype.public_id()));
            }
            if !doctype.system_id().is_empty() {
                out.push_str(&format!(" \"{}\"", doctype.system_id()));
            }
            out.push('>');
            Some(out)
        }
        _ => None,
    })
}

#[derive(Default)]
struct Walk {
    base_href: Option<String>,
    inline_styles: Vec<String>,
    stylesheet_hrefs: Vec<String>,
    inline_scripts: Vec<InlineScript>,
    script_srcs: Vec<String>,
}

impl Walk {
    fn visit(&mut self, element: ElementRef<'_>) {
        let el = element.value();
        match el.name() {
            "style" => self.inline_styles.push(element.text().collect()),
            "link" if is_stylesheet(el.attr("rel")) => {
                if let Some(href) = el.attr("href").filter(|h| !h.trim().is_empty()) {
                    self.stylesheet_hrefs.push(href.trim().to_string());
                }
            }
            "script" => match el.attr("src") {
                Some(src) => self.script_srcs.push(src.trim().to_string()),
                None => self.inline_scripts.push(InlineScript {
                    content: element.text().collect(),
                    extension_tagged: el.attr("data-extension-id").is_some(),
                }),
            },
            "base" if self.base_href.is_none() => {
                self.base_href = el.attr("href").map(str::to_string);
            }
            _ => {}
        }

        for child in element.children() {
            if let Some(child) = ElementRef::wrap(child) {
                self.visit(child);
            }
        }
    }
}

fn is_stylesheet(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}
