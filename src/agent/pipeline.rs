//! The page capture agent: four extraction stages run in sequence, each
//! reported to the coordinator as soon as it finishes.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use url::{Origin, Url};

use crate::agent::fetch::ResourceFetcher;
use crate::agent::page::PageDocument;
use crate::capture::files::{filename_from_url, CapturedFile};
use crate::capture::messages::{AgentCommand, AgentEnvelope, AgentMessage};
use crate::capture::session::{Delivery, SessionId};
use crate::capture::CaptureError;
use crate::util::Clock;

/// Marker that identifies code injected by the capture tooling itself.
pub const DEFAULT_INJECTION_MARKER: &str = "chrome-extension://";

/// Tunables for one agent
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Inline scripts containing this string (and external scripts whose
    /// `src` contains it) are not captured. Empty disables the filter.
    pub injection_marker: String,
    /// Fetches in flight at once within a category. 1 means sequential.
    pub fetch_concurrency: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            injection_marker: DEFAULT_INJECTION_MARKER.to_string(),
            fetch_concurrency: 1,
        }
    }
}

impl AgentOptions {
    pub fn with_injection_marker(mut self, marker: impl Into<String>) -> Self {
        self.injection_marker = marker.into();
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    fn marks(&self, text: &str) -> bool {
        !self.injection_marker.is_empty() && text.contains(self.injection_marker.as_str())
    }
}

/// Extracts markup, stylesheets, scripts and assets from one page.
pub struct PageCaptureAgent {
    page: PageDocument,
    fetcher: Arc<dyn ResourceFetcher>,
    clock: Arc<dyn Clock>,
    options: AgentOptions,
}

impl PageCaptureAgent {
    pub fn new(
        page: PageDocument,
        fetcher: Arc<dyn ResourceFetcher>,
        clock: Arc<dyn Clock>,
        options: AgentOptions,
    ) -> Self {
        Self {
            page,
            fetcher,
            clock,
            options,
        }
    }

    pub fn capture_markup(&self) -> String {
        self.page.markup()
    }

    /// Inline `<style>` blocks followed by every linked stylesheet that could
    /// be fetched. Failed fetches are logged and left out.
    pub async fn capture_stylesheets(&self) -> Vec<CapturedFile> {
        let scan = self.page.scan();

        let mut files: Vec<CapturedFile> = scan
            .inline_styles
            .into_iter()
            .enumerate()
            .map(|(i, css)| CapturedFile::inline(format!("inline-style-{}.css", i), css))
            .collect();

        let urls: Vec<Url> = scan
            .stylesheet_hrefs
            .iter()
            .filter_map(|href| resolve(&scan.base_url, href))
            .collect();

        let fetched: Vec<Option<CapturedFile>> = stream::iter(urls)
            .map(|url| self.fetch_file(url, "css"))
            .buffered(self.concurrency())
            .collect()
            .await;
        files.extend(fetched.into_iter().flatten());
        files
    }

    /// Inline scripts (minus empty and tooling-injected ones) followed by
    /// external scripts. Cross-origin scripts become placeholders without a
    /// request being made.
    pub async fn capture_scripts(&self) -> Vec<CapturedFile> {
        let scan = self.page.scan();

        let mut files: Vec<CapturedFile> = scan
            .inline_scripts
            .into_iter()
            .enumerate()
            .filter(|(_, script)| {
                !script.content.is_empty()
                    && !script.extension_tagged
                    && !self.options.marks(&script.content)
            })
            .map(|(i, script)| {
                CapturedFile::inline(format!("inline-script-{}.js", i), script.content)
            })
            .collect();

        let urls: Vec<Url> = scan
            .script_srcs
            .iter()
            .filter(|src| !src.is_empty() && !self.options.marks(src))
            .filter_map(|src| resolve(&scan.base_url, src))
            .collect();

        let page_origin = self.page.url().origin();
        let fetched: Vec<Option<CapturedFile>> = stream::iter(urls)
            .map(|url| self.script_file(url, &page_origin))
            .buffered(self.concurrency())
            .collect()
            .await;
        files.extend(fetched.into_iter().flatten());
        files
    }

    /// Images, fonts and media are not extracted yet; always empty.
    pub async fn capture_assets(&self) -> Vec<CapturedFile> {
        Vec::new()
    }

    async fn script_file(&self, url: Url, page_origin: &Origin) -> Option<CapturedFile> {
        if url.origin() != *page_origin {
            tracing::debug!(url = %url, "Cross-origin script recorded as placeholder");
            let filename = filename_from_url(url.as_str(), "js", self.clock.timestamp_ms());
            return Some(CapturedFile::external_placeholder(filename, url.as_str()));
        }
        self.fetch_file(url, "js").await
    }

    async fn fetch_file(&self, url: Url, ext: &str) -> Option<CapturedFile> {
        match self.fetcher.fetch_text(&url).await {
            Ok(content) => {
                let filename = filename_from_url(url.as_str(), ext, self.clock.timestamp_ms());
                Some(CapturedFile::fetched(filename, content, url.as_str()))
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Skipping resource that failed to fetch");
                None
            }
        }
    }

    fn concurrency(&self) -> usize {
        self.options.fetch_concurrency.max(1)
    }

    /// Run all four stages for `session_id`, sending each result to
    /// `outbox` before the next stage starts.
    pub async fn capture(
        &self,
        session_id: &SessionId,
        outbox: &mpsc::Sender<AgentEnvelope>,
    ) -> Result<(), CaptureError> {
        let markup = self.capture_markup();
        deliver(session_id, outbox, Delivery::Markup(markup)).await?;

        let styles = self.capture_stylesheets().await;
        deliver(session_id, outbox, Delivery::Styles(styles)).await?;

        let scripts = self.capture_scripts().await;
        deliver(session_id, outbox, Delivery::Scripts(scripts)).await?;

        let assets = self.capture_assets().await;
        deliver(session_id, outbox, Delivery::Assets(assets)).await?;

        Ok(())
    }

    /// Agent task body: wait for `Start`, run the pipeline, stop early on
    /// `Cancel` or when the coordinator drops its end of the link.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<AgentCommand>,
        outbox: mpsc::Sender<AgentEnvelope>,
    ) {
        let (session_id, source_url) = loop {
            match commands.recv().await {
                Some(AgentCommand::Start {
                    session_id,
                    source_url,
                }) => break (session_id, source_url),
                Some(AgentCommand::Cancel) => {
                    tracing::debug!("Capture agent cancelled before start");
                    return;
                }
                None => return,
            }
        };

        tracing::info!(session_id = %session_id, url = %source_url, "Capture agent started");

        tokio::select! {
            result = self.capture(&session_id, &outbox) => {
                if let Err(e) = result {
                    tracing::warn!(session_id = %session_id, error = %e, "Capture agent aborted");
                    let failed = AgentMessage::Failed { message: e.to_string() };
                    let _ = outbox.send(AgentEnvelope::new(session_id.clone(), failed)).await;
                } else {
                    tracing::info!(session_id = %session_id, "Capture agent finished");
                }
            }
            _ = wait_for_cancel(&mut commands) => {
                tracing::info!(session_id = %session_id, "Capture agent stopped on cancel");
            }
        }
    }
}

async fn deliver(
    session_id: &SessionId,
    outbox: &mpsc::Sender<AgentEnvelope>,
    delivery: Delivery,
) -> Result<(), CaptureError> {
    let stage = delivery.stage();
    outbox
        .send(AgentEnvelope::new(session_id.clone(), delivery))
        .await
        .map_err(|_| CaptureError::Agent(format!("coordinator closed before {} arrived", stage)))?;
    tracing::debug!(session_id = %session_id, stage = %stage, "Stage delivered");
    Ok(())
}

async fn wait_for_cancel(commands: &mut mpsc::Receiver<AgentCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            AgentCommand::Cancel => return,
            AgentCommand::Start { session_id, .. } => {
                tracing::warn!(
                    session_id = %session_id,
                    "Ignoring start for an agent that is already running"
                );
            }
        }
    }
}

fn resolve(base: &Url, reference: &str) -> Option<Url> {
    match base.join(reference) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(
                reference = %reference,
                error = %e,
                "Skipping unresolvable resource URL"
            );
            None
        }
    }
}
