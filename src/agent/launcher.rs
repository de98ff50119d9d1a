//! Starting a capture agent inside a target context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use url::Url;

use crate::agent::fetch::ResourceFetcher;
use crate::agent::page::PageDocument;
use crate::agent::pipeline::{AgentOptions, PageCaptureAgent};
use crate::capture::messages::{AgentCommand, AgentEnvelope};
use crate::capture::session::{SessionId, TargetContextId};
use crate::capture::CaptureError;
use crate::util::Clock;

const COMMAND_BUFFER: usize = 8;
const MESSAGE_BUFFER: usize = 32;

/// What the coordinator asks for when it starts a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub session_id: SessionId,
    pub target: TargetContextId,
    pub source_url: String,
}

/// The coordinator's end of a running agent: commands go in, tagged stage
/// results come out.
#[derive(Debug)]
pub struct AgentLink {
    pub commands: mpsc::Sender<AgentCommand>,
    pub messages: mpsc::Receiver<AgentEnvelope>,
}

impl AgentLink {
    pub fn new(
        commands: mpsc::Sender<AgentCommand>,
        messages: mpsc::Receiver<AgentEnvelope>,
    ) -> Self {
        Self { commands, messages }
    }

    /// Best-effort cancel. Never waits and never fails the caller.
    pub fn cancel(&self) {
        if let Err(e) = self.commands.try_send(AgentCommand::Cancel) {
            tracing::debug!(error = %e, "Cancel not delivered to agent");
        }
    }
}

/// Abstraction over how an agent gets into its target context
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Start an agent for `request`. The agent idles until it receives
    /// [`AgentCommand::Start`] on the returned link.
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentLink, CaptureError>;
}

/// Spawn `agent` on the runtime and hand back its link.
pub fn spawn_agent(agent: PageCaptureAgent) -> AgentLink {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (message_tx, message_rx) = mpsc::channel(MESSAGE_BUFFER);
    tokio::spawn(agent.run(command_rx, message_tx));
    AgentLink::new(command_tx, message_rx)
}

/// Launches [`PageCaptureAgent`]s against fetched or pre-registered pages.
///
/// A target with a registered document is captured from that document;
/// any other target is loaded by fetching the request's source URL.
pub struct PageLauncher {
    fetcher: Arc<dyn ResourceFetcher>,
    clock: Arc<dyn Clock>,
    options: AgentOptions,
    documents: RwLock<HashMap<TargetContextId, PageDocument>>,
}

impl PageLauncher {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        clock: Arc<dyn Clock>,
        options: AgentOptions,
    ) -> Self {
        Self {
            fetcher,
            clock,
            options,
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_document(self, target: TargetContextId, document: PageDocument) -> Self {
        self.register_document(target, document);
        self
    }

    /// Make `document` the page loaded in `target`.
    pub fn register_document(&self, target: TargetContextId, document: PageDocument) {
        self.documents.write().insert(target, document);
    }

    async fn load(&self, request: &LaunchRequest) -> Result<PageDocument, CaptureError> {
        let registered = self.documents.read().get(&request.target).cloned();
        if let Some(document) = registered {
            return Ok(document);
        }

        let url = Url::parse(&request.source_url)
            .map_err(|e| CaptureError::Injection(format!("invalid page URL: {}", e)))?;
        let (final_url, html) = self
            .fetcher
            .fetch_document(&url)
            .await
            .map_err(|e| CaptureError::Injection(e.to_string()))?;
        Ok(PageDocument::new(html, final_url))
    }
}

#[async_trait]
impl AgentLauncher for PageLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentLink, CaptureError> {
        let document = self.load(request).await?;
        tracing::debug!(
            session_id = %request.session_id,
            context = %request.target,
            url = %document.url(),
            "Launching capture agent"
        );
        let agent = PageCaptureAgent::new(
            document,
            self.fetcher.clone(),
            self.clock.clone(),
            self.options.clone(),
        );
        Ok(spawn_agent(agent))
    }
}
