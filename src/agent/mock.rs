//! Mock launcher and fetcher for deterministic testing
//!
//! `MockLauncher` implements `AgentLauncher` without touching any page: once
//! it receives `Start` it replays pre-configured agent messages tagged with
//! the launched session. `MockFetcher` answers fetches from a fixed table.
//!
//! # Example
//! ```no_run
//! use pagepack::agent::mock::{MockConfig, MockLauncher, MockMessageBuilder};
//!
//! let messages = MockMessageBuilder::new()
//!     .markup("<html></html>")
//!     .inline_style("body{}")
//!     .no_scripts()
//!     .no_assets()
//!     .build();
//!
//! let launcher = MockLauncher::new().with_config(MockConfig::default().with_messages(messages));
//! // Hand the launcher to a Coordinator...
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::agent::fetch::ResourceFetcher;
use crate::agent::launcher::{AgentLauncher, AgentLink, LaunchRequest};
use crate::capture::files::CapturedFile;
use crate::capture::messages::{AgentCommand, AgentEnvelope, AgentMessage};
use crate::capture::CaptureError;

/// Configuration for mock agent behavior
#[derive(Clone, Default)]
pub struct MockConfig {
    /// Messages to emit once started
    pub messages: Vec<AgentMessage>,
    /// Delay before each message
    pub message_delay: Duration,
    /// Whether launch() should fail
    pub fail_on_launch: bool,
    /// Reason reported when failing
    pub launch_error: Option<String>,
}

impl MockConfig {
    pub fn with_messages(mut self, messages: Vec<AgentMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Configure delay between emitting messages (default: Duration::ZERO)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.message_delay = delay;
        self
    }

    /// Configure the mock to fail on launch with `reason`
    pub fn failing_with(mut self, reason: impl Into<String>) -> Self {
        self.fail_on_launch = true;
        self.launch_error = Some(reason.into());
        self
    }
}

/// Mock agent launcher for testing
///
/// Captures every launch request and every command the coordinator sends
/// so tests can assert on them afterwards.
#[derive(Clone, Default)]
pub struct MockLauncher {
    config: MockConfig,
    captured_requests: Arc<Mutex<Vec<LaunchRequest>>>,
    captured_commands: Arc<Mutex<Vec<AgentCommand>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: MockConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure messages to emit (convenience method)
    pub fn with_messages(mut self, messages: Vec<AgentMessage>) -> Self {
        self.config.messages = messages;
        self
    }

    /// Get captured launch requests for assertions
    pub fn captured_requests(&self) -> Vec<LaunchRequest> {
        self.captured_requests.lock().clone()
    }

    /// Get commands received by any launched agent
    pub fn captured_commands(&self) -> Vec<AgentCommand> {
        self.captured_commands.lock().clone()
    }

    /// Check if a cancel reached an agent
    pub fn was_cancelled(&self) -> bool {
        self.captured_commands
            .lock()
            .iter()
            .any(|c| matches!(c, AgentCommand::Cancel))
    }

    /// Reset all captured state
    pub fn reset(&self) {
        self.captured_requests.lock().clear();
        self.captured_commands.lock().clear();
    }
}

#[async_trait]
impl AgentLauncher for MockLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentLink, CaptureError> {
        self.captured_requests.lock().push(request.clone());

        if self.config.fail_on_launch {
            let reason = self
                .config
                .launch_error
                .clone()
                .unwrap_or_else(|| "mock-failure".into());
            return Err(CaptureError::Injection(reason));
        }

        let (command_tx, mut command_rx) = mpsc::channel::<AgentCommand>(8);
        let (message_tx, message_rx) = mpsc::channel(32);
        let messages = self.config.messages.clone();
        let delay = self.config.message_delay;
        let session_id = request.session_id.clone();
        let commands = self.captured_commands.clone();

        tokio::spawn(async move {
            // Idle until started, like a real agent
            match command_rx.recv().await {
                Some(command) => {
                    let started = matches!(command, AgentCommand::Start { .. });
                    commands.lock().push(command);
                    if !started {
                        return;
                    }
                }
                None => return,
            }

            for message in messages {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }

                while let Ok(command) = command_rx.try_recv() {
                    let cancelled = matches!(command, AgentCommand::Cancel);
                    commands.lock().push(command);
                    if cancelled {
                        return;
                    }
                }

                let envelope = AgentEnvelope::new(session_id.clone(), message);
                if message_tx.send(envelope).await.is_err() {
                    break; // Coordinator dropped the link
                }
            }

            // Keep recording late commands until the link is dropped
            while let Some(command) = command_rx.recv().await {
                commands.lock().push(command);
            }
        });

        Ok(AgentLink::new(command_tx, message_rx))
    }
}

/// Builder for agent message sequences
///
/// Stage helpers append one delivery each; call them in pipeline order for a
/// well-behaved agent, or out of order to exercise rejection.
#[derive(Default)]
pub struct MockMessageBuilder {
    messages: Vec<AgentMessage>,
}

impl MockMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markup(mut self, html: &str) -> Self {
        self.messages.push(AgentMessage::MarkupDelivered {
            html: html.to_string(),
        });
        self
    }

    pub fn styles(mut self, files: Vec<CapturedFile>) -> Self {
        self.messages.push(AgentMessage::StylesDelivered { files });
        self
    }

    /// Styles stage with one inline block
    pub fn inline_style(self, css: &str) -> Self {
        self.styles(vec![CapturedFile::inline("inline-style-0.css", css)])
    }

    pub fn scripts(mut self, files: Vec<CapturedFile>) -> Self {
        self.messages.push(AgentMessage::ScriptsDelivered { files });
        self
    }

    /// Scripts stage with one inline block
    pub fn inline_script(self, js: &str) -> Self {
        self.scripts(vec![CapturedFile::inline("inline-script-0.js", js)])
    }

    pub fn no_scripts(self) -> Self {
        self.scripts(Vec::new())
    }

    pub fn assets(mut self, files: Vec<CapturedFile>) -> Self {
        self.messages.push(AgentMessage::AssetsDelivered { files });
        self
    }

    pub fn no_assets(self) -> Self {
        self.assets(Vec::new())
    }

    pub fn failed(mut self, message: &str) -> Self {
        self.messages.push(AgentMessage::Failed {
            message: message.to_string(),
        });
        self
    }

    pub fn build(self) -> Vec<AgentMessage> {
        self.messages
    }
}

/// Fetcher that serves canned bodies and records every URL asked for.
///
/// URLs with no configured answer fail with `HTTP 404`.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<String, String>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.responses
            .insert(url.to_string(), Err(reason.to_string()));
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Shared handle on the request log, usable after the fetcher is moved.
    pub fn request_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, CaptureError> {
        self.requests.lock().push(url.to_string());
        match self.responses.get(url.as_str()) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(reason)) => Err(CaptureError::Fetch {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Err(CaptureError::Fetch {
                url: url.to_string(),
                reason: "HTTP 404".into(),
            }),
        }
    }
}
