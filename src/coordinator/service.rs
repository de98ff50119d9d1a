//! Event loop that drives a [`Coordinator`] from surface commands and agent
//! messages.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::launcher::AgentLink;
use crate::capture::messages::{AgentEnvelope, SurfaceCommand};
use crate::coordinator::Coordinator;

const COMMAND_BUFFER: usize = 16;

pub struct CoordinatorService {
    coordinator: Coordinator,
}

impl CoordinatorService {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub async fn handle_command(&mut self, command: SurfaceCommand) {
        match command {
            SurfaceCommand::Start {
                target,
                source_url,
                title,
            } => {
                if let Err(e) = self
                    .coordinator
                    .begin_session(target, source_url, title)
                    .await
                {
                    tracing::debug!(error = %e, "Start command failed");
                }
            }
            SurfaceCommand::Cancel => self.coordinator.cancel_session(),
            SurfaceCommand::Download { session_id } => {
                if let Err(e) = self.coordinator.retrieve_archive(&session_id).await {
                    tracing::debug!(error = %e, "Download command failed");
                }
            }
        }
    }

    /// Process commands and agent messages until the command channel closes.
    /// Returns the coordinator so its final state can be inspected.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SurfaceCommand>) -> Coordinator {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                envelope = next_message(self.coordinator.agent_mut()) => match envelope {
                    Some(envelope) => self.coordinator.receive(envelope),
                    None => self.coordinator.agent_disconnected(),
                },
            }
        }
        tracing::debug!("Coordinator service stopped");
        self.coordinator
    }

    /// Run on its own task.
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx));
        CoordinatorHandle { commands: tx, task }
    }
}

/// Next message from the running agent, or never if there is none.
async fn next_message(agent: &mut Option<AgentLink>) -> Option<AgentEnvelope> {
    match agent {
        Some(link) => link.messages.recv().await,
        None => std::future::pending().await,
    }
}

/// The surface's end of a spawned [`CoordinatorService`].
pub struct CoordinatorHandle {
    commands: mpsc::Sender<SurfaceCommand>,
    task: JoinHandle<Coordinator>,
}

impl CoordinatorHandle {
    /// Returns false once the service has stopped.
    pub async fn send(&self, command: SurfaceCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Close the command channel and wait for the service to finish.
    pub async fn shutdown(self) -> Result<Coordinator, tokio::task::JoinError> {
        drop(self.commands);
        self.task.await
    }
}
