//! Transport seam
//!
//! A transport turns a byte stream into `ServerEvent`s and `Command`s into
//! bytes. Wire encoding lives behind these traits; the client only sees the
//! decoded feed. `MemoryConnector` is an in-process transport for tests and
//! embedding.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::error::{IndiError, IndiResult};
use crate::event::{Command, ServerEvent};

/// Establishes a transport session with a server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &ClientConfig,
    ) -> IndiResult<(Box<dyn EventSource>, Box<dyn CommandSink>)>;
}

/// Inbound half of a session
#[async_trait]
pub trait EventSource: Send {
    /// Next decoded event, `Ok(None)` once the server has closed the stream.
    /// Must be cancel-safe: the listener races it against shutdown.
    async fn next_event(&mut self) -> IndiResult<Option<ServerEvent>>;
}

/// Outbound half of a session
#[async_trait]
pub trait CommandSink: Send {
    async fn send(&mut self, command: Command) -> IndiResult<()>;

    async fn close(&mut self) -> IndiResult<()> {
        Ok(())
    }
}

type EventFeed = Result<ServerEvent, String>;

struct MemoryEndpoint {
    events: mpsc::UnboundedReceiver<EventFeed>,
    commands: mpsc::UnboundedSender<Command>,
}

/// In-memory connector; each `session()` call queues one server endpoint
/// that the next `connect` picks up.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pending: Arc<Mutex<VecDeque<MemoryEndpoint>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a server endpoint for the next connection
    pub fn session(&self) -> MemoryServer {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.pending.lock().push_back(MemoryEndpoint {
            events: event_rx,
            commands: command_tx,
        });
        MemoryServer {
            events: Some(event_tx),
            commands: command_rx,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        config: &ClientConfig,
    ) -> IndiResult<(Box<dyn EventSource>, Box<dyn CommandSink>)> {
        let endpoint = self.pending.lock().pop_front().ok_or_else(|| {
            IndiError::ConnectionFailed(format!("no server listening at {}", config.address()))
        })?;
        tracing::debug!("Memory transport connected to {}", config.address());
        Ok((
            Box::new(MemoryEventSource {
                events: endpoint.events,
            }),
            Box::new(MemoryCommandSink {
                commands: endpoint.commands,
            }),
        ))
    }
}

struct MemoryEventSource {
    events: mpsc::UnboundedReceiver<EventFeed>,
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn next_event(&mut self) -> IndiResult<Option<ServerEvent>> {
        match self.events.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(msg)) => Err(IndiError::ConnectionFailed(msg)),
            None => Ok(None),
        }
    }
}

struct MemoryCommandSink {
    commands: mpsc::UnboundedSender<Command>,
}

#[async_trait]
impl CommandSink for MemoryCommandSink {
    async fn send(&mut self, command: Command) -> IndiResult<()> {
        self.commands
            .send(command)
            .map_err(|_| IndiError::ChannelClosed("memory server dropped".to_string()))
    }
}

/// Server side of a memory session
pub struct MemoryServer {
    events: Option<mpsc::UnboundedSender<EventFeed>>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl MemoryServer {
    /// Deliver an event; false once the session is closed
    pub fn send(&self, event: ServerEvent) -> bool {
        match &self.events {
            Some(tx) => tx.send(Ok(event)).is_ok(),
            None => false,
        }
    }

    /// Fail the session with a transport error
    pub fn fail(&mut self, msg: impl Into<String>) {
        if let Some(tx) = self.events.take() {
            let _ = tx.send(Err(msg.into()));
        }
    }

    /// Close the stream as the server would
    pub fn close(&mut self) {
        self.events = None;
    }

    pub async fn next_command(&mut self) -> Option<Command> {
        self.commands.recv().await
    }

    pub fn try_command(&mut self) -> Option<Command> {
        self.commands.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BlobMode;

    #[tokio::test]
    async fn test_connect_without_session_fails() {
        let connector = MemoryConnector::new();
        let result = connector.connect(&ClientConfig::default()).await;
        assert!(matches!(result, Err(IndiError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_memory_session_round_trip() {
        let connector = MemoryConnector::new();
        let mut server = connector.session();
        assert_eq!(connector.pending(), 1);

        let (mut source, mut sink) = connector.connect(&ClientConfig::default()).await.unwrap();
        assert_eq!(connector.pending(), 0);

        assert!(server.send(ServerEvent::DeviceDefined("CCD Simulator".to_string())));
        assert_eq!(
            source.next_event().await.unwrap(),
            Some(ServerEvent::DeviceDefined("CCD Simulator".to_string()))
        );

        let command = Command::EnableBlob {
            device: "CCD Simulator".to_string(),
            property: None,
            mode: BlobMode::Also,
        };
        sink.send(command.clone()).await.unwrap();
        assert_eq!(server.next_command().await, Some(command));

        server.close();
        assert!(!server.send(ServerEvent::Connected));
        assert_eq!(source.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_is_reported_once() {
        let connector = MemoryConnector::new();
        let mut server = connector.session();
        let (mut source, _sink) = connector.connect(&ClientConfig::default()).await.unwrap();

        server.fail("connection reset by peer");
        assert!(matches!(
            source.next_event().await,
            Err(IndiError::ConnectionFailed(msg)) if msg == "connection reset by peer"
        ));
        assert_eq!(source.next_event().await.unwrap(), None);
    }
}
