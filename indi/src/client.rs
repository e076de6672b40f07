//! INDI client implementation
//!
//! This module provides the client session:
//! - Transport connection with a configurable timeout
//! - A listener task that feeds transport events through the dispatcher
//! - A writer task draining the outbound command channel
//! - Permission and switch-rule checks before writes
//! - BLOB mode negotiation, client-wide or per device/property
//! - Device and property watch filters

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::device::{Device, DeviceMessage};
use crate::dispatcher::{ClientDispatcher, ConnectionState, SessionState};
use crate::error::{IndiError, IndiResult};
use crate::event::{Command, DisconnectReason, OutgoingBlob, ServerEvent};
use crate::handler::ClientHandler;
use crate::protocol::standard_properties::{CONNECT, CONNECTION, DISCONNECT};
use crate::protocol::{BlobMode, PropertyKind, SwitchState};
use crate::transport::{CommandSink, Connector, EventSource};
use crate::vector::{
    BlobVector, NumberVector, PropertyVector, SwitchVector, TextVector, VectorInfo, WidgetValue,
};
use crate::widget::NumberValue;

/// Tasks and channels of one live connection
struct ActiveConnection {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Resets a `Connecting` state on early return or cancellation
struct ConnectingGuard<'a> {
    session: &'a SessionState,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(session: &'a SessionState) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.set_connection_state(ConnectionState::Disconnected);
        }
    }
}

/// INDI client
///
/// Owns the session state shared with its listener task. Callbacks go to the
/// `ClientHandler` given at construction and run on the listener task.
pub struct IndiClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn ClientHandler>,
    session: Arc<SessionState>,
    connection: Mutex<Option<ActiveConnection>>,
}

impl IndiClient {
    /// Create a client with the default configuration
    pub fn new(connector: Arc<dyn Connector>, handler: Arc<dyn ClientHandler>) -> Self {
        Self::with_config(connector, handler, ClientConfig::default())
    }

    pub fn with_config(
        connector: Arc<dyn Connector>,
        handler: Arc<dyn ClientHandler>,
        config: ClientConfig,
    ) -> Self {
        let session = Arc::new(SessionState::new(&config));
        Self {
            config,
            connector,
            handler,
            session,
            connection: Mutex::new(None),
        }
    }

    /// Change the server address; takes effect on the next connection
    pub fn set_server(&mut self, host: impl Into<String>, port: u16) {
        self.config.host = host.into();
        self.config.port = port;
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Connect to the INDI server
    ///
    /// Returns once `server_connected` has been delivered. Property requests
    /// are queued right after: one `getProperties` per watched device or
    /// property, or a single global one when nothing is watched.
    pub async fn connect_server(&self) -> IndiResult<()> {
        let mut slot = self.connection.lock().await;
        if self.session.connection_state() != ConnectionState::Disconnected {
            return Err(IndiError::AlreadyConnected);
        }
        // A session the server closed leaves finished tasks behind
        if let Some(stale) = slot.take() {
            Self::join_tasks(stale).await;
        }

        let addr = self.config.address();
        let connection_timeout = self.config.connection_timeout();
        tracing::info!("Connecting to INDI server {}", addr);
        self.session.set_connection_state(ConnectionState::Connecting);
        let mut connecting = ConnectingGuard::new(&self.session);

        let (source, sink) =
            match timeout(connection_timeout, self.connector.connect(&self.config)).await {
                Ok(Ok(halves)) => halves,
                Ok(Err(e)) => {
                    return Err(match e {
                        IndiError::ConnectionFailed(msg) => IndiError::ConnectionFailed(format!(
                            "Failed to connect to INDI server at {}: {}",
                            addr, msg
                        )),
                        other => other,
                    });
                }
                Err(_) => {
                    return Err(IndiError::ConnectionTimeout {
                        host: self.config.host.clone(),
                        port: self.config.port,
                        duration: connection_timeout,
                    });
                }
            };

        let (command_tx, command_rx) = mpsc::channel::<Command>(self.config.command_buffer);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let writer = tokio::spawn(Self::writer_task(sink, command_rx));
        let dispatcher = ClientDispatcher::with_session(
            self.session.clone(),
            self.handler.clone(),
            Some(command_tx.clone()),
        );
        let listener = tokio::spawn(Self::listener_task(source, dispatcher, shutdown_rx, ready_tx));

        // From here the listener owns the state; a cancelled caller leaves a
        // session that `disconnect_server` can still tear down.
        *slot = Some(ActiveConnection {
            command_tx: command_tx.clone(),
            shutdown_tx: Some(shutdown_tx),
            listener,
            writer,
        });
        connecting.disarm();

        if ready_rx.await.is_err() {
            tracing::error!("INDI listener task ended before the session started");
        }

        for command in self.initial_requests() {
            command_tx.send(command).await.map_err(|e| {
                IndiError::ChannelClosed(format!("Failed to request properties from {}: {}", addr, e))
            })?;
        }
        Ok(())
    }

    /// Disconnect from the INDI server
    ///
    /// Waits for the listener to finish its current callback and deliver
    /// `server_disconnected` before returning.
    pub async fn disconnect_server(&self) -> IndiResult<()> {
        let mut slot = self.connection.lock().await;
        let mut connection = slot.take().ok_or(IndiError::NotConnected)?;
        tracing::info!("Disconnecting from INDI server {}", self.config.address());

        if let Some(tx) = connection.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Self::join_tasks(connection).await;
        Ok(())
    }

    async fn join_tasks(connection: ActiveConnection) {
        let ActiveConnection {
            command_tx,
            shutdown_tx,
            listener,
            writer,
        } = connection;
        drop(shutdown_tx);
        if let Err(e) = listener.await {
            tracing::error!("INDI listener task failed: {}", e);
        }
        // The writer drains once the last command sender is gone
        drop(command_tx);
        if let Err(e) = writer.await {
            tracing::error!("INDI writer task failed: {}", e);
        }
    }

    pub fn is_server_connected(&self) -> bool {
        self.session.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    fn initial_requests(&self) -> Vec<Command> {
        let version = self.config.protocol_version.clone();
        let watch = self.session.watch();
        if watch.is_empty() {
            return vec![Command::GetProperties {
                version,
                device: None,
                property: None,
            }];
        }
        let mut commands = Vec::new();
        for (device, properties) in watch.entries() {
            if properties.is_empty() {
                commands.push(Command::GetProperties {
                    version: version.clone(),
                    device: Some(device),
                    property: None,
                });
                continue;
            }
            for property in properties {
                commands.push(Command::GetProperties {
                    version: version.clone(),
                    device: Some(device.clone()),
                    property: Some(property),
                });
            }
        }
        commands
    }

    async fn writer_task(mut sink: Box<dyn CommandSink>, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            if let Err(e) = sink.send(command).await {
                tracing::error!("INDI write error: {}", e);
                break;
            }
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("INDI transport close error: {}", e);
        }
    }

    /// Listener task: the single context all callbacks run on
    ///
    /// Delivers `Connected`, then applies transport events until the server
    /// closes the stream, the transport fails, or shutdown is requested, and
    /// finally delivers `Disconnected` with the matching reason.
    async fn listener_task(
        mut source: Box<dyn EventSource>,
        dispatcher: ClientDispatcher,
        mut shutdown_rx: oneshot::Receiver<()>,
        ready_tx: oneshot::Sender<()>,
    ) {
        Self::apply(&dispatcher, ServerEvent::Connected);
        let _ = ready_tx.send(());

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("INDI listener received shutdown signal - graceful stop");
                    break DisconnectReason::Requested;
                }
                event = source.next_event() => match event {
                    Ok(Some(ServerEvent::Disconnected(reason))) => break reason,
                    Ok(Some(event)) => Self::apply(&dispatcher, event),
                    Ok(None) => {
                        tracing::info!("INDI server closed the connection");
                        break DisconnectReason::ServerClosed;
                    }
                    Err(e) => {
                        tracing::error!("INDI listener error: {}", e);
                        break DisconnectReason::IoFailure(e.to_string());
                    }
                }
            }
        };

        Self::apply(&dispatcher, ServerEvent::Disconnected(reason));
    }

    fn apply(dispatcher: &ClientDispatcher, event: ServerEvent) {
        if let Err(e) = dispatcher.dispatch(event) {
            tracing::warn!("Rejected INDI event: {}", e);
            dispatcher.handler().dispatch_error(&e);
        }
    }

    // =========================================================================
    // DEVICES
    // =========================================================================

    pub fn devices(&self) -> Vec<Device> {
        self.session.devices()
    }

    pub fn device(&self, name: &str) -> Option<Device> {
        self.session.device(name)
    }

    /// Messages sent without a device
    pub fn server_messages(&self) -> Vec<DeviceMessage> {
        self.session.server_messages()
    }

    /// Only receive `device`. Register watches before connecting so the
    /// initial requests are scoped to them.
    pub fn watch_device(&self, device: &str) {
        self.session.watch_device(device);
    }

    /// Only receive `property` of `device`
    pub fn watch_property(&self, device: &str, property: &str) {
        self.session.watch_property(device, property);
    }

    // =========================================================================
    // BLOB MODE
    // =========================================================================

    /// Set the BLOB mode client-wide (empty `device`), for a device, or for
    /// one property. Applied to the server immediately when connected.
    pub async fn set_blob_mode(
        &self,
        mode: BlobMode,
        device: &str,
        property: Option<&str>,
    ) -> IndiResult<()> {
        self.session.set_blob_mode(device, property, mode);
        if !self.is_server_connected() {
            return Ok(());
        }

        if device.is_empty() {
            let policy = self.session.blob_policy();
            for known in self.session.devices() {
                self.send_command(Command::EnableBlob {
                    device: known.name().to_string(),
                    property: None,
                    mode: policy.mode_for(known.name(), None),
                })
                .await?;
            }
            Ok(())
        } else {
            self.send_command(Command::EnableBlob {
                device: device.to_string(),
                property: property.map(str::to_string),
                mode,
            })
            .await
        }
    }

    pub fn blob_mode(&self, device: &str, property: Option<&str>) -> BlobMode {
        self.session.blob_policy().mode_for(device, property)
    }

    // =========================================================================
    // OUTBOUND VECTORS
    // =========================================================================

    async fn send_command(&self, command: Command) -> IndiResult<()> {
        let tx = {
            let slot = self.connection.lock().await;
            match slot.as_ref() {
                Some(connection) if self.is_server_connected() => connection.command_tx.clone(),
                _ => return Err(IndiError::NotConnected),
            }
        };
        tx.send(command).await.map_err(|e| {
            IndiError::ChannelClosed(format!(
                "Failed to send INDI command to {}:{}: {}. The connection may have been lost.",
                self.config.host, self.config.port, e
            ))
        })
    }

    /// Check property permission before write
    fn check_write_permission(info: &VectorInfo, kind: PropertyKind) -> IndiResult<()> {
        if kind == PropertyKind::Light || !info.permission.is_writable() {
            return Err(IndiError::PermissionDenied(format!(
                "Property '{}.{}' is read-only",
                info.device, info.name
            )));
        }
        Ok(())
    }

    pub async fn send_new_text(&self, vector: &TextVector) -> IndiResult<()> {
        Self::check_write_permission(vector.info(), vector.kind())?;
        self.send_command(Command::NewText(vector.clone())).await
    }

    /// Send a number vector; every value must lie within its bounds
    pub async fn send_new_number(&self, vector: &NumberVector) -> IndiResult<()> {
        Self::check_write_permission(vector.info(), vector.kind())?;
        <NumberValue as WidgetValue>::check(vector)?;
        self.send_command(Command::NewNumber(vector.clone())).await
    }

    /// Send a switch vector; it must satisfy its rule, so a `reset()` copy
    /// has to be completed first
    pub async fn send_new_switch(&self, vector: &SwitchVector) -> IndiResult<()> {
        Self::check_write_permission(vector.info(), vector.kind())?;
        vector.validate_rule()?;
        self.send_command(Command::NewSwitch(vector.clone())).await
    }

    pub async fn send_new_blob(&self, vector: &BlobVector) -> IndiResult<()> {
        Self::check_write_permission(vector.info(), vector.kind())?;
        let command = Command::from_vector(&PropertyVector::Blob(vector.clone()))
            .ok_or_else(|| IndiError::PermissionDenied(vector.name().to_string()))?;
        self.send_command(command).await
    }

    /// Send any vector kind; lights are read-only
    pub async fn send_new_property(&self, vector: &PropertyVector) -> IndiResult<()> {
        match vector {
            PropertyVector::Text(v) => self.send_new_text(v).await,
            PropertyVector::Number(v) => self.send_new_number(v).await,
            PropertyVector::Switch(v) => self.send_new_switch(v).await,
            PropertyVector::Blob(v) => self.send_new_blob(v).await,
            PropertyVector::Light(v) => Self::check_write_permission(v.info(), v.kind()),
        }
    }

    /// Upload one BLOB element; the payload length is explicit and may
    /// contain zero bytes
    pub async fn send_blob_from_buffer(
        &self,
        device: &str,
        property: &str,
        element: &str,
        format: &str,
        data: impl Into<Arc<[u8]>>,
    ) -> IndiResult<()> {
        if let Some(known) = self.device(device).and_then(|d| d.property(property)) {
            known.with(|v| Self::check_write_permission(v.info(), v.kind()))??;
            if known.kind() != PropertyKind::Blob {
                return Err(IndiError::KindMismatch {
                    device: device.to_string(),
                    property: property.to_string(),
                    expected: PropertyKind::Blob,
                    actual: known.kind(),
                });
            }
        }
        let blob = OutgoingBlob {
            name: element.to_string(),
            format: format.to_string(),
            data: data.into(),
        };
        tracing::debug!(
            "Sending BLOB {}.{}.{} ({} bytes)",
            device,
            property,
            element,
            blob.size()
        );
        self.send_command(Command::NewBlob {
            device: device.to_string(),
            property: property.to_string(),
            blobs: vec![blob],
        })
        .await
    }

    // =========================================================================
    // HIGH-LEVEL DEVICE CONTROL METHODS
    // =========================================================================

    /// Connect a device (turn on its CONNECTION/CONNECT switch)
    pub async fn connect_device(&self, device: &str) -> IndiResult<()> {
        self.set_connection_switch(device, CONNECT).await
    }

    /// Disconnect a device (turn on its CONNECTION/DISCONNECT switch)
    pub async fn disconnect_device(&self, device: &str) -> IndiResult<()> {
        self.set_connection_switch(device, DISCONNECT).await
    }

    async fn set_connection_switch(&self, device: &str, element: &str) -> IndiResult<()> {
        let found = self
            .device(device)
            .ok_or_else(|| IndiError::DeviceNotFound(device.to_string()))?;
        let property = found
            .property(CONNECTION)
            .ok_or_else(|| IndiError::PropertyNotFound {
                device: device.to_string(),
                property: CONNECTION.to_string(),
            })?;
        let mut vector = property.as_switch().snapshot()?;
        for widget in vector.iter_mut() {
            let on = widget.is_name_match(element);
            widget.set_state(SwitchState::from(on));
        }
        self.send_new_switch(&vector).await
    }
}
