//! Event dispatch
//!
//! `ClientDispatcher` applies transport events to the session's device
//! registries and invokes the handler hooks. It is the only writer of the
//! registries. Each event is applied under the owning device's lock; hooks
//! run after the lock is released.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{BlobPolicy, ClientConfig};
use crate::device::{Device, DeviceMessage, MessageLog};
use crate::error::{IndiError, IndiResult};
use crate::event::{Command, DisconnectReason, PropertyDefinition, PropertyUpdate, ServerEvent};
use crate::handler::ClientHandler;
use crate::protocol::BlobMode;
use crate::vector::PropertyVector;

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Devices and properties the application asked to receive
///
/// An empty list receives everything. A device entry without properties
/// receives every property of that device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchList {
    entries: IndexMap<String, Vec<String>>,
}

impl WatchList {
    pub fn watch_device(&mut self, device: &str) {
        self.entries.entry(device.to_string()).or_default();
    }

    pub fn watch_property(&mut self, device: &str, property: &str) {
        let properties = self.entries.entry(device.to_string()).or_default();
        if !properties.iter().any(|p| p == property) {
            properties.push(property.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn allows_device(&self, device: &str) -> bool {
        self.entries.is_empty() || self.entries.contains_key(device)
    }

    pub fn allows_property(&self, device: &str, property: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        match self.entries.get(device) {
            Some(properties) => properties.is_empty() || properties.iter().any(|p| p == property),
            None => false,
        }
    }

    /// Watched devices with their property filters, in watch order
    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        self.entries
            .iter()
            .map(|(device, properties)| (device.clone(), properties.clone()))
            .collect()
    }
}

/// State shared between the listener and the application
#[derive(Debug)]
pub(crate) struct SessionState {
    connection: RwLock<ConnectionState>,
    devices: RwLock<IndexMap<String, Device>>,
    server_messages: Mutex<MessageLog>,
    watch: RwLock<WatchList>,
    blob_policy: RwLock<BlobPolicy>,
    message_capacity: Option<usize>,
}

impl SessionState {
    pub(crate) fn new(config: &ClientConfig) -> Self {
        Self {
            connection: RwLock::new(ConnectionState::Disconnected),
            devices: RwLock::new(IndexMap::new()),
            server_messages: Mutex::new(MessageLog::new(config.message_log_capacity)),
            watch: RwLock::new(WatchList::default()),
            blob_policy: RwLock::new(BlobPolicy::new(config.blob_mode)),
            message_capacity: config.message_log_capacity,
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *self.connection.read()
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.connection.write(), state)
    }

    pub(crate) fn devices(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    pub(crate) fn device(&self, name: &str) -> Option<Device> {
        self.devices.read().get(name).cloned()
    }

    pub(crate) fn server_messages(&self) -> Vec<DeviceMessage> {
        self.server_messages.lock().iter().cloned().collect()
    }

    pub(crate) fn watch(&self) -> WatchList {
        self.watch.read().clone()
    }

    pub(crate) fn watch_device(&self, device: &str) {
        self.watch.write().watch_device(device);
    }

    pub(crate) fn watch_property(&self, device: &str, property: &str) {
        self.watch.write().watch_property(device, property);
    }

    pub(crate) fn blob_policy(&self) -> BlobPolicy {
        self.blob_policy.read().clone()
    }

    pub(crate) fn set_blob_mode(&self, device: &str, property: Option<&str>, mode: BlobMode) {
        self.blob_policy.write().set(device, property, mode);
    }

    /// `enableBLOB` requests for a newly seen device
    pub(crate) fn blob_commands_for(&self, device: &str) -> Vec<Command> {
        let policy = self.blob_policy.read();
        let mut commands = Vec::new();
        let device_mode = policy.mode_for(device, None);
        if device_mode != BlobMode::Never {
            commands.push(Command::EnableBlob {
                device: device.to_string(),
                property: None,
                mode: device_mode,
            });
        }
        for (property, mode) in policy.rules_for(device) {
            if property.is_some() {
                commands.push(Command::EnableBlob {
                    device: device.to_string(),
                    property,
                    mode,
                });
            }
        }
        commands
    }

    /// Drop every device and invalidate all handles of the session
    fn clear(&self) -> Vec<Device> {
        let devices: Vec<Device> = self.devices.write().drain(..).map(|(_, d)| d).collect();
        for device in &devices {
            device.write().properties_mut().drain();
        }
        self.server_messages.lock().clear();
        devices
    }
}

/// Applies server events to the session and notifies the handler
pub struct ClientDispatcher {
    session: Arc<SessionState>,
    handler: Arc<dyn ClientHandler>,
    outbox: Option<mpsc::Sender<Command>>,
}

impl ClientDispatcher {
    /// Standalone dispatcher with a fresh session and no outbound channel
    pub fn new(handler: Arc<dyn ClientHandler>, config: &ClientConfig) -> Self {
        Self::with_session(Arc::new(SessionState::new(config)), handler, None)
    }

    pub(crate) fn with_session(
        session: Arc<SessionState>,
        handler: Arc<dyn ClientHandler>,
        outbox: Option<mpsc::Sender<Command>>,
    ) -> Self {
        Self {
            session,
            handler,
            outbox,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.session.devices()
    }

    pub fn device(&self, name: &str) -> Option<Device> {
        self.session.device(name)
    }

    pub fn server_messages(&self) -> Vec<DeviceMessage> {
        self.session.server_messages()
    }

    pub fn watch_device(&self, device: &str) {
        self.session.watch_device(device);
    }

    pub fn watch_property(&self, device: &str, property: &str) {
        self.session.watch_property(device, property);
    }

    pub fn set_blob_mode(&self, device: &str, property: Option<&str>, mode: BlobMode) {
        self.session.set_blob_mode(device, property, mode);
    }

    pub(crate) fn handler(&self) -> &Arc<dyn ClientHandler> {
        &self.handler
    }

    /// Apply one event. Errors describe a rejected event; the session state
    /// is unchanged by it and later events are still accepted.
    pub fn dispatch(&self, event: ServerEvent) -> IndiResult<()> {
        match event {
            ServerEvent::Connected => self.on_connected(),
            ServerEvent::Disconnected(reason) => {
                self.on_disconnected(&reason);
                Ok(())
            }
            event => {
                if self.connection_state() != ConnectionState::Connected {
                    return Err(IndiError::NotConnected);
                }
                match event {
                    ServerEvent::DeviceDefined(device) => {
                        self.on_device_defined(&device);
                        Ok(())
                    }
                    ServerEvent::DeviceRemoved(device) => self.on_device_removed(&device),
                    ServerEvent::PropertyDefined(def) => self.on_property_defined(def),
                    ServerEvent::PropertyUpdated(update) => self.on_property_updated(update),
                    ServerEvent::PropertyDeleted { device, name } => {
                        if name.is_empty() {
                            self.on_device_removed(&device)
                        } else {
                            self.on_property_deleted(&device, &name)
                        }
                    }
                    ServerEvent::Message {
                        device,
                        timestamp,
                        text,
                    } => self.on_message(&device, timestamp, text),
                    ServerEvent::Connected | ServerEvent::Disconnected(_) => Ok(()),
                }
            }
        }
    }

    fn on_connected(&self) -> IndiResult<()> {
        let previous = self.session.set_connection_state(ConnectionState::Connected);
        if previous == ConnectionState::Connected {
            return Err(IndiError::sequence("", "", "already connected"));
        }
        tracing::info!("INDI session connected");
        self.handler.server_connected();
        Ok(())
    }

    fn on_disconnected(&self, reason: &DisconnectReason) {
        let previous = self.session.set_connection_state(ConnectionState::Disconnected);
        let devices = self.session.clear();
        if previous != ConnectionState::Connected {
            return;
        }
        match reason {
            DisconnectReason::IoFailure(err) => {
                tracing::warn!("INDI session lost ({} devices): {}", devices.len(), err)
            }
            _ => tracing::info!("INDI session closed (code {})", reason.code()),
        }
        self.handler.server_disconnected(reason);
    }

    fn send(&self, command: Command) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        if let Err(e) = outbox.try_send(command) {
            let reason = e.to_string();
            let command = e.into_inner();
            let error = IndiError::ChannelClosed(format!(
                "Dropped INDI command for {}: {}",
                command.device().unwrap_or("server"),
                reason
            ));
            tracing::warn!("{}", error);
            self.handler.dispatch_error(&error);
        }
    }

    /// Look up or create `name`; the flag is true when it was created
    fn ensure_device(&self, name: &str) -> (Device, bool) {
        let mut devices = self.session.devices.write();
        if let Some(device) = devices.get(name) {
            return (device.clone(), false);
        }
        let device = Device::new(name, self.session.message_capacity);
        devices.insert(name.to_string(), device.clone());
        (device, true)
    }

    fn announce_device(&self, device: &Device) {
        tracing::debug!("INDI device defined: {}", device.name());
        self.handler.new_device(device);
        for command in self.session.blob_commands_for(device.name()) {
            self.send(command);
        }
    }

    fn on_device_defined(&self, name: &str) {
        if !self.session.watch.read().allows_device(name) {
            return;
        }
        let (device, created) = self.ensure_device(name);
        if created {
            self.announce_device(&device);
        }
    }

    fn on_device_removed(&self, name: &str) -> IndiResult<()> {
        let Some(device) = self.session.device(name) else {
            if self.session.watch.read().allows_device(name) {
                return Err(IndiError::DeviceNotFound(name.to_string()));
            }
            return Ok(());
        };

        for property in device.properties() {
            self.handler.remove_property(&property);
        }
        self.session.devices.write().shift_remove(name);
        device.write().properties_mut().drain();
        tracing::debug!("INDI device removed: {}", name);
        self.handler.remove_device(&device);
        Ok(())
    }

    fn on_property_defined(&self, def: PropertyDefinition) -> IndiResult<()> {
        if !self.session.watch.read().allows_property(&def.device, &def.name) {
            return Ok(());
        }
        let vector = PropertyVector::from_definition(def)?;
        let (device, created) = self.ensure_device(vector.device());
        if created {
            self.announce_device(&device);
        }
        let property = device.write().properties_mut().define(vector)?;
        self.handler.new_property(&property);
        Ok(())
    }

    fn on_property_updated(&self, update: PropertyUpdate) -> IndiResult<()> {
        if !self
            .session
            .watch
            .read()
            .allows_property(&update.device, &update.name)
        {
            return Ok(());
        }
        let device = self
            .session
            .device(&update.device)
            .ok_or_else(|| IndiError::DeviceNotFound(update.device.clone()))?;

        let (property, message_id) = {
            let mut state = device.write();
            let property = state.properties_mut().update(&update)?;
            let message_id = update
                .message
                .map(|text| state.messages_mut().push(update.timestamp.clone(), text));
            (property, message_id)
        };

        self.handler.update_property(&property);
        if let Some(id) = message_id {
            self.handler.new_message(&device, id);
        }
        Ok(())
    }

    fn on_property_deleted(&self, device_name: &str, name: &str) -> IndiResult<()> {
        if !self.session.watch.read().allows_property(device_name, name) {
            return Ok(());
        }
        let device = self
            .session
            .device(device_name)
            .ok_or_else(|| IndiError::DeviceNotFound(device_name.to_string()))?;
        let property = device.property(name).ok_or_else(|| {
            IndiError::sequence(device_name, name, "delete for undefined property")
        })?;

        self.handler.remove_property(&property);
        device.write().properties_mut().remove(name)?;
        Ok(())
    }

    fn on_message(&self, device_name: &str, timestamp: Option<String>, text: String) -> IndiResult<()> {
        if device_name.is_empty() {
            let id = self.session.server_messages.lock().push(timestamp, text.clone());
            self.handler.new_server_message(id, &text);
            return Ok(());
        }
        if !self.session.watch.read().allows_device(device_name) {
            return Ok(());
        }
        let device = self
            .session
            .device(device_name)
            .ok_or_else(|| IndiError::DeviceNotFound(device_name.to_string()))?;
        let id = device.write().messages_mut().push(timestamp, text);
        self.handler.new_message(&device, id);
        Ok(())
    }
}
