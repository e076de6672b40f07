//! Transport-facing event and command types
//!
//! `ServerEvent` is the abstract feed delivered by a transport after it has
//! decoded the wire format; `Command` is what the client hands back to the
//! transport for transmission.

use std::sync::Arc;

use crate::protocol::{BlobMode, Permission, PropertyKind, PropertyState, SwitchRule, SwitchState};
use crate::vector::{NumberVector, PropertyVector, SwitchVector, TextVector};
use crate::widget::NumberValue;

/// Initial payload of a widget in a definition
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetInit {
    Text(String),
    Number(NumberValue),
    Switch(SwitchState),
    Light(PropertyState),
    Blob { format: String, size: usize },
}

impl WidgetInit {
    pub fn kind(&self) -> PropertyKind {
        match self {
            WidgetInit::Text(_) => PropertyKind::Text,
            WidgetInit::Number(_) => PropertyKind::Number,
            WidgetInit::Switch(_) => PropertyKind::Switch,
            WidgetInit::Light(_) => PropertyKind::Light,
            WidgetInit::Blob { .. } => PropertyKind::Blob,
        }
    }
}

/// One widget of a `propertyDefined` event
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDefinition {
    pub name: String,
    pub label: String,
    pub init: WidgetInit,
}

impl WidgetDefinition {
    pub fn new(name: impl Into<String>, init: WidgetInit) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            init,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, WidgetInit::Text(text.into()))
    }

    pub fn number(name: impl Into<String>, value: f64, min: f64, max: f64, step: f64) -> Self {
        Self::new(name, WidgetInit::Number(NumberValue::new(value, min, max, step)))
    }

    pub fn switch(name: impl Into<String>, state: SwitchState) -> Self {
        Self::new(name, WidgetInit::Switch(state))
    }

    pub fn light(name: impl Into<String>, state: PropertyState) -> Self {
        Self::new(name, WidgetInit::Light(state))
    }

    pub fn blob(name: impl Into<String>, format: impl Into<String>, size: usize) -> Self {
        Self::new(
            name,
            WidgetInit::Blob {
                format: format.into(),
                size,
            },
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A `propertyDefined` event
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub device: String,
    pub name: String,
    pub kind: PropertyKind,
    pub label: String,
    pub group: String,
    pub state: PropertyState,
    pub permission: Permission,
    pub timeout: f64,
    pub timestamp: String,
    pub rule: Option<SwitchRule>,
    pub widgets: Vec<WidgetDefinition>,
}

impl PropertyDefinition {
    pub fn new(device: impl Into<String>, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            kind,
            label: String::new(),
            group: String::new(),
            state: PropertyState::Idle,
            permission: Permission::ReadWrite,
            timeout: 0.0,
            timestamp: String::new(),
            rule: None,
            widgets: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn state(mut self, state: PropertyState) -> Self {
        self.state = state;
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn rule(mut self, rule: SwitchRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn widget(mut self, widget: WidgetDefinition) -> Self {
        self.widgets.push(widget);
        self
    }

    pub fn widgets(mut self, widgets: impl IntoIterator<Item = WidgetDefinition>) -> Self {
        self.widgets.extend(widgets);
        self
    }
}

/// Incoming BLOB payload for one widget
#[derive(Debug, Clone, PartialEq)]
pub struct BlobChange {
    pub format: Option<String>,
    /// Declared size; the widget's current declared size when absent
    pub size: Option<usize>,
    pub data: Vec<u8>,
}

/// Incoming number change; absent fields are left as they are
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumberChange {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

/// New value for one widget in a `propertyUpdated` event
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetUpdate {
    Text(String),
    Number(NumberChange),
    Switch(SwitchState),
    Light(PropertyState),
    Blob(BlobChange),
}

impl WidgetUpdate {
    pub fn kind(&self) -> PropertyKind {
        match self {
            WidgetUpdate::Text(_) => PropertyKind::Text,
            WidgetUpdate::Number(_) => PropertyKind::Number,
            WidgetUpdate::Switch(_) => PropertyKind::Switch,
            WidgetUpdate::Light(_) => PropertyKind::Light,
            WidgetUpdate::Blob(_) => PropertyKind::Blob,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetChange {
    pub name: String,
    pub update: WidgetUpdate,
}

impl WidgetChange {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update: WidgetUpdate::Text(text.into()),
        }
    }

    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            update: WidgetUpdate::Number(NumberChange {
                value: Some(value),
                ..NumberChange::default()
            }),
        }
    }

    pub fn switch(name: impl Into<String>, state: SwitchState) -> Self {
        Self {
            name: name.into(),
            update: WidgetUpdate::Switch(state),
        }
    }

    pub fn light(name: impl Into<String>, state: PropertyState) -> Self {
        Self {
            name: name.into(),
            update: WidgetUpdate::Light(state),
        }
    }

    pub fn blob(name: impl Into<String>, size: Option<usize>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            update: WidgetUpdate::Blob(BlobChange {
                format: None,
                size,
                data: data.into(),
            }),
        }
    }
}

/// A `propertyUpdated` event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyUpdate {
    pub device: String,
    pub name: String,
    pub state: Option<PropertyState>,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    /// Informational text attached to the update
    pub message: Option<String>,
    pub changes: Vec<WidgetChange>,
}

impl PropertyUpdate {
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn state(mut self, state: PropertyState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn change(mut self, change: WidgetChange) -> Self {
        self.changes.push(change);
        self
    }
}

/// Why a session left the Connected state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client asked to disconnect
    Requested,
    /// The server closed the connection
    ServerClosed,
    /// Transport read or write failure
    IoFailure(String),
}

impl DisconnectReason {
    /// Numeric code: 0 for a requested shutdown, 1 when the server closed
    /// the stream, -1 for an I/O failure
    pub fn code(&self) -> i32 {
        match self {
            DisconnectReason::Requested => 0,
            DisconnectReason::ServerClosed => 1,
            DisconnectReason::IoFailure(_) => -1,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, DisconnectReason::Requested)
    }
}

/// One decoded event from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected,
    Disconnected(DisconnectReason),
    DeviceDefined(String),
    DeviceRemoved(String),
    PropertyDefined(PropertyDefinition),
    PropertyUpdated(PropertyUpdate),
    PropertyDeleted { device: String, name: String },
    Message {
        device: String,
        timestamp: Option<String>,
        text: String,
    },
}

impl ServerEvent {
    /// Device the event belongs to, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            ServerEvent::DeviceDefined(device) | ServerEvent::DeviceRemoved(device) => Some(device),
            ServerEvent::PropertyDefined(def) => Some(&def.device),
            ServerEvent::PropertyUpdated(update) => Some(&update.device),
            ServerEvent::PropertyDeleted { device, .. } | ServerEvent::Message { device, .. } => {
                Some(device)
            }
            ServerEvent::Connected | ServerEvent::Disconnected(_) => None,
        }
    }
}

/// One BLOB in an outgoing `NewBlob` command; the length is explicit
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingBlob {
    pub name: String,
    pub format: String,
    pub data: Arc<[u8]>,
}

impl OutgoingBlob {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Outbound request for the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetProperties {
        version: String,
        device: Option<String>,
        property: Option<String>,
    },
    EnableBlob {
        device: String,
        property: Option<String>,
        mode: BlobMode,
    },
    NewText(TextVector),
    NewNumber(NumberVector),
    NewSwitch(SwitchVector),
    NewBlob {
        device: String,
        property: String,
        blobs: Vec<OutgoingBlob>,
    },
}

impl Command {
    /// Build the command carrying a full property vector; lights are
    /// never sent by clients
    pub fn from_vector(vector: &PropertyVector) -> Option<Command> {
        let command = match vector {
            PropertyVector::Text(v) => Command::NewText(v.clone()),
            PropertyVector::Number(v) => Command::NewNumber(v.clone()),
            PropertyVector::Switch(v) => Command::NewSwitch(v.clone()),
            PropertyVector::Light(_) => return None,
            PropertyVector::Blob(v) => Command::NewBlob {
                device: v.device().to_string(),
                property: v.name().to_string(),
                blobs: v
                    .iter()
                    .map(|w| OutgoingBlob {
                        name: w.name().to_string(),
                        format: w.format().to_string(),
                        data: Arc::from(w.bytes()),
                    })
                    .collect(),
            },
        };
        Some(command)
    }

    /// Device the command addresses, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            Command::GetProperties { device, .. } => device.as_deref(),
            Command::EnableBlob { device, .. } | Command::NewBlob { device, .. } => Some(device),
            Command::NewText(v) => Some(v.device()),
            Command::NewNumber(v) => Some(v.device()),
            Command::NewSwitch(v) => Some(v.device()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_codes_distinguish_shutdown_from_failure() {
        assert_eq!(DisconnectReason::Requested.code(), 0);
        assert!(DisconnectReason::Requested.is_clean());
        assert_eq!(DisconnectReason::ServerClosed.code(), 1);
        let io = DisconnectReason::IoFailure("broken pipe".to_string());
        assert_eq!(io.code(), -1);
        assert!(!io.is_clean());
    }

    #[test]
    fn test_definition_builder() {
        let def = PropertyDefinition::new("Telescope", "CONNECTION", PropertyKind::Switch)
            .label("Connection")
            .group("Main Control")
            .rule(SwitchRule::OneOfMany)
            .widget(WidgetDefinition::switch("CONNECT", SwitchState::Off).with_label("Connect"))
            .widget(WidgetDefinition::switch("DISCONNECT", SwitchState::On));

        assert_eq!(def.widgets.len(), 2);
        assert_eq!(def.widgets[0].label, "Connect");
        assert_eq!(def.widgets[1].init.kind(), PropertyKind::Switch);
        assert_eq!(def.permission, Permission::ReadWrite);
    }

    #[test]
    fn test_event_device() {
        let event = ServerEvent::PropertyDeleted {
            device: "CCD Simulator".to_string(),
            name: "CCD1".to_string(),
        };
        assert_eq!(event.device(), Some("CCD Simulator"));
        assert_eq!(ServerEvent::Connected.device(), None);
        assert_eq!(
            WidgetChange::number("RA", 1.0).update.kind(),
            PropertyKind::Number
        );
    }
}
