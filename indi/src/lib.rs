//! INDI client property model and event dispatch
//!
//! Maps the dynamically typed INDI property feed onto typed, safely castable
//! property vectors, and delivers device and property events to application
//! callbacks from a background listener task.
//!
//! ## Features
//!
//! - Text, Number, Switch, Light and BLOB vectors with kind-checked views
//! - Switch rule, number range and BLOB size validation on every update
//! - Weak property handles that become invalid on delete or disconnect
//! - Per-device locks for consistent multi-property reads
//! - Client-wide or per device/property BLOB modes
//! - Pluggable transport with an in-memory implementation

mod blob;
mod client;
mod config;
mod device;
mod dispatcher;
mod error;
mod event;
mod handler;
mod property;
mod protocol;
mod registry;
pub mod transport;
mod vector;
mod widget;

pub use blob::BlobBuffer;
pub use client::*;
pub use config::{BlobPolicy, ClientConfig};
pub use device::{Device, DeviceMessage, DeviceState, MessageLog};
pub use dispatcher::{ClientDispatcher, ConnectionState, WatchList};
pub use error::{IndiError, IndiResult};
pub use event::{
    BlobChange, Command, DisconnectReason, NumberChange, OutgoingBlob, PropertyDefinition,
    PropertyUpdate, ServerEvent, WidgetChange, WidgetDefinition, WidgetInit, WidgetUpdate,
};
pub use handler::{ClientHandler, NoopHandler};
pub use property::{Property, PropertyView};
pub use protocol::{
    standard_properties, BlobMode, ParseProtocolError, Permission, PropertyKind, PropertyState,
    SwitchRule, SwitchState, INDI_PROTOCOL_VERSION,
};
pub use registry::PropertyRegistry;
pub use transport::{CommandSink, Connector, EventSource, MemoryConnector, MemoryServer};
pub use vector::{
    BlobVector, LightVector, NumberVector, PropertyVector, SwitchVector, TextVector, VectorInfo,
    WidgetValue, WidgetVector,
};
pub use widget::{
    BlobValue, BlobWidget, LightValue, LightWidget, NumberValue, NumberWidget, SwitchValue,
    SwitchWidget, TextValue, TextWidget, Widget,
};

/// Default INDI server port
pub const INDI_DEFAULT_PORT: u16 = 7624;
