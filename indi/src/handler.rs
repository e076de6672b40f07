//! Application callbacks
//!
//! All hooks run synchronously on the listener task, in event order, after
//! the registry has been updated and its locks released. Every hook has a
//! no-op default, so applications override only what they need.

use crate::device::Device;
use crate::error::IndiError;
use crate::event::DisconnectReason;
use crate::property::Property;

pub trait ClientHandler: Send + Sync {
    /// A device was announced or received its first property
    fn new_device(&self, _device: &Device) {}

    /// A device was removed, after all of its properties
    fn remove_device(&self, _device: &Device) {}

    fn new_property(&self, _property: &Property) {}

    fn update_property(&self, _property: &Property) {}

    /// Called while the handle is still valid; it is invalidated afterwards
    fn remove_property(&self, _property: &Property) {}

    /// A message was appended to the device log under `message_id`
    fn new_message(&self, _device: &Device, _message_id: u64) {}

    /// A message without a device was appended to the server log
    fn new_server_message(&self, _message_id: u64, _text: &str) {}

    fn server_connected(&self) {}

    fn server_disconnected(&self, _reason: &DisconnectReason) {}

    /// An event was rejected; the session continues
    fn dispatch_error(&self, _error: &IndiError) {}
}

/// Handler that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}
