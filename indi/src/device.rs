//! Remote devices and their message logs

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::property::{Property, PropertyView};
use crate::protocol::standard_properties::{CONNECT, CONNECTION};
use crate::registry::PropertyRegistry;
use crate::vector::WidgetValue;
use crate::widget::{BlobValue, LightValue, NumberValue, SwitchValue, TextValue};

/// One entry of a device or server message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    /// Sequential per log, starting at 0
    pub id: u64,
    pub timestamp: Option<String>,
    pub text: String,
}

/// Ordered message log with an optional cap
///
/// When capped, the oldest entries are dropped first; ids keep counting so a
/// dropped id is never reused.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: VecDeque<DeviceMessage>,
    next_id: u64,
    capacity: Option<usize>,
}

impl MessageLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Append a message and return its id
    pub fn push(&mut self, timestamp: Option<String>, text: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(DeviceMessage {
            id,
            timestamp,
            text: text.into(),
        });
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
        id
    }

    pub fn get(&self, id: u64) -> Option<&DeviceMessage> {
        let first = self.entries.front()?.id;
        let offset = id.checked_sub(first)?;
        self.entries.get(usize::try_from(offset).ok()?)
    }

    pub fn last(&self) -> Option<&DeviceMessage> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// State guarded by the per-device lock
#[derive(Debug)]
pub struct DeviceState {
    properties: PropertyRegistry,
    messages: MessageLog,
}

impl DeviceState {
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.properties
    }

    pub(crate) fn messages_mut(&mut self) -> &mut MessageLog {
        &mut self.messages
    }
}

struct DeviceShared {
    name: String,
    state: RwLock<DeviceState>,
}

/// A remote device known to the session
///
/// Cheap to clone; clones share the same registry and lock.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    pub(crate) fn new(name: impl Into<String>, message_capacity: Option<usize>) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(DeviceShared {
                state: RwLock::new(DeviceState {
                    properties: PropertyRegistry::new(name.clone()),
                    messages: MessageLog::new(message_capacity),
                }),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Take the device lock for a consistent read across several properties.
    /// The listener cannot apply events for this device while it is held.
    /// The other `Device` getters may be called under it. Take it before,
    /// never inside, a `Property::with` closure.
    pub fn read(&self) -> RwLockReadGuard<'_, DeviceState> {
        self.shared.state.read()
    }

    // Getters may run while the caller holds `read()`; a plain read would
    // queue behind a pending writer and never return.
    fn state(&self) -> RwLockReadGuard<'_, DeviceState> {
        self.shared.state.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, DeviceState> {
        self.shared.state.write()
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.state().properties.get(name)
    }

    pub fn properties(&self) -> Vec<Property> {
        self.state().properties.properties()
    }

    pub fn property_names(&self) -> Vec<String> {
        self.state().properties.names()
    }

    fn typed<V: WidgetValue>(&self, name: &str) -> PropertyView<V> {
        self.property(name).unwrap_or_default().cast()
    }

    /// Typed view of `name`; invalid when absent or of another kind
    pub fn get_text(&self, name: &str) -> PropertyView<TextValue> {
        self.typed(name)
    }

    pub fn get_number(&self, name: &str) -> PropertyView<NumberValue> {
        self.typed(name)
    }

    pub fn get_switch(&self, name: &str) -> PropertyView<SwitchValue> {
        self.typed(name)
    }

    pub fn get_light(&self, name: &str) -> PropertyView<LightValue> {
        self.typed(name)
    }

    pub fn get_blob(&self, name: &str) -> PropertyView<BlobValue> {
        self.typed(name)
    }

    /// True when the CONNECTION switch has CONNECT On
    pub fn is_connected(&self) -> bool {
        self.get_switch(CONNECTION)
            .with(|v| v.find_by_name(CONNECT).map(|w| w.is_on()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn messages(&self) -> Vec<DeviceMessage> {
        self.state().messages.iter().cloned().collect()
    }

    pub fn message(&self, id: u64) -> Option<DeviceMessage> {
        self.state().messages.get(id).cloned()
    }

    pub fn last_message(&self) -> Option<DeviceMessage> {
        self.state().messages.last().cloned()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Device")
            .field("name", &self.shared.name)
            .field("properties", &state.properties.names())
            .field("messages", &state.messages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PropertyDefinition, PropertyUpdate, WidgetChange, WidgetDefinition};
    use crate::protocol::{PropertyKind, SwitchState};
    use crate::protocol::standard_properties::DISCONNECT;
    use crate::vector::PropertyVector;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn define_connection(device: &Device) {
        let vector = PropertyVector::from_definition(
            PropertyDefinition::new(device.name(), CONNECTION, PropertyKind::Switch)
                .widget(WidgetDefinition::switch(CONNECT, SwitchState::Off))
                .widget(WidgetDefinition::switch(DISCONNECT, SwitchState::On)),
        )
        .unwrap();
        device.write().properties_mut().define(vector).unwrap();
    }

    #[test]
    fn test_message_log_ids_and_cap() {
        let mut log = MessageLog::new(Some(2));
        assert_eq!(log.push(None, "first"), 0);
        assert_eq!(log.push(Some("2024-01-01T00:00:00".into()), "second"), 1);
        assert_eq!(log.push(None, "third"), 2);

        assert_eq!(log.len(), 2);
        assert!(log.get(0).is_none());
        assert_eq!(log.get(1).unwrap().text, "second");
        assert_eq!(log.last().unwrap().id, 2);
        assert!(log.get(3).is_none());
    }

    #[test]
    fn test_unbounded_log_keeps_everything() {
        let mut log = MessageLog::default();
        for i in 0..100 {
            log.push(None, format!("msg {}", i));
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.get(42).unwrap().text, "msg 42");
    }

    #[test]
    fn test_is_connected_follows_connection_switch() {
        let device = Device::new("Telescope Simulator", None);
        assert!(!device.is_connected());

        define_connection(&device);
        assert!(!device.is_connected());

        let update = PropertyUpdate::new("Telescope Simulator", CONNECTION)
            .change(WidgetChange::switch(CONNECT, SwitchState::On))
            .change(WidgetChange::switch(DISCONNECT, SwitchState::Off));
        device.write().properties_mut().update(&update).unwrap();
        assert!(device.is_connected());
    }

    #[test]
    fn test_typed_getters() {
        let device = Device::new("Telescope Simulator", None);
        define_connection(&device);

        assert!(device.get_switch(CONNECTION).is_valid());
        assert!(!device.get_number(CONNECTION).is_valid());
        assert!(!device.get_switch("NO_SUCH_PROPERTY").is_valid());
        assert_eq!(device.property_names(), vec![CONNECTION]);

        let clone = device.clone();
        assert_eq!(clone, device);
        assert_eq!(clone.read().properties().len(), 1);
    }

    #[test]
    fn test_getters_under_read_lock_with_queued_writer() {
        let device = Device::new("Telescope Simulator", None);
        define_connection(&device);
        let coord = PropertyVector::from_definition(
            PropertyDefinition::new(device.name(), "COORD", PropertyKind::Number)
                .widget(WidgetDefinition::number("RA", 1.5, 0.0, 24.0, 0.0)),
        )
        .unwrap();
        device.write().properties_mut().define(coord).unwrap();

        let (held_tx, held_rx) = mpsc::channel();
        let (queued_tx, queued_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let app = device.clone();
        let reader = thread::spawn(move || {
            let guard = app.read();
            held_tx.send(()).unwrap();
            queued_rx.recv().unwrap();
            thread::sleep(Duration::from_millis(50));

            let ra = app.get_number("COORD").value_of("RA").unwrap();
            let connected = app.is_connected();
            let names = app.property_names();
            let count = guard.properties().len();
            done_tx.send((ra, connected, names, count)).unwrap();
        });

        let listener = device.clone();
        let writer = thread::spawn(move || {
            held_rx.recv().unwrap();
            queued_tx.send(()).unwrap();
            listener.write().messages_mut().push(None, "applied");
        });

        let (ra, connected, names, count) = done_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(ra, Some(1.5));
        assert!(!connected);
        assert_eq!(names, vec![CONNECTION, "COORD"]);
        assert_eq!(count, 2);

        reader.join().unwrap();
        writer.join().unwrap();
        assert_eq!(device.last_message().unwrap().text, "applied");
    }
}
