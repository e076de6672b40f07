//! Per-device property registry
//!
//! The registry owns every vector of one device, keyed by property name in
//! definition order. Handles given out are weak, so removing an entry
//! invalidates all handles to it.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{IndiError, IndiResult};
use crate::event::PropertyUpdate;
use crate::property::{Property, PropertyCell};
use crate::vector::PropertyVector;

#[derive(Debug, Default)]
pub struct PropertyRegistry {
    device: String,
    properties: IndexMap<String, PropertyCell>,
}

impl PropertyRegistry {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Absent -> Present. Defining a name twice is a protocol error and
    /// leaves the existing entry untouched.
    pub fn define(&mut self, vector: PropertyVector) -> IndiResult<Property> {
        if vector.device() != self.device {
            return Err(IndiError::sequence(
                vector.device(),
                vector.name(),
                format!("definition routed to device '{}'", self.device),
            ));
        }
        if self.properties.contains_key(vector.name()) {
            return Err(IndiError::sequence(
                &self.device,
                vector.name(),
                "property is already defined",
            ));
        }
        let name = vector.name().to_string();
        let cell: PropertyCell = Arc::new(RwLock::new(vector));
        let property = Property::new(&cell);
        self.properties.insert(name, cell);
        Ok(property)
    }

    /// Present -> Present. The update is validated on a copy and swapped in
    /// only if every change is accepted.
    pub fn update(&mut self, update: &PropertyUpdate) -> IndiResult<Property> {
        let cell = self.properties.get(&update.name).ok_or_else(|| {
            IndiError::sequence(&self.device, &update.name, "update for undefined property")
        })?;
        {
            let mut vector = cell.write();
            let next = vector.updated(update)?;
            *vector = next;
        }
        Ok(Property::new(cell))
    }

    pub fn get(&self, name: &str) -> Option<Property> {
        self.properties.get(name).map(Property::new)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Present -> Absent. Returns the final contents; handles are invalid
    /// once this returns.
    pub fn remove(&mut self, name: &str) -> IndiResult<PropertyVector> {
        let cell = self.properties.shift_remove(name).ok_or_else(|| {
            IndiError::sequence(&self.device, name, "delete for undefined property")
        })?;
        Ok(Self::into_vector(cell))
    }

    /// Remove every property in definition order
    pub fn drain(&mut self) -> Vec<PropertyVector> {
        self.properties
            .drain(..)
            .map(|(_, cell)| Self::into_vector(cell))
            .collect()
    }

    fn into_vector(cell: PropertyCell) -> PropertyVector {
        match Arc::try_unwrap(cell) {
            Ok(lock) => lock.into_inner(),
            // A reader is mid-access through an upgraded handle
            Err(shared) => shared.read().clone(),
        }
    }

    /// Property names in definition order
    pub fn names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    pub fn properties(&self) -> Vec<Property> {
        self.properties.values().map(Property::new).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PropertyDefinition, WidgetChange, WidgetDefinition};
    use crate::protocol::{PropertyKind, PropertyState};

    fn exposure() -> PropertyVector {
        PropertyVector::from_definition(
            PropertyDefinition::new("CCD Simulator", "CCD_EXPOSURE", PropertyKind::Number)
                .widget(WidgetDefinition::number("CCD_EXPOSURE_VALUE", 1.0, 0.0, 3600.0, 0.0)),
        )
        .unwrap()
    }

    fn text(name: &str) -> PropertyVector {
        PropertyVector::from_definition(
            PropertyDefinition::new("CCD Simulator", name, PropertyKind::Text)
                .widget(WidgetDefinition::text("VALUE", "")),
        )
        .unwrap()
    }

    #[test]
    fn test_define_update_remove_lifecycle() {
        let mut registry = PropertyRegistry::new("CCD Simulator");
        let property = registry.define(exposure()).unwrap();
        assert!(registry.contains("CCD_EXPOSURE"));

        let update = PropertyUpdate::new("CCD Simulator", "CCD_EXPOSURE")
            .state(PropertyState::Busy)
            .change(WidgetChange::number("CCD_EXPOSURE_VALUE", 30.0));
        registry.update(&update).unwrap();
        assert_eq!(property.state().unwrap(), PropertyState::Busy);
        assert_eq!(
            property.as_number().value_of("CCD_EXPOSURE_VALUE").unwrap(),
            Some(30.0)
        );

        let removed = registry.remove("CCD_EXPOSURE").unwrap();
        assert_eq!(removed.name(), "CCD_EXPOSURE");
        assert!(!property.is_valid());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sequence_errors_leave_registry_unchanged() {
        let mut registry = PropertyRegistry::new("CCD Simulator");
        let first = registry.define(exposure()).unwrap();

        let err = registry.define(exposure()).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(first.is_valid());
        assert_eq!(registry.len(), 1);

        let missing = PropertyUpdate::new("CCD Simulator", "CCD_TEMPERATURE");
        assert!(registry.update(&missing).unwrap_err().is_protocol_error());
        assert!(registry.remove("CCD_TEMPERATURE").unwrap_err().is_protocol_error());
    }

    #[test]
    fn test_rejected_update_is_atomic() {
        let mut registry = PropertyRegistry::new("Telescope");
        let coord = registry
            .define(
                PropertyVector::from_definition(
                    PropertyDefinition::new("Telescope", "COORD", PropertyKind::Number)
                        .widget(WidgetDefinition::number("RA", 1.0, 0.0, 24.0, 0.0))
                        .widget(WidgetDefinition::number("DEC", 2.0, -90.0, 90.0, 0.0)),
                )
                .unwrap(),
            )
            .unwrap();
        let before = coord.snapshot().unwrap();

        let update = PropertyUpdate::new("Telescope", "COORD")
            .state(PropertyState::Ok)
            .change(WidgetChange::number("RA", 12.0))
            .change(WidgetChange::number("DEC", 95.0));
        assert!(registry.update(&update).unwrap_err().is_invariant_violation());
        assert_eq!(coord.snapshot().unwrap(), before);
    }

    #[test]
    fn test_insertion_order_and_drain() {
        let mut registry = PropertyRegistry::new("CCD Simulator");
        let names = ["B_PROP", "A_PROP", "C_PROP"];
        let handles: Vec<Property> = names
            .iter()
            .map(|n| registry.define(text(n)).unwrap())
            .collect();
        assert_eq!(registry.names(), names);

        registry.remove("A_PROP").unwrap();
        assert_eq!(registry.names(), vec!["B_PROP", "C_PROP"]);

        let drained: Vec<String> = registry
            .drain()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(drained, vec!["B_PROP", "C_PROP"]);
        assert!(handles.iter().all(|h| !h.is_valid()));
    }

    #[test]
    fn test_definition_for_other_device_is_rejected() {
        let mut registry = PropertyRegistry::new("Telescope");
        assert!(registry.define(exposure()).unwrap_err().is_protocol_error());
    }
}
