//! Property handles and typed views
//!
//! A `Property` is a non-owning reference to a vector held by a device's
//! registry. It stays valid until the property is deleted or the session
//! ends; after that every access reports `InvalidProperty`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{IndiError, IndiResult};
use crate::protocol::{Permission, PropertyKind, PropertyState};
use crate::vector::{PropertyVector, SwitchVector, WidgetValue, WidgetVector};
use crate::widget::{BlobValue, LightValue, NumberValue, SwitchValue, SwitchWidget, TextValue, Widget};

/// Shared storage cell of one property vector
pub(crate) type PropertyCell = Arc<RwLock<PropertyVector>>;

/// Type-erased handle to a property
#[derive(Clone, Default)]
pub struct Property {
    kind: PropertyKind,
    device: String,
    name: String,
    cell: Weak<RwLock<PropertyVector>>,
}

impl Property {
    pub(crate) fn new(cell: &PropertyCell) -> Self {
        let vector = cell.read();
        Self {
            kind: vector.kind(),
            device: vector.device().to_string(),
            name: vector.name().to_string(),
            cell: Arc::downgrade(cell),
        }
    }

    /// Kind tag; `Unknown` for an empty handle
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn type_as_str(&self) -> &'static str {
        self.kind.as_str()
    }

    /// False for an empty handle and once the property is gone
    pub fn is_valid(&self) -> bool {
        self.cell.strong_count() > 0
    }

    pub fn device_name(&self) -> &str {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_name_match(&self, name: &str) -> bool {
        self.is_valid() && self.name == name
    }

    pub fn is_label_match(&self, label: &str) -> bool {
        self.with(|v| v.label() == label).unwrap_or(false)
    }

    fn invalid(&self) -> IndiError {
        IndiError::InvalidProperty {
            device: self.device.clone(),
            property: self.name.clone(),
        }
    }

    fn upgrade(&self) -> IndiResult<PropertyCell> {
        self.cell.upgrade().ok_or_else(|| self.invalid())
    }

    /// Run `f` against the current vector under its read lock
    pub fn with<R>(&self, f: impl FnOnce(&PropertyVector) -> R) -> IndiResult<R> {
        let cell = self.upgrade()?;
        let guard = cell.read();
        Ok(f(&guard))
    }

    /// Owned copy of the current vector
    pub fn snapshot(&self) -> IndiResult<PropertyVector> {
        self.with(PropertyVector::clone)
    }

    pub fn label(&self) -> IndiResult<String> {
        self.with(|v| v.label().to_string())
    }

    pub fn group(&self) -> IndiResult<String> {
        self.with(|v| v.group().to_string())
    }

    pub fn state(&self) -> IndiResult<PropertyState> {
        self.with(|v| v.state())
    }

    pub fn permission(&self) -> IndiResult<Permission> {
        self.with(|v| v.permission())
    }

    pub fn timeout(&self) -> IndiResult<f64> {
        self.with(|v| v.timeout())
    }

    pub fn timestamp(&self) -> IndiResult<String> {
        self.with(|v| v.timestamp().to_string())
    }

    /// Typed view; invalid when the kinds differ
    pub fn cast<V: WidgetValue>(&self) -> PropertyView<V> {
        PropertyView {
            property: self.clone(),
            _kind: PhantomData,
        }
    }

    pub fn as_text(&self) -> PropertyView<TextValue> {
        self.cast()
    }

    pub fn as_number(&self) -> PropertyView<NumberValue> {
        self.cast()
    }

    pub fn as_switch(&self) -> PropertyView<SwitchValue> {
        self.cast()
    }

    pub fn as_light(&self) -> PropertyView<LightValue> {
        self.cast()
    }

    pub fn as_blob(&self) -> PropertyView<BlobValue> {
        self.cast()
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.device == other.device
            && self.name == other.name
            && self.cell.ptr_eq(&other.cell)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Kind-checked view of a property
#[derive(Debug, Clone)]
pub struct PropertyView<V: WidgetValue> {
    property: Property,
    _kind: PhantomData<fn() -> V>,
}

impl<V: WidgetValue> PropertyView<V> {
    /// True when the handle is live and of kind `V`
    pub fn is_valid(&self) -> bool {
        self.property.kind == V::KIND && self.property.is_valid()
    }

    pub fn property(&self) -> &Property {
        &self.property
    }

    pub fn with<R>(&self, f: impl FnOnce(&WidgetVector<V>) -> R) -> IndiResult<R> {
        let mismatch = || IndiError::KindMismatch {
            device: self.property.device.clone(),
            property: self.property.name.clone(),
            expected: V::KIND,
            actual: self.property.kind,
        };
        let cell = self.property.upgrade()?;
        let guard = cell.read();
        let vector = V::project(&guard).ok_or_else(mismatch)?;
        Ok(f(vector))
    }

    pub fn snapshot(&self) -> IndiResult<WidgetVector<V>> {
        self.with(WidgetVector::clone)
    }

    pub fn count(&self) -> IndiResult<usize> {
        self.with(|v| v.count())
    }

    pub fn at(&self, index: usize) -> IndiResult<Widget<V>> {
        self.with(|v| v.at(index).cloned())?
    }

    pub fn find_by_name(&self, name: &str) -> IndiResult<Option<Widget<V>>> {
        self.with(|v| v.find_by_name(name).cloned())
    }

    pub fn state(&self) -> IndiResult<PropertyState> {
        self.with(|v| v.state())
    }
}

impl PropertyView<SwitchValue> {
    pub fn find_on(&self) -> IndiResult<Option<SwitchWidget>> {
        self.with(|v| v.find_on().cloned())
    }

    pub fn find_on_index(&self) -> IndiResult<Option<usize>> {
        self.with(SwitchVector::find_on_index)
    }
}

impl PropertyView<NumberValue> {
    /// Current value of the named number widget
    pub fn value_of(&self, name: &str) -> IndiResult<Option<f64>> {
        self.with(|v| v.find_by_name(name).map(|w| w.get_value()))
    }
}

impl PropertyView<TextValue> {
    pub fn text_of(&self, name: &str) -> IndiResult<Option<String>> {
        self.with(|v| v.find_by_name(name).map(|w| w.text().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PropertyDefinition, WidgetDefinition};
    use crate::protocol::{SwitchRule, SwitchState};

    fn cell(def: PropertyDefinition) -> PropertyCell {
        Arc::new(RwLock::new(PropertyVector::from_definition(def).unwrap()))
    }

    fn connection() -> PropertyCell {
        cell(
            PropertyDefinition::new("Telescope", "CONNECTION", PropertyKind::Switch)
                .label("Connection")
                .rule(SwitchRule::OneOfMany)
                .widget(WidgetDefinition::switch("CONNECT", SwitchState::Off))
                .widget(WidgetDefinition::switch("DISCONNECT", SwitchState::On)),
        )
    }

    #[test]
    fn test_default_handle_is_invalid() {
        let property = Property::default();
        assert!(!property.is_valid());
        assert_eq!(property.kind(), PropertyKind::Unknown);
        assert_eq!(
            property.label().unwrap_err().to_string(),
            "Invalid property handle"
        );
        assert!(!property.as_switch().is_valid());
        assert!(!property.is_name_match(""));
    }

    #[test]
    fn test_cast_validity_follows_kind() {
        let cell = connection();
        let property = Property::new(&cell);
        assert_eq!(property.type_as_str(), "INDI_SWITCH");

        let switch = property.as_switch();
        assert!(switch.is_valid());
        assert_eq!(switch.count().unwrap(), 2);
        assert_eq!(switch.find_on().unwrap().unwrap().name(), "DISCONNECT");
        assert_eq!(switch.find_on_index().unwrap(), Some(1));

        let number = property.as_number();
        assert!(!number.is_valid());
        assert!(matches!(
            number.count().unwrap_err(),
            IndiError::KindMismatch {
                expected: PropertyKind::Number,
                actual: PropertyKind::Switch,
                ..
            }
        ));
    }

    #[test]
    fn test_handle_invalid_after_cell_dropped() {
        let cell = connection();
        let property = Property::new(&cell);
        let view = property.as_switch();
        assert!(property.is_label_match("Connection"));
        assert!(!property.is_label_match("connection"));

        drop(cell);
        assert!(!property.is_valid());
        assert!(!view.is_valid());
        assert!(matches!(
            view.at(0).unwrap_err(),
            IndiError::InvalidProperty { .. }
        ));
        assert_eq!(property.name(), "CONNECTION");
    }

    #[test]
    fn test_view_index_errors() {
        let cell = cell(
            PropertyDefinition::new("Telescope", "COORD", PropertyKind::Number)
                .widget(WidgetDefinition::number("RA", 1.5, 0.0, 24.0, 0.0)),
        );
        let view = Property::new(&cell).as_number();
        assert_eq!(view.at(0).unwrap().get_value(), 1.5);
        assert_eq!(
            view.at(1).unwrap_err(),
            IndiError::IndexOutOfRange { index: 1, count: 1 }
        );
        assert_eq!(view.value_of("RA").unwrap(), Some(1.5));
        assert_eq!(view.value_of("DEC").unwrap(), None);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let cell = connection();
        let property = Property::new(&cell);
        let snapshot = property.as_switch().snapshot().unwrap();
        drop(cell);
        assert_eq!(snapshot.count(), 2);
        assert!(property.snapshot().is_err());
    }
}
