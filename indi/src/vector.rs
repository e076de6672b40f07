//! Widget vectors: the typed body of a property
//!
//! A `WidgetVector<V>` is an ordered, name-unique sequence of widgets that all
//! share the payload type `V`, plus the vector attributes sent by the server.
//! `PropertyVector` is the closed variant over the five kinds.

use std::fmt;

use crate::blob::BlobBuffer;
use crate::error::{IndiError, IndiResult};
use crate::event::{PropertyDefinition, PropertyUpdate, WidgetInit, WidgetUpdate};
use crate::protocol::{Permission, PropertyKind, PropertyState, SwitchRule, SwitchState};
use crate::widget::{BlobValue, LightValue, NumberValue, SwitchValue, TextValue, Widget};

/// Payload type of one widget kind
pub trait WidgetValue: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Vector attribute only this kind carries (the switch rule)
    type Extra: Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static;

    const KIND: PropertyKind;

    fn from_init(init: WidgetInit) -> Option<Self>;

    fn extra_from(_def: &PropertyDefinition) -> Self::Extra {
        Self::Extra::default()
    }

    /// Apply an update of the same kind to this widget's payload
    fn merge(&mut self, info: &VectorInfo, widget: &str, update: WidgetUpdate) -> IndiResult<()>;

    /// Check vector-wide rules after a definition or an update
    fn check(_vector: &WidgetVector<Self>) -> IndiResult<()> {
        Ok(())
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>>;

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector;
}

/// Attributes shared by every vector kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorInfo {
    pub(crate) device: String,
    pub(crate) name: String,
    pub(crate) label: String,
    pub(crate) group: String,
    pub(crate) state: PropertyState,
    pub(crate) permission: Permission,
    pub(crate) timeout: f64,
    pub(crate) timestamp: String,
}

impl VectorInfo {
    fn kind_mismatch(&self, expected: PropertyKind, actual: PropertyKind) -> IndiError {
        IndiError::KindMismatch {
            device: self.device.clone(),
            property: self.name.clone(),
            expected,
            actual,
        }
    }
}

/// Ordered, kind-homogeneous collection of widgets
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetVector<V: WidgetValue> {
    info: VectorInfo,
    extra: V::Extra,
    widgets: Vec<Widget<V>>,
}

pub type TextVector = WidgetVector<TextValue>;
pub type NumberVector = WidgetVector<NumberValue>;
pub type SwitchVector = WidgetVector<SwitchValue>;
pub type LightVector = WidgetVector<LightValue>;
pub type BlobVector = WidgetVector<BlobValue>;

impl<V: WidgetValue> WidgetVector<V> {
    /// Build a vector from a definition, validating names, kinds and rules
    pub fn from_definition(def: PropertyDefinition) -> IndiResult<Self> {
        let mut info = VectorInfo {
            device: def.device.clone(),
            name: def.name.clone(),
            label: def.label.clone(),
            group: def.group.clone(),
            state: def.state,
            permission: def.permission,
            timeout: def.timeout,
            timestamp: def.timestamp.clone(),
        };
        if def.kind != V::KIND {
            return Err(info.kind_mismatch(V::KIND, def.kind));
        }
        if V::KIND == PropertyKind::Light {
            info.permission = Permission::ReadOnly;
            info.timeout = 0.0;
        } else if info.timeout.is_nan() || info.timeout < 0.0 {
            return Err(IndiError::invariant(
                &info.device,
                &info.name,
                format!("timeout {} must be non-negative", info.timeout),
            ));
        }

        let extra = V::extra_from(&def);
        let mut widgets: Vec<Widget<V>> = Vec::with_capacity(def.widgets.len());
        for widget in def.widgets {
            if widgets.iter().any(|w| w.is_name_match(&widget.name)) {
                return Err(IndiError::DuplicateWidget {
                    device: info.device.clone(),
                    property: info.name.clone(),
                    element: widget.name,
                });
            }
            let init_kind = widget.init.kind();
            let value = V::from_init(widget.init).ok_or_else(|| {
                IndiError::invariant(
                    &info.device,
                    &info.name,
                    format!(
                        "widget '{}' is {} in a {} vector",
                        widget.name, init_kind, V::KIND
                    ),
                )
            })?;
            widgets.push(Widget::new(widget.name, widget.label, value));
        }

        let vector = Self {
            info,
            extra,
            widgets,
        };
        V::check(&vector)?;
        Ok(vector)
    }

    /// Copy of this vector with `update` applied, or the first error found
    pub(crate) fn updated(&self, update: &PropertyUpdate) -> IndiResult<Self> {
        let mut next = self.clone();
        for change in &update.changes {
            let actual = change.update.kind();
            if actual != V::KIND {
                return Err(IndiError::invariant(
                    &self.info.device,
                    &self.info.name,
                    format!(
                        "{} value for widget '{}' in a {} vector",
                        actual, change.name, V::KIND
                    ),
                ));
            }
            let info = &next.info;
            let widget = next
                .widgets
                .iter_mut()
                .find(|w| w.is_name_match(&change.name))
                .ok_or_else(|| {
                    IndiError::sequence(
                        &info.device,
                        &info.name,
                        format!("update for undefined widget '{}'", change.name),
                    )
                })?;
            widget
                .value_mut()
                .merge(info, &change.name, change.update.clone())?;
        }

        if let Some(state) = update.state {
            next.info.state = state;
        }
        if let Some(timestamp) = &update.timestamp {
            next.info.timestamp = timestamp.clone();
        }
        if let Some(timeout) = update.timeout {
            if V::KIND != PropertyKind::Light {
                if timeout.is_nan() || timeout < 0.0 {
                    return Err(IndiError::invariant(
                        &self.info.device,
                        &self.info.name,
                        format!("timeout {} must be non-negative", timeout),
                    ));
                }
                next.info.timeout = timeout;
            }
        }

        V::check(&next)?;
        Ok(next)
    }

    pub fn kind(&self) -> PropertyKind {
        V::KIND
    }

    pub fn info(&self) -> &VectorInfo {
        &self.info
    }

    pub fn device(&self) -> &str {
        &self.info.device
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn label(&self) -> &str {
        &self.info.label
    }

    pub fn group(&self) -> &str {
        &self.info.group
    }

    pub fn state(&self) -> PropertyState {
        self.info.state
    }

    /// Set the state on a local copy, e.g. before sending it
    pub fn set_state(&mut self, state: PropertyState) {
        self.info.state = state;
    }

    pub fn permission(&self) -> Permission {
        self.info.permission
    }

    /// Resend/staleness hint in seconds; not enforced here
    pub fn timeout(&self) -> f64 {
        self.info.timeout
    }

    pub fn timestamp(&self) -> &str {
        &self.info.timestamp
    }

    pub fn is_name_match(&self, name: &str) -> bool {
        self.info.name == name
    }

    pub fn is_label_match(&self, label: &str) -> bool {
        self.info.label == label
    }

    /// Number of widgets, fixed at definition time
    pub fn count(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Widget at `index` in definition order
    pub fn at(&self, index: usize) -> IndiResult<&Widget<V>> {
        let count = self.widgets.len();
        self.widgets
            .get(index)
            .ok_or(IndiError::IndexOutOfRange { index, count })
    }

    pub fn at_mut(&mut self, index: usize) -> IndiResult<&mut Widget<V>> {
        let count = self.widgets.len();
        self.widgets
            .get_mut(index)
            .ok_or(IndiError::IndexOutOfRange { index, count })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Widget<V>> {
        self.widgets.iter().find(|w| w.is_name_match(name))
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Widget<V>> {
        self.widgets.iter_mut().find(|w| w.is_name_match(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Widget<V>> {
        self.widgets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Widget<V>> {
        self.widgets.iter_mut()
    }

    pub fn widgets(&self) -> &[Widget<V>] {
        &self.widgets
    }
}

impl<'a, V: WidgetValue> IntoIterator for &'a WidgetVector<V> {
    type Item = &'a Widget<V>;
    type IntoIter = std::slice::Iter<'a, Widget<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.widgets.iter()
    }
}

impl SwitchVector {
    pub fn rule(&self) -> SwitchRule {
        self.extra
    }

    /// First widget in the On state
    pub fn find_on(&self) -> Option<&Widget<SwitchValue>> {
        self.widgets.iter().find(|w| w.is_on())
    }

    pub fn find_on_index(&self) -> Option<usize> {
        self.widgets.iter().position(|w| w.is_on())
    }

    pub fn on_count(&self) -> usize {
        self.widgets.iter().filter(|w| w.is_on()).count()
    }

    /// Turn every switch Off; the caller must then satisfy the rule
    /// before the vector is sent
    pub fn reset(&mut self) {
        for widget in &mut self.widgets {
            widget.set_state(SwitchState::Off);
        }
    }

    pub fn validate_rule(&self) -> IndiResult<()> {
        let on = self.on_count();
        if self.rule().allows(on) {
            Ok(())
        } else {
            Err(IndiError::invariant(
                &self.info.device,
                &self.info.name,
                format!("{} switches On violates {}", on, self.rule().as_str()),
            ))
        }
    }
}

impl WidgetValue for TextValue {
    type Extra = ();
    const KIND: PropertyKind = PropertyKind::Text;

    fn from_init(init: WidgetInit) -> Option<Self> {
        match init {
            WidgetInit::Text(text) => Some(TextValue::new(text)),
            _ => None,
        }
    }

    fn merge(&mut self, info: &VectorInfo, _widget: &str, update: WidgetUpdate) -> IndiResult<()> {
        match update {
            WidgetUpdate::Text(text) => {
                self.set_text(text);
                Ok(())
            }
            other => Err(info.kind_mismatch(Self::KIND, other.kind())),
        }
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>> {
        match vector {
            PropertyVector::Text(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector {
        PropertyVector::Text(vector)
    }
}

impl WidgetValue for NumberValue {
    type Extra = ();
    const KIND: PropertyKind = PropertyKind::Number;

    fn from_init(init: WidgetInit) -> Option<Self> {
        match init {
            WidgetInit::Number(number) => Some(number),
            _ => None,
        }
    }

    fn merge(&mut self, info: &VectorInfo, widget: &str, update: WidgetUpdate) -> IndiResult<()> {
        let change = match update {
            WidgetUpdate::Number(change) => change,
            other => return Err(info.kind_mismatch(Self::KIND, other.kind())),
        };
        if change.min.is_some() || change.max.is_some() {
            let min = change.min.unwrap_or(self.min());
            let max = change.max.unwrap_or(self.max());
            self.set_min_max(min, max).map_err(|reason| {
                IndiError::invariant(&info.device, &info.name, format!("{}: {}", widget, reason))
            })?;
        }
        if let Some(step) = change.step {
            self.set_step(step).map_err(|reason| {
                IndiError::invariant(&info.device, &info.name, format!("{}: {}", widget, reason))
            })?;
        }
        if let Some(value) = change.value {
            self.set_value(value)
                .map_err(|value| IndiError::ValueOutOfRange {
                    device: info.device.clone(),
                    property: info.name.clone(),
                    element: widget.to_string(),
                    value,
                    min: self.min(),
                    max: self.max(),
                })?;
        }
        Ok(())
    }

    fn check(vector: &WidgetVector<Self>) -> IndiResult<()> {
        for widget in vector.iter() {
            let number = widget.value();
            if number.min().is_nan() || number.max().is_nan() || number.min() > number.max() {
                return Err(IndiError::invariant(
                    vector.device(),
                    vector.name(),
                    format!(
                        "{}: min {} is greater than max {}",
                        widget.name(),
                        number.min(),
                        number.max()
                    ),
                ));
            }
            if number.step().is_nan() || number.step() < 0.0 {
                return Err(IndiError::invariant(
                    vector.device(),
                    vector.name(),
                    format!("{}: step {} must be non-negative", widget.name(), number.step()),
                ));
            }
            if !number.accepts(number.value()) {
                return Err(IndiError::ValueOutOfRange {
                    device: vector.device().to_string(),
                    property: vector.name().to_string(),
                    element: widget.name().to_string(),
                    value: number.value(),
                    min: number.min(),
                    max: number.max(),
                });
            }
        }
        Ok(())
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>> {
        match vector {
            PropertyVector::Number(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector {
        PropertyVector::Number(vector)
    }
}

impl WidgetValue for SwitchValue {
    type Extra = SwitchRule;
    const KIND: PropertyKind = PropertyKind::Switch;

    fn from_init(init: WidgetInit) -> Option<Self> {
        match init {
            WidgetInit::Switch(state) => Some(SwitchValue::new(state)),
            _ => None,
        }
    }

    fn extra_from(def: &PropertyDefinition) -> SwitchRule {
        def.rule.unwrap_or_default()
    }

    fn merge(&mut self, info: &VectorInfo, _widget: &str, update: WidgetUpdate) -> IndiResult<()> {
        match update {
            WidgetUpdate::Switch(state) => {
                self.set_state(state);
                Ok(())
            }
            other => Err(info.kind_mismatch(Self::KIND, other.kind())),
        }
    }

    fn check(vector: &WidgetVector<Self>) -> IndiResult<()> {
        vector.validate_rule()
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>> {
        match vector {
            PropertyVector::Switch(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector {
        PropertyVector::Switch(vector)
    }
}

impl WidgetValue for LightValue {
    type Extra = ();
    const KIND: PropertyKind = PropertyKind::Light;

    fn from_init(init: WidgetInit) -> Option<Self> {
        match init {
            WidgetInit::Light(state) => Some(LightValue::new(state)),
            _ => None,
        }
    }

    fn merge(&mut self, info: &VectorInfo, _widget: &str, update: WidgetUpdate) -> IndiResult<()> {
        match update {
            WidgetUpdate::Light(state) => {
                self.set_state(state);
                Ok(())
            }
            other => Err(info.kind_mismatch(Self::KIND, other.kind())),
        }
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>> {
        match vector {
            PropertyVector::Light(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector {
        PropertyVector::Light(vector)
    }
}

impl WidgetValue for BlobValue {
    type Extra = ();
    const KIND: PropertyKind = PropertyKind::Blob;

    fn from_init(init: WidgetInit) -> Option<Self> {
        match init {
            WidgetInit::Blob { format, size } => Some(BlobValue::new(format, size)),
            _ => None,
        }
    }

    fn merge(&mut self, info: &VectorInfo, widget: &str, update: WidgetUpdate) -> IndiResult<()> {
        let change = match update {
            WidgetUpdate::Blob(change) => change,
            other => return Err(info.kind_mismatch(Self::KIND, other.kind())),
        };
        let declared = change.size.unwrap_or(self.size());
        let buffer = BlobBuffer::with_declared_size(change.data, declared);
        if let Err((declared, received)) = buffer.verify() {
            return Err(IndiError::BlobSizeMismatch {
                device: info.device.clone(),
                property: info.name.clone(),
                element: widget.to_string(),
                declared,
                received,
            });
        }
        tracing::debug!(
            "BLOB received for {}.{}.{}: {} bytes",
            info.device,
            info.name,
            widget,
            buffer.len()
        );
        self.replace(change.format, buffer);
        Ok(())
    }

    fn project(vector: &PropertyVector) -> Option<&WidgetVector<Self>> {
        match vector {
            PropertyVector::Blob(v) => Some(v),
            _ => None,
        }
    }

    fn wrap(vector: WidgetVector<Self>) -> PropertyVector {
        PropertyVector::Blob(vector)
    }
}

/// A property vector of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyVector {
    Text(TextVector),
    Number(NumberVector),
    Switch(SwitchVector),
    Light(LightVector),
    Blob(BlobVector),
}

impl PropertyVector {
    /// Build the variant named by `def.kind`
    pub fn from_definition(def: PropertyDefinition) -> IndiResult<Self> {
        match def.kind {
            PropertyKind::Text => TextVector::from_definition(def).map(PropertyVector::Text),
            PropertyKind::Number => NumberVector::from_definition(def).map(PropertyVector::Number),
            PropertyKind::Switch => SwitchVector::from_definition(def).map(PropertyVector::Switch),
            PropertyKind::Light => LightVector::from_definition(def).map(PropertyVector::Light),
            PropertyKind::Blob => BlobVector::from_definition(def).map(PropertyVector::Blob),
            PropertyKind::Unknown => Err(IndiError::invariant(
                &def.device,
                &def.name,
                "definition without a property kind",
            )),
        }
    }

    pub(crate) fn updated(&self, update: &PropertyUpdate) -> IndiResult<Self> {
        match self {
            PropertyVector::Text(v) => v.updated(update).map(PropertyVector::Text),
            PropertyVector::Number(v) => v.updated(update).map(PropertyVector::Number),
            PropertyVector::Switch(v) => v.updated(update).map(PropertyVector::Switch),
            PropertyVector::Light(v) => v.updated(update).map(PropertyVector::Light),
            PropertyVector::Blob(v) => v.updated(update).map(PropertyVector::Blob),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyVector::Text(_) => PropertyKind::Text,
            PropertyVector::Number(_) => PropertyKind::Number,
            PropertyVector::Switch(_) => PropertyKind::Switch,
            PropertyVector::Light(_) => PropertyKind::Light,
            PropertyVector::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn info(&self) -> &VectorInfo {
        match self {
            PropertyVector::Text(v) => v.info(),
            PropertyVector::Number(v) => v.info(),
            PropertyVector::Switch(v) => v.info(),
            PropertyVector::Light(v) => v.info(),
            PropertyVector::Blob(v) => v.info(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            PropertyVector::Text(v) => v.count(),
            PropertyVector::Number(v) => v.count(),
            PropertyVector::Switch(v) => v.count(),
            PropertyVector::Light(v) => v.count(),
            PropertyVector::Blob(v) => v.count(),
        }
    }

    /// Widget names in definition order
    pub fn widget_names(&self) -> Vec<String> {
        fn names<V: WidgetValue>(v: &WidgetVector<V>) -> Vec<String> {
            v.iter().map(|w| w.name().to_string()).collect()
        }
        match self {
            PropertyVector::Text(v) => names(v),
            PropertyVector::Number(v) => names(v),
            PropertyVector::Switch(v) => names(v),
            PropertyVector::Light(v) => names(v),
            PropertyVector::Blob(v) => names(v),
        }
    }

    /// Typed access; `None` when `V` is not this vector's kind
    pub fn downcast<V: WidgetValue>(&self) -> Option<&WidgetVector<V>> {
        V::project(self)
    }

    pub fn device(&self) -> &str {
        &self.info().device
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn label(&self) -> &str {
        &self.info().label
    }

    pub fn group(&self) -> &str {
        &self.info().group
    }

    pub fn state(&self) -> PropertyState {
        self.info().state
    }

    pub fn permission(&self) -> Permission {
        self.info().permission
    }

    pub fn timeout(&self) -> f64 {
        self.info().timeout
    }

    pub fn timestamp(&self) -> &str {
        &self.info().timestamp
    }
}

impl<V: WidgetValue> From<WidgetVector<V>> for PropertyVector {
    fn from(vector: WidgetVector<V>) -> Self {
        V::wrap(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NumberChange, WidgetChange, WidgetDefinition};
    use crate::protocol::standard_properties::{CONNECT, CONNECTION, DISCONNECT};

    fn connection(connect: SwitchState, disconnect: SwitchState) -> SwitchVector {
        SwitchVector::from_definition(
            PropertyDefinition::new("Telescope", CONNECTION, PropertyKind::Switch)
                .rule(SwitchRule::OneOfMany)
                .widget(WidgetDefinition::switch(CONNECT, connect))
                .widget(WidgetDefinition::switch(DISCONNECT, disconnect)),
        )
        .unwrap()
    }

    fn coord() -> NumberVector {
        NumberVector::from_definition(
            PropertyDefinition::new("Telescope", "COORD", PropertyKind::Number)
                .timestamp("2024-01-01T00:00:00")
                .widget(WidgetDefinition::number("RA", 0.0, 0.0, 24.0, 0.0001))
                .widget(WidgetDefinition::number("DEC", 0.0, -90.0, 90.0, 0.0)),
        )
        .unwrap()
    }

    #[test]
    fn test_indexed_access_is_checked() {
        let v = coord();
        assert_eq!(v.count(), 2);
        assert_eq!(v.at(0).unwrap().name(), "RA");
        assert_eq!(v.at(1).unwrap().name(), "DEC");
        assert_eq!(
            v.at(2).unwrap_err(),
            IndiError::IndexOutOfRange { index: 2, count: 2 }
        );
        assert!(v.at(usize::MAX).is_err());
    }

    #[test]
    fn test_find_on_and_reset() {
        let mut v = connection(SwitchState::Off, SwitchState::On);
        assert_eq!(v.find_on().unwrap().name(), DISCONNECT);
        assert_eq!(v.find_on_index(), Some(1));

        v.reset();
        assert_eq!(v.find_on(), None);
        assert_eq!(v.find_on_index(), None);
        assert!(v.validate_rule().unwrap_err().is_invariant_violation());

        v.at_mut(0).unwrap().set_state(SwitchState::On);
        assert!(v.validate_rule().is_ok());
    }

    #[test]
    fn test_one_of_many_definition_must_hold() {
        let err = SwitchVector::from_definition(
            PropertyDefinition::new("Telescope", CONNECTION, PropertyKind::Switch)
                .widget(WidgetDefinition::switch(CONNECT, SwitchState::On))
                .widget(WidgetDefinition::switch(DISCONNECT, SwitchState::On)),
        )
        .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_at_most_one_allows_all_off() {
        let v = SwitchVector::from_definition(
            PropertyDefinition::new("Focuser", "FOCUS_MOTION", PropertyKind::Switch)
                .rule(SwitchRule::AtMostOne)
                .widget(WidgetDefinition::switch("FOCUS_INWARD", SwitchState::Off))
                .widget(WidgetDefinition::switch("FOCUS_OUTWARD", SwitchState::Off)),
        )
        .unwrap();
        assert_eq!(v.rule(), SwitchRule::AtMostOne);
        let both = PropertyUpdate::new("Focuser", "FOCUS_MOTION")
            .change(WidgetChange::switch("FOCUS_INWARD", SwitchState::On))
            .change(WidgetChange::switch("FOCUS_OUTWARD", SwitchState::On));
        assert!(v.updated(&both).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_partial_switch_update_is_not_auto_exclusive() {
        let v = connection(SwitchState::Off, SwitchState::On);

        let connect_only = PropertyUpdate::new("Telescope", CONNECTION)
            .change(WidgetChange::switch(CONNECT, SwitchState::On));
        let err = v.updated(&connect_only).unwrap_err();
        assert!(err.is_invariant_violation());

        let both = connect_only.change(WidgetChange::switch(DISCONNECT, SwitchState::Off));
        let next = v.updated(&both).unwrap();
        assert_eq!(next.find_on().unwrap().name(), CONNECT);
        assert_eq!(next.on_count(), 1);
        assert_eq!(next.count(), v.count());
    }

    #[test]
    fn test_duplicate_and_foreign_widgets_are_rejected() {
        let dup = TextVector::from_definition(
            PropertyDefinition::new("CCD", "FILTER_NAME", PropertyKind::Text)
                .widget(WidgetDefinition::text("FILTER_SLOT_NAME_1", "Red"))
                .widget(WidgetDefinition::text("FILTER_SLOT_NAME_1", "Green")),
        )
        .unwrap_err();
        assert!(matches!(dup, IndiError::DuplicateWidget { .. }));

        let mixed = PropertyVector::from_definition(
            PropertyDefinition::new("CCD", "FILTER_NAME", PropertyKind::Text)
                .widget(WidgetDefinition::text("A", "Red"))
                .widget(WidgetDefinition::number("B", 1.0, 0.0, 0.0, 0.0)),
        )
        .unwrap_err();
        assert!(mixed.is_invariant_violation());
    }

    #[test]
    fn test_number_update_out_of_range_is_rejected() {
        let v = coord();
        let too_far = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange::number("RA", 25.0));
        assert!(matches!(
            v.updated(&too_far).unwrap_err(),
            IndiError::ValueOutOfRange { value, .. } if value == 25.0
        ));

        let ok = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange::number("RA", 12.5));
        let next = v.updated(&ok).unwrap();
        assert_eq!(next.count(), v.count());
        assert_eq!(next.find_by_name("RA").unwrap().get_value(), 12.5);
        assert_eq!(v.find_by_name("RA").unwrap().get_value(), 0.0);
    }

    #[test]
    fn test_number_bounds_update() {
        let v = coord();
        let narrowed = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange {
            name: "DEC".to_string(),
            update: WidgetUpdate::Number(NumberChange {
                min: Some(10.0),
                ..NumberChange::default()
            }),
        });
        let next = v.updated(&narrowed).unwrap();
        assert_eq!(next.count(), v.count());
        let dec = next.find_by_name("DEC").unwrap();
        assert_eq!((dec.min(), dec.max(), dec.get_value()), (10.0, 90.0, 10.0));

        let inverted = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange {
            name: "DEC".to_string(),
            update: WidgetUpdate::Number(NumberChange {
                min: Some(100.0),
                ..NumberChange::default()
            }),
        });
        assert!(v.updated(&inverted).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_update_with_wrong_kind_or_unknown_widget() {
        let v = coord();
        let wrong = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange::text("RA", "12:00"));
        assert!(v.updated(&wrong).unwrap_err().is_invariant_violation());

        let unknown = PropertyUpdate::new("Telescope", "COORD").change(WidgetChange::number("AZ", 1.0));
        assert!(v.updated(&unknown).unwrap_err().is_protocol_error());
    }

    #[test]
    fn test_empty_update_only_changes_timestamp() {
        let v = coord();
        let next = v
            .updated(&PropertyUpdate::new("Telescope", "COORD").timestamp("2024-01-01T00:00:05"))
            .unwrap();
        assert_eq!(next.timestamp(), "2024-01-01T00:00:05");
        assert_eq!(next.count(), v.count());
        assert_ne!(next, v);

        let mut restamped = next.clone();
        restamped.info.timestamp = v.timestamp().to_string();
        assert_eq!(restamped, v);
    }

    #[test]
    fn test_light_vector_is_read_only() {
        let v = LightVector::from_definition(
            PropertyDefinition::new("Weather", "WEATHER_STATUS", PropertyKind::Light)
                .permission(Permission::ReadWrite)
                .timeout(60.0)
                .widget(WidgetDefinition::light("WEATHER_RAIN", PropertyState::Ok)),
        )
        .unwrap();
        assert_eq!(v.permission(), Permission::ReadOnly);
        assert_eq!(v.timeout(), 0.0);
        assert_eq!(v.at(0).unwrap().state(), PropertyState::Ok);
    }

    #[test]
    fn test_blob_size_must_match_declared() {
        let v = BlobVector::from_definition(
            PropertyDefinition::new("CCD Simulator", "CCD1", PropertyKind::Blob)
                .permission(Permission::ReadOnly)
                .widget(WidgetDefinition::blob("CCD1", ".fits", 1024)),
        )
        .unwrap();

        let full = PropertyUpdate::new("CCD Simulator", "CCD1")
            .change(WidgetChange::blob("CCD1", None, vec![0u8; 1024]));
        let next = v.updated(&full).unwrap();
        assert_eq!(next.count(), v.count());
        assert_eq!(next.at(0).unwrap().bytes().len(), 1024);
        assert_eq!(next.at(0).unwrap().size(), 1024);

        let short = PropertyUpdate::new("CCD Simulator", "CCD1")
            .change(WidgetChange::blob("CCD1", None, vec![0u8; 900]));
        assert!(matches!(
            next.updated(&short).unwrap_err(),
            IndiError::BlobSizeMismatch { declared: 1024, received: 900, .. }
        ));

        let resized = PropertyUpdate::new("CCD Simulator", "CCD1")
            .change(WidgetChange::blob("CCD1", Some(3), vec![0u8, 0, 7]));
        assert_eq!(next.updated(&resized).unwrap().at(0).unwrap().size(), 3);
    }

    #[test]
    fn test_downcast_matches_kind_only() {
        let vector = PropertyVector::from(coord());
        assert_eq!(vector.kind(), PropertyKind::Number);
        assert!(vector.downcast::<NumberValue>().is_some());
        assert!(vector.downcast::<SwitchValue>().is_none());
        assert_eq!(vector.widget_names(), vec!["RA", "DEC"]);
    }
}
