//! Widgets: single named value slots of a property vector
//!
//! A `Widget<V>` carries a name, a display label and a kind-specific payload
//! `V`. The payload type fixes the widget kind for its whole lifetime; only
//! the value-bearing fields of the payload change.

use std::sync::Arc;

use crate::blob::BlobBuffer;
use crate::protocol::{PropertyState, SwitchState};

/// A named value slot of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Widget<V> {
    name: String,
    label: String,
    value: V,
}

impl<V> Widget<V> {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: V) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Exact, case-sensitive name comparison
    pub fn is_name_match(&self, name: &str) -> bool {
        self.name == name
    }

    /// Exact, case-sensitive label comparison
    pub fn is_label_match(&self, label: &str) -> bool {
        self.label == label
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }
}

/// Text payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextValue {
    text: String,
}

impl TextValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

/// Number payload
///
/// Range policy: when `min < max` the value must stay inside `[min, max]`.
/// Updates outside the range are rejected, and narrowing the bounds clamps
/// the current value into them. `min == max` declares no range. `step` is a
/// granularity hint used by [`NumberValue::snap`]; zero means unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberValue {
    value: f64,
    format: String,
    min: f64,
    max: f64,
    step: f64,
}

impl Default for NumberValue {
    fn default() -> Self {
        Self {
            value: 0.0,
            format: "%g".to_string(),
            min: 0.0,
            max: 0.0,
            step: 0.0,
        }
    }
}

impl NumberValue {
    pub fn new(value: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            value,
            min,
            max,
            step,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Whether the bounds constrain the value
    pub fn has_range(&self) -> bool {
        self.min < self.max
    }

    /// Whether `value` is acceptable under the current bounds
    pub fn accepts(&self, value: f64) -> bool {
        if value.is_nan() {
            return !self.has_range();
        }
        !self.has_range() || (value >= self.min && value <= self.max)
    }

    /// Set the value, rejecting it when it falls outside the bounds
    pub fn set_value(&mut self, value: f64) -> Result<(), f64> {
        if !self.accepts(value) {
            return Err(value);
        }
        self.value = value;
        Ok(())
    }

    /// Update both bounds at once; the current value is clamped into them
    pub fn set_min_max(&mut self, min: f64, max: f64) -> Result<(), String> {
        if min.is_nan() || max.is_nan() {
            return Err("bounds must be numbers".to_string());
        }
        if min > max {
            return Err(format!("min {} is greater than max {}", min, max));
        }
        self.min = min;
        self.max = max;
        if self.has_range() {
            self.value = self.value.clamp(min, max);
        }
        Ok(())
    }

    pub fn set_step(&mut self, step: f64) -> Result<(), String> {
        if step.is_nan() || step < 0.0 {
            return Err(format!("step {} must be non-negative", step));
        }
        self.step = step;
        Ok(())
    }

    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = format.into();
    }

    /// Round `value` to the step grid anchored at `min`, then into range
    pub fn snap(&self, value: f64) -> f64 {
        let mut snapped = value;
        if self.step > 0.0 {
            snapped = self.min + ((value - self.min) / self.step).round() * self.step;
        }
        if self.has_range() {
            snapped = snapped.clamp(self.min, self.max);
        }
        snapped
    }

    /// The value rendered with the INDI print format
    pub fn formatted(&self) -> String {
        format_number(&self.format, self.value)
    }
}

/// Switch payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchValue {
    state: SwitchState,
}

impl SwitchValue {
    pub fn new(state: SwitchState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn set_state(&mut self, state: SwitchState) {
        self.state = state;
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on()
    }
}

/// Light payload, read-only for clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightValue {
    state: PropertyState,
}

impl LightValue {
    pub fn new(state: PropertyState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> PropertyState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PropertyState) {
        self.state = state;
    }
}

/// BLOB payload
///
/// The buffer is shared immutably and replaced wholesale on every update, so
/// a reader holding a clone never observes a partially written payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlobValue {
    format: String,
    buffer: Arc<BlobBuffer>,
}

impl BlobValue {
    /// Empty payload announcing `declared_size` bytes
    pub fn new(format: impl Into<String>, declared_size: usize) -> Self {
        Self {
            format: format.into(),
            buffer: Arc::new(BlobBuffer::with_declared_size(Vec::new(), declared_size)),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Declared logical size in bytes
    pub fn size(&self) -> usize {
        self.buffer.declared_size()
    }

    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn buffer(&self) -> Arc<BlobBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Replace the payload; the declared size becomes the byte count
    pub fn set_blob(&mut self, format: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.format = format.into();
        self.buffer = Arc::new(BlobBuffer::from_bytes(bytes));
    }

    pub(crate) fn replace(&mut self, format: Option<String>, buffer: BlobBuffer) {
        if let Some(format) = format {
            self.format = format;
        }
        self.buffer = Arc::new(buffer);
    }
}

pub type TextWidget = Widget<TextValue>;
pub type NumberWidget = Widget<NumberValue>;
pub type SwitchWidget = Widget<SwitchValue>;
pub type LightWidget = Widget<LightValue>;
pub type BlobWidget = Widget<BlobValue>;

impl TextWidget {
    pub fn text(&self) -> &str {
        self.value.text()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.value.set_text(text);
    }
}

impl NumberWidget {
    pub fn get_value(&self) -> f64 {
        self.value.value()
    }

    pub fn set_value(&mut self, value: f64) -> Result<(), f64> {
        self.value.set_value(value)
    }

    pub fn min(&self) -> f64 {
        self.value.min()
    }

    pub fn max(&self) -> f64 {
        self.value.max()
    }

    pub fn step(&self) -> f64 {
        self.value.step()
    }

    pub fn format(&self) -> &str {
        self.value.format()
    }

    pub fn set_min_max(&mut self, min: f64, max: f64) -> Result<(), String> {
        self.value.set_min_max(min, max)
    }

    pub fn formatted(&self) -> String {
        self.value.formatted()
    }
}

impl SwitchWidget {
    pub fn state(&self) -> SwitchState {
        self.value.state()
    }

    pub fn set_state(&mut self, state: SwitchState) {
        self.value.set_state(state);
    }

    pub fn is_on(&self) -> bool {
        self.value.is_on()
    }
}

impl LightWidget {
    pub fn state(&self) -> PropertyState {
        self.value.state()
    }
}

impl BlobWidget {
    pub fn format(&self) -> &str {
        self.value.format()
    }

    pub fn size(&self) -> usize {
        self.value.size()
    }

    pub fn bytes(&self) -> &[u8] {
        self.value.bytes()
    }

    pub fn set_blob(&mut self, format: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.value.set_blob(format, bytes);
    }
}

/// Parsed printf-style conversion of an INDI number format
struct PrintfSpec<'a> {
    prefix: &'a str,
    suffix: &'a str,
    left: bool,
    plus: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

impl<'a> PrintfSpec<'a> {
    fn parse(format: &'a str) -> Option<Self> {
        let start = format.find('%')?;
        let rest = &format[start + 1..];
        let mut chars = rest.char_indices().peekable();
        let (mut left, mut plus, mut zero) = (false, false, false);

        while let Some(&(_, c)) = chars.peek() {
            match c {
                '-' => left = true,
                '+' => plus = true,
                '0' => zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }

        let mut width = 0usize;
        while let Some(&(_, c)) = chars.peek() {
            match c.to_digit(10) {
                Some(d) => width = width * 10 + d as usize,
                None => break,
            }
            chars.next();
        }

        let mut precision = None;
        if let Some(&(_, '.')) = chars.peek() {
            chars.next();
            let mut p = 0usize;
            while let Some(&(_, c)) = chars.peek() {
                match c.to_digit(10) {
                    Some(d) => p = p * 10 + d as usize,
                    None => break,
                }
                chars.next();
            }
            precision = Some(p);
        }

        while let Some(&(_, 'l' | 'h' | 'L')) = chars.peek() {
            chars.next();
        }

        let (idx, conversion) = chars.next()?;
        Some(Self {
            prefix: &format[..start],
            suffix: &rest[idx + conversion.len_utf8()..],
            left,
            plus,
            zero,
            width,
            precision,
            conversion,
        })
    }

    fn pad(&self, body: String) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && self.conversion != 'm' {
            let (sign, digits) = match body.strip_prefix(|c| c == '-' || c == '+') {
                Some(digits) => (&body[..1], digits),
                None => ("", body.as_str()),
            };
            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

/// Render `value` with an INDI number format (`%f`, `%e`, `%g`, `%d`, `%m`)
pub(crate) fn format_number(format: &str, value: f64) -> String {
    let Some(spec) = PrintfSpec::parse(format) else {
        return value.to_string();
    };

    let mut body = match spec.conversion {
        'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), value),
        'e' | 'E' => c_exponent(value, spec.precision.unwrap_or(6)),
        'g' | 'G' => c_general(value, spec.precision.unwrap_or(6)),
        'd' | 'i' | 'u' => format!("{}", value.round() as i64),
        'm' => {
            let body = sexagesimal(value, spec.width, spec.precision.unwrap_or(0));
            return format!("{}{}{}", spec.prefix, body, spec.suffix);
        }
        _ => value.to_string(),
    };
    if spec.conversion.is_ascii_uppercase() {
        body = body.to_uppercase();
    }
    if spec.plus && !body.starts_with('-') {
        body.insert(0, '+');
    }
    format!("{}{}{}", spec.prefix, spec.pad(body), spec.suffix)
}

fn c_exponent(value: f64, precision: usize) -> String {
    let rendered = format!("{:.*e}", precision, value);
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => rendered,
    }
}

fn c_general(value: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let rendered = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = rendered
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    let body = if exponent < -4 || exponent >= precision as i32 {
        c_exponent(value, precision - 1)
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, value)
    };
    strip_trailing_zeros(&body)
}

fn strip_trailing_zeros(body: &str) -> String {
    let (mantissa, exponent) = match body.find('e') {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, ""),
    };
    if !mantissa.contains('.') {
        return body.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, exponent)
}

/// Sexagesimal rendering of the `%<w>.<f>m` format family
fn sexagesimal(value: f64, width: usize, fraction: usize) -> String {
    let fracbase: u64 = match fraction {
        9 => 360_000,
        8 => 36_000,
        6 => 3_600,
        5 => 600,
        _ => 60,
    };
    let whole_width = width.saturating_sub(fraction);

    let negative = value < 0.0;
    let scaled = (value.abs() * fracbase as f64).round() as u64;
    let degrees = scaled / fracbase;
    let frac = scaled % fracbase;

    let mut out = if negative && degrees == 0 {
        format!("{:>w$}", "-0", w = whole_width.max(2))
    } else if negative {
        format!("{:>w$}", format!("-{}", degrees), w = whole_width)
    } else {
        format!("{:>w$}", degrees, w = whole_width)
    };

    match fracbase {
        60 => out.push_str(&format!(":{:02}", frac)),
        600 => out.push_str(&format!(":{:02}.{}", frac / 10, frac % 10)),
        3_600 => out.push_str(&format!(":{:02}:{:02}", frac / 60, frac % 60)),
        36_000 => {
            let (m, s) = (frac / 600, frac % 600);
            out.push_str(&format!(":{:02}:{:02}.{}", m, s / 10, s % 10));
        }
        _ => {
            let (m, s) = (frac / 6_000, frac % 6_000);
            out.push_str(&format!(":{:02}:{:02}.{:02}", m, s / 100, s % 100));
        }
    }
    out
}
