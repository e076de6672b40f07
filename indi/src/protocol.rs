//! INDI protocol vocabulary
//!
//! Scoped enumerations for the protocol constants, with the wire spellings
//! used by `as_str` and `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// INDI protocol version
pub const INDI_PROTOCOL_VERSION: &str = "1.7";

/// Kind of a property vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyKind {
    Text,
    Number,
    Switch,
    Light,
    Blob,
    /// Kind of an empty or unresolved handle
    #[default]
    Unknown,
}

impl PropertyKind {
    /// Short name as used in messages ("Switch")
    pub fn short_name(&self) -> &'static str {
        match self {
            PropertyKind::Text => "Text",
            PropertyKind::Number => "Number",
            PropertyKind::Switch => "Switch",
            PropertyKind::Light => "Light",
            PropertyKind::Blob => "BLOB",
            PropertyKind::Unknown => "Unknown",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Text => "INDI_TEXT",
            PropertyKind::Number => "INDI_NUMBER",
            PropertyKind::Switch => "INDI_SWITCH",
            PropertyKind::Light => "INDI_LIGHT",
            PropertyKind::Blob => "INDI_BLOB",
            PropertyKind::Unknown => "INDI_UNKNOWN",
        }
    }
}

/// Property (and light) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

impl PropertyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyState::Idle => "Idle",
            PropertyState::Ok => "Ok",
            PropertyState::Busy => "Busy",
            PropertyState::Alert => "Alert",
        }
    }
}

/// Property permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Permission {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadOnly => "ro",
            Permission::WriteOnly => "wo",
            Permission::ReadWrite => "rw",
        }
    }

    /// Whether a client may submit new values
    pub fn is_writable(&self) -> bool {
        !matches!(self, Permission::ReadOnly)
    }
}

/// Switch widget state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwitchState {
    #[default]
    Off,
    On,
}

impl SwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::Off => "Off",
            SwitchState::On => "On",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

/// Exclusivity rule of a switch vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwitchRule {
    #[default]
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl SwitchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchRule::OneOfMany => "OneOfMany",
            SwitchRule::AtMostOne => "AtMostOne",
            SwitchRule::AnyOfMany => "AnyOfMany",
        }
    }

    /// Whether `on_count` switches in the On state satisfy the rule
    pub fn allows(&self, on_count: usize) -> bool {
        match self {
            SwitchRule::OneOfMany => on_count == 1,
            SwitchRule::AtMostOne => on_count <= 1,
            SwitchRule::AnyOfMany => true,
        }
    }
}

/// BLOB delivery mode negotiated with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlobMode {
    /// No BLOBs are delivered
    #[default]
    Never,
    /// BLOBs are delivered along with other vectors
    Also,
    /// Only BLOBs are delivered
    Only,
}

impl BlobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobMode::Never => "Never",
            BlobMode::Also => "Also",
            BlobMode::Only => "Only",
        }
    }
}

/// Error returned when a wire spelling is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised {what}: '{value}'")]
pub struct ParseProtocolError {
    pub what: &'static str,
    pub value: String,
}

fn unrecognised(what: &'static str, value: &str) -> ParseProtocolError {
    ParseProtocolError {
        what,
        value: value.to_string(),
    }
}

// Wire spellings are matched ignoring case and surrounding whitespace
fn normalised(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

impl FromStr for PropertyState {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalised(s).as_str() {
            "idle" => Ok(PropertyState::Idle),
            "ok" => Ok(PropertyState::Ok),
            "busy" => Ok(PropertyState::Busy),
            "alert" => Ok(PropertyState::Alert),
            _ => Err(unrecognised("property state", s)),
        }
    }
}

impl FromStr for Permission {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalised(s).as_str() {
            "ro" => Ok(Permission::ReadOnly),
            "wo" => Ok(Permission::WriteOnly),
            "rw" => Ok(Permission::ReadWrite),
            _ => Err(unrecognised("permission", s)),
        }
    }
}

impl FromStr for SwitchState {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalised(s).as_str() {
            "on" => Ok(SwitchState::On),
            "off" => Ok(SwitchState::Off),
            _ => Err(unrecognised("switch state", s)),
        }
    }
}

impl FromStr for SwitchRule {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalised(s).as_str() {
            "oneofmany" => Ok(SwitchRule::OneOfMany),
            "atmostone" => Ok(SwitchRule::AtMostOne),
            "anyofmany" => Ok(SwitchRule::AnyOfMany),
            _ => Err(unrecognised("switch rule", s)),
        }
    }
}

impl FromStr for BlobMode {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalised(s).as_str() {
            "never" => Ok(BlobMode::Never),
            "also" => Ok(BlobMode::Also),
            "only" => Ok(BlobMode::Only),
            _ => Err(unrecognised("BLOB mode", s)),
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard INDI properties
pub mod standard_properties {
    /// Connection control switch
    pub const CONNECTION: &str = "CONNECTION";
    pub const CONNECT: &str = "CONNECT";
    pub const DISCONNECT: &str = "DISCONNECT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_spellings_parse() {
        assert_eq!("Busy".parse::<PropertyState>(), Ok(PropertyState::Busy));
        assert_eq!("RO".parse::<Permission>(), Ok(Permission::ReadOnly));
        assert_eq!(" On\n".parse::<SwitchState>(), Ok(SwitchState::On));
        assert_eq!("AtMostOne".parse::<SwitchRule>(), Ok(SwitchRule::AtMostOne));
        assert_eq!("Only".parse::<BlobMode>(), Ok(BlobMode::Only));

        let err = "Paused".parse::<PropertyState>().unwrap_err();
        assert_eq!(err.to_string(), "unrecognised property state: 'Paused'");
    }

    #[test]
    fn test_parsing_ignores_case_and_whitespace() {
        assert_eq!(" busy ".parse::<PropertyState>(), Ok(PropertyState::Busy));
        assert_eq!("\trw".parse::<Permission>(), Ok(Permission::ReadWrite));
        assert_eq!("OFF".parse::<SwitchState>(), Ok(SwitchState::Off));
        assert_eq!("oneofmany\n".parse::<SwitchRule>(), Ok(SwitchRule::OneOfMany));
        assert_eq!(" also".parse::<BlobMode>(), Ok(BlobMode::Also));
        assert!("On Off".parse::<SwitchState>().is_err());
    }

    #[test]
    fn test_switch_rule_allows() {
        assert!(SwitchRule::OneOfMany.allows(1));
        assert!(!SwitchRule::OneOfMany.allows(0));
        assert!(!SwitchRule::OneOfMany.allows(2));
        assert!(SwitchRule::AtMostOne.allows(0));
        assert!(!SwitchRule::AtMostOne.allows(2));
        assert!(SwitchRule::AnyOfMany.allows(5));
    }

    #[test]
    fn test_defaults_match_protocol() {
        assert_eq!(PropertyKind::default(), PropertyKind::Unknown);
        assert_eq!(BlobMode::default(), BlobMode::Never);
        assert_eq!(Permission::default(), Permission::ReadWrite);
        assert!(!Permission::ReadOnly.is_writable());
        assert!(Permission::WriteOnly.is_writable());
        assert_eq!(PropertyKind::Switch.to_string(), "INDI_SWITCH");
    }
}
