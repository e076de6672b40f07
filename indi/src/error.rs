//! INDI error types
//!
//! Provides structured error types for the property model, the dispatcher and
//! the client connection.

use std::fmt;
use std::time::Duration;

use crate::protocol::PropertyKind;

/// INDI client errors
#[derive(Debug, Clone, PartialEq)]
pub enum IndiError {
    /// Indexed widget access outside `0..count`
    IndexOutOfRange { index: usize, count: usize },
    /// Typed view used on a property of another kind
    KindMismatch {
        device: String,
        property: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },
    /// Handle is empty, or its property was deleted or its session ended
    InvalidProperty { device: String, property: String },
    /// A mutation would break a kind-specific rule
    InvariantViolation {
        device: String,
        property: String,
        reason: String,
    },
    /// Property value out of range
    ValueOutOfRange {
        device: String,
        property: String,
        element: String,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Event arrived in a state where it is not allowed
    ProtocolSequence {
        device: String,
        property: String,
        reason: String,
    },
    /// Completed BLOB whose payload length differs from its declared size
    BlobSizeMismatch {
        device: String,
        property: String,
        element: String,
        declared: usize,
        received: usize,
    },
    /// Two widgets with the same name in one vector
    DuplicateWidget {
        device: String,
        property: String,
        element: String,
    },
    /// Property not found
    PropertyNotFound { device: String, property: String },
    /// Device not found
    DeviceNotFound(String),
    /// Permission denied (attempted to write to read-only property)
    PermissionDenied(String),
    /// Connection to INDI server failed
    ConnectionFailed(String),
    /// Connection timeout with context
    ConnectionTimeout {
        host: String,
        port: u16,
        duration: Duration,
    },
    /// Not connected to server
    NotConnected,
    /// A connection attempt or session is already active
    AlreadyConnected,
    /// Send channel closed
    ChannelClosed(String),
}

impl IndiError {
    /// True for errors raised because a mutation would break a vector rule.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            IndiError::InvariantViolation { .. }
                | IndiError::ValueOutOfRange { .. }
                | IndiError::DuplicateWidget { .. }
        )
    }

    /// True for events that do not fit the define/update/delete sequence,
    /// including transport inconsistencies such as short BLOB payloads.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            IndiError::ProtocolSequence { .. }
                | IndiError::BlobSizeMismatch { .. }
                | IndiError::DeviceNotFound(_)
        )
    }

    pub(crate) fn invariant(device: &str, property: &str, reason: impl Into<String>) -> Self {
        IndiError::InvariantViolation {
            device: device.to_string(),
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn sequence(device: &str, property: &str, reason: impl Into<String>) -> Self {
        IndiError::ProtocolSequence {
            device: device.to_string(),
            property: property.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::error::Error for IndiError {}

impl fmt::Display for IndiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndiError::IndexOutOfRange { index, count } => {
                write!(f, "Widget index {} out of range (count {})", index, count)
            }
            IndiError::KindMismatch {
                device,
                property,
                expected,
                actual,
            } => write!(
                f,
                "Property {}.{} is a {} vector, not {}",
                device,
                property,
                actual.short_name(),
                expected.short_name()
            ),
            IndiError::InvalidProperty { device, property } => {
                if device.is_empty() && property.is_empty() {
                    write!(f, "Invalid property handle")
                } else {
                    write!(f, "Property {}.{} is no longer valid", device, property)
                }
            }
            IndiError::InvariantViolation {
                device,
                property,
                reason,
            } => write!(f, "Invariant violation on {}.{}: {}", device, property, reason),
            IndiError::ValueOutOfRange {
                device,
                property,
                element,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "Value {} out of range [{}, {}] for {}.{}.{}",
                    value, min, max, device, property, element
                )
            }
            IndiError::ProtocolSequence {
                device,
                property,
                reason,
            } => write!(f, "Protocol error on {}.{}: {}", device, property, reason),
            IndiError::BlobSizeMismatch {
                device,
                property,
                element,
                declared,
                received,
            } => write!(
                f,
                "BLOB {}.{}.{} declared {} bytes but received {}",
                device, property, element, declared, received
            ),
            IndiError::DuplicateWidget {
                device,
                property,
                element,
            } => write!(
                f,
                "Duplicate widget '{}' in {}.{}",
                element, device, property
            ),
            IndiError::PropertyNotFound { device, property } => {
                write!(f, "Property not found: {}.{}", device, property)
            }
            IndiError::DeviceNotFound(device) => write!(f, "Device not found: {}", device),
            IndiError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            IndiError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            IndiError::ConnectionTimeout { host, port, duration } => {
                write!(
                    f,
                    "Connection timeout: failed to connect to {}:{} after {:?}",
                    host, port, duration
                )
            }
            IndiError::NotConnected => write!(f, "Not connected to INDI server"),
            IndiError::AlreadyConnected => write!(f, "Already connected to INDI server"),
            IndiError::ChannelClosed(msg) => write!(f, "Channel closed: {}", msg),
        }
    }
}

impl From<IndiError> for String {
    fn from(err: IndiError) -> String {
        err.to_string()
    }
}

/// Result type for INDI operations
pub type IndiResult<T> = Result<T, IndiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndiError::ConnectionFailed("connection refused".to_string());
        assert_eq!(err.to_string(), "Connection failed: connection refused");

        let err = IndiError::PropertyNotFound {
            device: "CCD Simulator".to_string(),
            property: "CCD_EXPOSURE".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Property not found: CCD Simulator.CCD_EXPOSURE"
        );

        let err = IndiError::ValueOutOfRange {
            device: "Telescope".to_string(),
            property: "COORD".to_string(),
            element: "RA".to_string(),
            value: 25.0,
            min: 0.0,
            max: 24.0,
        };
        assert!(err.to_string().contains("25"));
        assert!(err.to_string().contains("24"));
        assert!(err.to_string().contains("Telescope.COORD.RA"));
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = IndiError::NotConnected;
        let s: String = err.into();
        assert_eq!(s, "Not connected to INDI server");
    }

    #[test]
    fn test_kind_mismatch_display() {
        let err = IndiError::KindMismatch {
            device: "Telescope".to_string(),
            property: "CONNECTION".to_string(),
            expected: PropertyKind::Number,
            actual: PropertyKind::Switch,
        };
        let msg = err.to_string();
        assert_eq!(
            msg,
            "Property Telescope.CONNECTION is a Switch vector, not Number"
        );
    }

    #[test]
    fn test_blob_size_mismatch_display() {
        let err = IndiError::BlobSizeMismatch {
            device: "CCD Simulator".to_string(),
            property: "CCD1".to_string(),
            element: "CCD1".to_string(),
            declared: 1024,
            received: 900,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("900"));
        assert!(err.is_protocol_error());
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_error_classification() {
        assert!(IndiError::invariant("d", "p", "two switches on").is_invariant_violation());
        assert!(IndiError::sequence("d", "p", "not defined").is_protocol_error());
        assert!(!IndiError::IndexOutOfRange { index: 3, count: 2 }.is_protocol_error());
        assert_eq!(
            IndiError::InvalidProperty {
                device: String::new(),
                property: String::new()
            }
            .to_string(),
            "Invalid property handle"
        );
    }

    #[test]
    fn test_connection_timeout_display() {
        let err = IndiError::ConnectionTimeout {
            host: "192.168.1.100".to_string(),
            port: 7624,
            duration: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("192.168.1.100"));
        assert!(msg.contains("7624"));
        assert!(msg.contains("30"));
    }
}
