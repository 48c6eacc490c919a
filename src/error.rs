//! Error types shared across the crate.

use thiserror::Error;

/// Failure to decode or encode a ZCL frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame is shorter than its fixed layout requires.
    #[error("{what}: need {needed} bytes, got {available}")]
    Truncated {
        /// What was being decoded.
        what: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// The command id is not defined for this cluster and direction.
    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),
    /// Manufacturer-specific or global frames are not DRLC commands.
    #[error("unsupported frame control 0x{0:02x}")]
    UnsupportedFrame(u8),
    /// A field holds a value outside its enumeration.
    #[error("invalid {what} 0x{value:02x}")]
    InvalidValue {
        what: &'static str,
        value: u8,
    },
}

/// Failure reported by the radio/network transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The destination node could not be reached.
    #[error("node 0x{0:04x} unreachable")]
    Unreachable(u16),
}

/// Failure to write an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    /// The endpoint does not host the attribute.
    #[error("attribute 0x{attribute:04x} not found on endpoint {endpoint}")]
    NotFound {
        /// Endpoint that was addressed.
        endpoint: u8,
        /// Attribute identifier.
        attribute: u16,
    },
    /// The stored value has a different type than the one written.
    #[error("attribute 0x{0:04x} type mismatch")]
    TypeMismatch(u16),
}

/// Errors surfaced by the DRLC client to the framework.
#[derive(Debug, Error)]
pub enum DrlcError {
    /// The incoming frame could not be parsed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The destination endpoint is not a registered DRLC client.
    #[error("endpoint {0} is not a DRLC client")]
    UnknownEndpoint(u8),
}
