//! Error types for the DTEL report engine.
//!
//! Only configuration mutators return these. The per-packet path never
//! surfaces an error to its caller: faults there fail open (no report) and
//! are counted in [`crate::DtelStats`].

use std::net::Ipv4Addr;

use sonic_types::ParseError;
use thiserror::Error;

use crate::types::{DtelEventType, QueueKey};

/// DTEL engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DtelError {
    /// A watch rule with the same ID is already installed.
    #[error("watch rule already exists: {0}")]
    RuleExists(String),

    /// No watch rule with this ID.
    #[error("watch rule not found: {0}")]
    RuleNotFound(String),

    /// Watch rule failed validation.
    #[error("invalid watch rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },

    /// No report session with this name.
    #[error("report session not found: {0}")]
    SessionNotFound(String),

    /// Report session attribute failed validation.
    #[error("invalid report session {name}: {reason}")]
    InvalidSession { name: String, reason: String },

    /// DTEL event setting out of range.
    #[error("invalid setting for {event}: {reason}")]
    InvalidEvent {
        event: DtelEventType,
        reason: String,
    },

    /// Queue has no queue-report configuration.
    #[error("queue not monitored: {0}")]
    QueueNotMonitored(QueueKey),

    /// Report serialization failed.
    #[error("failed to encode report: {0}")]
    Encode(String),

    /// Report could not be handed to the transport.
    #[error("failed to transmit report to {destination}: {reason}")]
    Transmit {
        destination: Ipv4Addr,
        reason: String,
    },

    /// Malformed textual value.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<std::io::Error> for DtelError {
    fn from(err: std::io::Error) -> Self {
        DtelError::Encode(err.to_string())
    }
}

/// Result type for DTEL engine operations.
pub type Result<T> = std::result::Result<T, DtelError>;
