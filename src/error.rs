//! Error types
//!
//! Rust-side failures only. Results the peer sees travel on the wire:
//! commands answer with `MavResult`, FTP answers with `FtpError` codes
//! inside NAK packets.

use crate::communication::mavlink::message::ApMessage;
use thiserror::Error;

/// Interval configuration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleError {
    /// The MAVLink id does not correspond to a schedulable message kind
    #[error("no schedulable message for MAVLink id {0}")]
    UnknownMessage(u32),
    /// Every deferred bucket is in use at other intervals
    #[error("all deferred buckets in use, cannot schedule {kind}")]
    BucketsFull { kind: ApMessage },
}

/// Failures loading a default-interval override file
#[derive(Debug, Error)]
pub enum IntervalFileError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: &'static str },
    #[error("too many interval overrides (line {line})")]
    TooManyEntries { line: usize },
    #[error("reading interval file: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a parameter store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamStoreError {
    #[error("parameter not found")]
    NotFound,
    #[error("parameter value out of range")]
    InvalidValue,
    #[error("parameter is read-only")]
    ReadOnly,
    #[error("parameter registry is full")]
    RegistryFull,
}

/// Manager-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GcsError {
    #[error("link limit of {max} reached")]
    TooManyLinks { max: usize },
    #[error("no link on channel {0}")]
    NoSuchLink(u8),
}
