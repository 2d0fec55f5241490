//! Communication Protocols
//!
//! # Protocols
//!
//! - **MAVLink 2.0** (1.0 framing supported by the bandwidth gate)
//!   - Deferred telemetry scheduling per link
//!   - Parameter streaming (PARAM_* messages)
//!   - File transfer (FILE_TRANSFER_PROTOCOL)
//!
//! Transport drivers live outside this crate behind
//! [`mavlink::transport::LinkTransport`].

pub mod mavlink;
