//! MAVLink GCS link layer
//!
//! Decides, per connected peer, which telemetry messages go out and when,
//! within the link's free transmit space, and hosts parameter streaming and
//! MAVLink FTP on the same links.
//!
//! # Architecture
//!
//! - **Message / Streams**: message kinds and the stream groups they belong to
//! - **Scheduler**: per-link deferred buckets and special messages
//! - **Bandwidth**: per-tick transmit space accounting
//! - **Handlers**: parameter queue and FTP engine (queued, resolved off the tick)
//! - **Link**: one channel; inbound handling and the send tick
//! - **Vehicle**: capability interface supplying stream tables and payloads
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use pico_trail_gcs::{Gcs, GcsConfig, LinkConfig, GroundRover, StdTime};
//!
//! let mut gcs = Gcs::new(GcsConfig::default(), Arc::new(GroundRover::new()));
//! let channel = gcs.add_link(LinkConfig::default(), uart_transport)?;
//! let time = StdTime::new();
//! loop {
//!     // feed received messages through gcs.handle_message(channel, ...)
//!     gcs.update_send(&time);
//! }
//! ```

pub mod bandwidth; // Transmit space accounting
pub mod handlers; // Parameter and FTP sub-protocols
pub mod intervals; // Default interval override file
pub mod link; // Per-channel link
pub mod message; // Schedulable message kinds
pub mod scheduler; // Deferred message scheduler
pub mod streams; // Stream groups and rates
pub mod transport; // Transport abstraction
pub mod vehicle; // Vehicle capability interface
