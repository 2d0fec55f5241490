//! pico_trail_gcs - MAVLink ground control link layer for pico_trail
//!
//! Schedules outbound telemetry per link under a bandwidth budget, and runs
//! parameter streaming and MAVLink FTP beside it without stalling the
//! real-time loop.

// Logging macros and shared-state/time traits
pub mod core;

// MAVLink link layer
pub mod communication;

// Parameter store interface and in-memory registry
pub mod parameters;

pub mod config;
pub mod error;
pub mod gcs;

pub use communication::mavlink::link::{GcsLink, LinkStats};
pub use communication::mavlink::message::ApMessage;
pub use communication::mavlink::vehicle::{GroundRover, VehicleCapabilities};
pub use config::{GcsConfig, LinkConfig, LinkOptions};
pub use crate::core::traits::{MockTime, StdTime, TimeSource};
pub use error::{GcsError, IntervalFileError, ParamStoreError, ScheduleError};
pub use gcs::{spawn_background_worker, BackgroundHandle, BackgroundWorker, Gcs, GcsShared};
