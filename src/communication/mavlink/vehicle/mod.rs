//! Vehicle capability interface
//!
//! The link layer does not know how to fill any telemetry message. The
//! vehicle supplies its stream table (which kinds belong to which stream)
//! and builds message payloads on demand from its own state.

mod ground_rover;

pub use ground_rover::{GroundRover, RoverTelemetry};

use mavlink::common::{MavAutopilot, MavMessage, MavType};

use super::message::ApMessage;
use super::streams::StreamEntry;

/// Capabilities a vehicle exposes to its GCS links
pub trait VehicleCapabilities: Send + Sync {
    fn mav_type(&self) -> MavType;

    fn autopilot_type(&self) -> MavAutopilot {
        MavAutopilot::MAV_AUTOPILOT_GENERIC
    }

    fn name(&self) -> &'static str;

    /// Stream membership for this vehicle
    fn stream_entries(&self) -> &'static [StreamEntry];

    /// Build the payload for `kind` from current vehicle state.
    ///
    /// Returns `None` when the vehicle has nothing to report for `kind`
    /// (no sensor, no data yet). The scheduler treats that as sent.
    fn build_message(&self, kind: ApMessage) -> Option<MavMessage>;
}
