use mavlink::common::{
    GpsFixType, MavMessage, MavModeFlag, MavState, MavSysStatusSensor, MavType, ATTITUDE_DATA,
    GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA, SYSTEM_TIME_DATA, SYS_STATUS_DATA,
    VFR_HUD_DATA,
};

use super::VehicleCapabilities;
use crate::communication::mavlink::message::ApMessage;
use crate::communication::mavlink::streams::{Stream, StreamEntry};
use crate::core::traits::{EmbassyState, SharedState};

/// Rover state the telemetry builders read from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoverTelemetry {
    pub armed: bool,
    pub custom_mode: u32,
    pub uptime_us: u64,
    /// Wall-clock time, 0 until a time source is available
    pub unix_time_us: u64,
    /// CPU load (0-100%)
    pub cpu_load: f32,
    /// Battery voltage (V)
    pub battery_voltage: f32,
    /// Battery current (A)
    pub battery_current: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
    pub fix_type: GpsFixType,
    pub satellites_visible: u8,
    /// Latitude (degrees * 1e7)
    pub lat: i32,
    /// Longitude (degrees * 1e7)
    pub lon: i32,
    /// Altitude MSL (mm)
    pub alt_mm: i32,
    /// Altitude above home (mm)
    pub relative_alt_mm: i32,
    /// Ground speed (m/s)
    pub ground_speed: f32,
    /// Course over ground (degrees)
    pub course_deg: f32,
    /// Throttle output (0-100%)
    pub throttle_pct: u16,
}

impl Default for RoverTelemetry {
    fn default() -> Self {
        Self {
            armed: false,
            custom_mode: 0,
            uptime_us: 0,
            unix_time_us: 0,
            cpu_load: 0.0,
            battery_voltage: 0.0,
            battery_current: 0.0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
            fix_type: GpsFixType::GPS_FIX_TYPE_NO_FIX,
            satellites_visible: 0,
            lat: 0,
            lon: 0,
            alt_mm: 0,
            relative_alt_mm: 0,
            ground_speed: 0.0,
            course_deg: 0.0,
            throttle_pct: 0,
        }
    }
}

const ROVER_STREAMS: &[StreamEntry] = &[
    StreamEntry {
        stream: Stream::RawSensors,
        messages: &[
            ApMessage::RawImu,
            ApMessage::ScaledImu2,
            ApMessage::ScaledPressure,
            ApMessage::ScaledPressure2,
        ],
    },
    StreamEntry {
        stream: Stream::ExtendedStatus,
        messages: &[
            ApMessage::SysStatus,
            ApMessage::PowerStatus,
            ApMessage::MissionCurrent,
            ApMessage::GpsRawInt,
            ApMessage::Gps2Raw,
            ApMessage::NavControllerOutput,
            ApMessage::PositionTargetGlobalInt,
        ],
    },
    StreamEntry {
        stream: Stream::Position,
        messages: &[ApMessage::GlobalPositionInt, ApMessage::LocalPositionNed],
    },
    StreamEntry {
        stream: Stream::RcChannels,
        messages: &[
            ApMessage::ServoOutputRaw,
            ApMessage::RcChannels,
            ApMessage::RcChannelsRaw,
        ],
    },
    StreamEntry {
        stream: Stream::Extra1,
        messages: &[ApMessage::Attitude],
    },
    StreamEntry {
        stream: Stream::Extra2,
        messages: &[ApMessage::VfrHud],
    },
    StreamEntry {
        stream: Stream::Extra3,
        messages: &[
            ApMessage::SystemTime,
            ApMessage::BatteryStatus,
            ApMessage::Vibration,
            ApMessage::DistanceSensor,
            ApMessage::ExtendedSysState,
        ],
    },
    StreamEntry {
        stream: Stream::Params,
        messages: &[ApMessage::NextParam],
    },
];

/// Ground rover telemetry source.
///
/// The control loop writes `RoverTelemetry` through [`GroundRover::update`];
/// links read it when they build messages.
pub struct GroundRover {
    state: EmbassyState<RoverTelemetry>,
}

impl GroundRover {
    pub fn new() -> Self {
        Self {
            state: EmbassyState::new(RoverTelemetry::default()),
        }
    }

    /// Mutate the telemetry snapshot
    pub fn update<F: FnOnce(&mut RoverTelemetry)>(&self, f: F) {
        self.state.with_mut(f);
    }

    pub fn snapshot(&self) -> RoverTelemetry {
        self.state.with(|s| *s)
    }

    fn build_heartbeat(&self, state: &RoverTelemetry) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if state.armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }

        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: state.custom_mode,
            mavtype: self.mav_type(),
            autopilot: self.autopilot_type(),
            base_mode,
            system_status: if state.armed {
                MavState::MAV_STATE_ACTIVE
            } else {
                MavState::MAV_STATE_STANDBY
            },
            mavlink_version: 3,
        })
    }

    fn build_sys_status(&self, state: &RoverTelemetry) -> MavMessage {
        MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            onboard_control_sensors_present: MavSysStatusSensor::empty(),
            onboard_control_sensors_enabled: MavSysStatusSensor::empty(),
            onboard_control_sensors_health: MavSysStatusSensor::empty(),
            load: (state.cpu_load * 10.0) as u16, // 0.1% units
            voltage_battery: (state.battery_voltage * 1000.0) as u16,
            current_battery: (state.battery_current * 100.0) as i16, // 10mA units
            battery_remaining: -1,
            drop_rate_comm: 0,
            errors_comm: 0,
            errors_count1: 0,
            errors_count2: 0,
            errors_count3: 0,
            errors_count4: 0,
            ..Default::default()
        })
    }

    fn build_gps_raw(&self, state: &RoverTelemetry) -> MavMessage {
        MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
            time_usec: state.uptime_us,
            lat: state.lat,
            lon: state.lon,
            alt: state.alt_mm,
            eph: u16::MAX,
            epv: u16::MAX,
            vel: (state.ground_speed * 100.0) as u16,
            cog: (state.course_deg * 100.0) as u16,
            fix_type: state.fix_type,
            satellites_visible: state.satellites_visible,
            ..Default::default()
        })
    }

    fn build_global_position(&self, state: &RoverTelemetry) -> MavMessage {
        let heading = state.course_deg.to_radians();
        let speed_cms = state.ground_speed * 100.0;
        MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: (state.uptime_us / 1000) as u32,
            lat: state.lat,
            lon: state.lon,
            alt: state.alt_mm,
            relative_alt: state.relative_alt_mm,
            vx: (speed_cms * heading.cos()) as i16,
            vy: (speed_cms * heading.sin()) as i16,
            vz: 0,
            hdg: (state.yaw.to_degrees().rem_euclid(360.0) * 100.0) as u16,
        })
    }
}

impl Default for GroundRover {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleCapabilities for GroundRover {
    fn mav_type(&self) -> MavType {
        MavType::MAV_TYPE_GROUND_ROVER
    }

    fn name(&self) -> &'static str {
        "Rover"
    }

    fn stream_entries(&self) -> &'static [StreamEntry] {
        ROVER_STREAMS
    }

    fn build_message(&self, kind: ApMessage) -> Option<MavMessage> {
        let state = self.snapshot();
        match kind {
            ApMessage::Heartbeat => Some(self.build_heartbeat(&state)),
            ApMessage::SysStatus => Some(self.build_sys_status(&state)),
            ApMessage::SystemTime => Some(MavMessage::SYSTEM_TIME(SYSTEM_TIME_DATA {
                time_unix_usec: state.unix_time_us,
                time_boot_ms: (state.uptime_us / 1000) as u32,
            })),
            ApMessage::GpsRawInt => Some(self.build_gps_raw(&state)),
            ApMessage::Attitude => Some(MavMessage::ATTITUDE(ATTITUDE_DATA {
                time_boot_ms: (state.uptime_us / 1000) as u32,
                roll: state.roll,
                pitch: state.pitch,
                yaw: state.yaw,
                rollspeed: state.rollspeed,
                pitchspeed: state.pitchspeed,
                yawspeed: state.yawspeed,
            })),
            ApMessage::GlobalPositionInt => Some(self.build_global_position(&state)),
            ApMessage::VfrHud => Some(MavMessage::VFR_HUD(VFR_HUD_DATA {
                airspeed: state.ground_speed,
                groundspeed: state.ground_speed,
                alt: state.alt_mm as f32 / 1000.0,
                climb: 0.0,
                heading: state.yaw.to_degrees().rem_euclid(360.0) as i16,
                throttle: state.throttle_pct,
            })),
            // No source on this vehicle yet
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_reflects_arming() {
        let rover = GroundRover::new();
        let Some(MavMessage::HEARTBEAT(data)) = rover.build_message(ApMessage::Heartbeat) else {
            panic!("Expected HEARTBEAT message");
        };
        assert_eq!(data.mavtype, MavType::MAV_TYPE_GROUND_ROVER);
        assert!(!data
            .base_mode
            .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED));

        rover.update(|t| t.armed = true);
        let Some(MavMessage::HEARTBEAT(data)) = rover.build_message(ApMessage::Heartbeat) else {
            panic!("Expected HEARTBEAT message");
        };
        assert!(data
            .base_mode
            .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED));
        assert_eq!(data.system_status, MavState::MAV_STATE_ACTIVE);
    }

    #[test]
    fn test_sys_status_units() {
        let rover = GroundRover::new();
        rover.update(|t| {
            t.battery_voltage = 12.6;
            t.battery_current = 2.5;
            t.cpu_load = 37.5;
        });
        let Some(MavMessage::SYS_STATUS(data)) = rover.build_message(ApMessage::SysStatus) else {
            panic!("Expected SYS_STATUS message");
        };
        assert_eq!(data.voltage_battery, 12600);
        assert_eq!(data.current_battery, 250);
        assert_eq!(data.load, 375);
    }

    #[test]
    fn test_attitude_time_boot() {
        let rover = GroundRover::new();
        rover.update(|t| {
            t.uptime_us = 5_000_000;
            t.roll = 0.1;
        });
        let Some(MavMessage::ATTITUDE(data)) = rover.build_message(ApMessage::Attitude) else {
            panic!("Expected ATTITUDE message");
        };
        assert_eq!(data.time_boot_ms, 5000);
        assert_eq!(data.roll, 0.1);
    }

    #[test]
    fn test_unsupported_kinds_build_nothing() {
        let rover = GroundRover::new();
        assert!(rover.build_message(ApMessage::Vibration).is_none());
        assert!(rover.build_message(ApMessage::NextParam).is_none());
    }

    #[test]
    fn test_stream_table_lists_each_kind_once() {
        let rover = GroundRover::new();
        for kind in ApMessage::ALL {
            let hits = rover
                .stream_entries()
                .iter()
                .filter(|e| e.messages.contains(&kind))
                .count();
            assert!(hits <= 1, "{kind} listed in {hits} streams");
        }
    }
}
