//! Message kinds the link can schedule
//!
//! `ApMessage` is the closed set of outbound message kinds the deferred
//! scheduler knows about. Each kind maps to exactly one MAVLink message id
//! and carries the worst-case payload length used by the bandwidth gate.
//! `NextParam` is internal: it drives parameter-list streaming and has no
//! inbound MAVLink id.

use core::fmt;

/// Outbound message kinds known to the scheduler.
///
/// Discriminants are dense so a kind can index a bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ApMessage {
    Heartbeat = 0,
    NextParam,
    HighLatency2,
    SysStatus,
    PowerStatus,
    SystemTime,
    GpsRawInt,
    Gps2Raw,
    RawImu,
    ScaledImu2,
    ScaledPressure,
    ScaledPressure2,
    Attitude,
    AttitudeQuaternion,
    GlobalPositionInt,
    LocalPositionNed,
    GpsGlobalOrigin,
    HomePosition,
    ServoOutputRaw,
    RcChannels,
    RcChannelsRaw,
    MissionCurrent,
    MissionItemReached,
    NavControllerOutput,
    PositionTargetGlobalInt,
    VfrHud,
    BatteryStatus,
    ExtendedSysState,
    Vibration,
    DistanceSensor,
    EstimatorStatus,
}

/// MAVLink PARAM_VALUE payload length
pub const PARAM_VALUE_LEN: usize = 25;
/// MAVLink MESSAGE_INTERVAL payload length
pub const MESSAGE_INTERVAL_LEN: usize = 6;
/// MAVLink FILE_TRANSFER_PROTOCOL payload length
pub const FILE_TRANSFER_PROTOCOL_LEN: usize = 254;

impl ApMessage {
    /// Number of message kinds
    pub const COUNT: usize = 31;

    /// Every kind, in discriminant order
    pub const ALL: [ApMessage; Self::COUNT] = [
        ApMessage::Heartbeat,
        ApMessage::NextParam,
        ApMessage::HighLatency2,
        ApMessage::SysStatus,
        ApMessage::PowerStatus,
        ApMessage::SystemTime,
        ApMessage::GpsRawInt,
        ApMessage::Gps2Raw,
        ApMessage::RawImu,
        ApMessage::ScaledImu2,
        ApMessage::ScaledPressure,
        ApMessage::ScaledPressure2,
        ApMessage::Attitude,
        ApMessage::AttitudeQuaternion,
        ApMessage::GlobalPositionInt,
        ApMessage::LocalPositionNed,
        ApMessage::GpsGlobalOrigin,
        ApMessage::HomePosition,
        ApMessage::ServoOutputRaw,
        ApMessage::RcChannels,
        ApMessage::RcChannelsRaw,
        ApMessage::MissionCurrent,
        ApMessage::MissionItemReached,
        ApMessage::NavControllerOutput,
        ApMessage::PositionTargetGlobalInt,
        ApMessage::VfrHud,
        ApMessage::BatteryStatus,
        ApMessage::ExtendedSysState,
        ApMessage::Vibration,
        ApMessage::DistanceSensor,
        ApMessage::EstimatorStatus,
    ];

    /// Dense index of this kind (0..COUNT)
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Kind for a dense index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// MAVLink message id this kind is sent as
    pub const fn mavlink_id(self) -> u32 {
        match self {
            ApMessage::Heartbeat => 0,
            ApMessage::NextParam => 22,
            ApMessage::HighLatency2 => 235,
            ApMessage::SysStatus => 1,
            ApMessage::PowerStatus => 125,
            ApMessage::SystemTime => 2,
            ApMessage::GpsRawInt => 24,
            ApMessage::Gps2Raw => 124,
            ApMessage::RawImu => 27,
            ApMessage::ScaledImu2 => 116,
            ApMessage::ScaledPressure => 29,
            ApMessage::ScaledPressure2 => 137,
            ApMessage::Attitude => 30,
            ApMessage::AttitudeQuaternion => 31,
            ApMessage::GlobalPositionInt => 33,
            ApMessage::LocalPositionNed => 32,
            ApMessage::GpsGlobalOrigin => 49,
            ApMessage::HomePosition => 242,
            ApMessage::ServoOutputRaw => 36,
            ApMessage::RcChannels => 65,
            ApMessage::RcChannelsRaw => 35,
            ApMessage::MissionCurrent => 42,
            ApMessage::MissionItemReached => 46,
            ApMessage::NavControllerOutput => 62,
            ApMessage::PositionTargetGlobalInt => 87,
            ApMessage::VfrHud => 74,
            ApMessage::BatteryStatus => 147,
            ApMessage::ExtendedSysState => 245,
            ApMessage::Vibration => 241,
            ApMessage::DistanceSensor => 132,
            ApMessage::EstimatorStatus => 230,
        }
    }

    /// Maximum MAVLink2 payload length, extensions included
    pub const fn max_payload_len(self) -> usize {
        match self {
            ApMessage::Heartbeat => 9,
            ApMessage::NextParam => PARAM_VALUE_LEN,
            ApMessage::HighLatency2 => 42,
            ApMessage::SysStatus => 43,
            ApMessage::PowerStatus => 6,
            ApMessage::SystemTime => 12,
            ApMessage::GpsRawInt => 52,
            ApMessage::Gps2Raw => 57,
            ApMessage::RawImu => 29,
            ApMessage::ScaledImu2 => 24,
            ApMessage::ScaledPressure => 16,
            ApMessage::ScaledPressure2 => 16,
            ApMessage::Attitude => 28,
            ApMessage::AttitudeQuaternion => 48,
            ApMessage::GlobalPositionInt => 28,
            ApMessage::LocalPositionNed => 28,
            ApMessage::GpsGlobalOrigin => 20,
            ApMessage::HomePosition => 60,
            ApMessage::ServoOutputRaw => 37,
            ApMessage::RcChannels => 42,
            ApMessage::RcChannelsRaw => 22,
            ApMessage::MissionCurrent => 18,
            ApMessage::MissionItemReached => 2,
            ApMessage::NavControllerOutput => 26,
            ApMessage::PositionTargetGlobalInt => 51,
            ApMessage::VfrHud => 20,
            ApMessage::BatteryStatus => 54,
            ApMessage::ExtendedSysState => 2,
            ApMessage::Vibration => 32,
            ApMessage::DistanceSensor => 39,
            ApMessage::EstimatorStatus => 42,
        }
    }

    /// Map an inbound MAVLink message id to a schedulable kind.
    ///
    /// PARAM_VALUE is not schedulable by id; parameter streaming owns it.
    pub fn from_mavlink_id(id: u32) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| *kind != ApMessage::NextParam)
            .find(|kind| kind.mavlink_id() == id)
    }

    /// MAVLink message name, for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            ApMessage::Heartbeat => "HEARTBEAT",
            ApMessage::NextParam => "PARAM_VALUE",
            ApMessage::HighLatency2 => "HIGH_LATENCY2",
            ApMessage::SysStatus => "SYS_STATUS",
            ApMessage::PowerStatus => "POWER_STATUS",
            ApMessage::SystemTime => "SYSTEM_TIME",
            ApMessage::GpsRawInt => "GPS_RAW_INT",
            ApMessage::Gps2Raw => "GPS2_RAW",
            ApMessage::RawImu => "RAW_IMU",
            ApMessage::ScaledImu2 => "SCALED_IMU2",
            ApMessage::ScaledPressure => "SCALED_PRESSURE",
            ApMessage::ScaledPressure2 => "SCALED_PRESSURE2",
            ApMessage::Attitude => "ATTITUDE",
            ApMessage::AttitudeQuaternion => "ATTITUDE_QUATERNION",
            ApMessage::GlobalPositionInt => "GLOBAL_POSITION_INT",
            ApMessage::LocalPositionNed => "LOCAL_POSITION_NED",
            ApMessage::GpsGlobalOrigin => "GPS_GLOBAL_ORIGIN",
            ApMessage::HomePosition => "HOME_POSITION",
            ApMessage::ServoOutputRaw => "SERVO_OUTPUT_RAW",
            ApMessage::RcChannels => "RC_CHANNELS",
            ApMessage::RcChannelsRaw => "RC_CHANNELS_RAW",
            ApMessage::MissionCurrent => "MISSION_CURRENT",
            ApMessage::MissionItemReached => "MISSION_ITEM_REACHED",
            ApMessage::NavControllerOutput => "NAV_CONTROLLER_OUTPUT",
            ApMessage::PositionTargetGlobalInt => "POSITION_TARGET_GLOBAL_INT",
            ApMessage::VfrHud => "VFR_HUD",
            ApMessage::BatteryStatus => "BATTERY_STATUS",
            ApMessage::ExtendedSysState => "EXTENDED_SYS_STATE",
            ApMessage::Vibration => "VIBRATION",
            ApMessage::DistanceSensor => "DISTANCE_SENSOR",
            ApMessage::EstimatorStatus => "ESTIMATOR_STATUS",
        }
    }
}

impl fmt::Display for ApMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const WORDS: usize = ApMessage::COUNT.div_ceil(32);

/// Fixed-size set of message kinds.
///
/// Iteration is in ascending kind order, which is also the order bucket
/// members are attempted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSet {
    words: [u32; WORDS],
}

impl MessageSet {
    /// Creates an empty set
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Adds a kind; returns false if it was already present
    pub fn insert(&mut self, kind: ApMessage) -> bool {
        let (word, bit) = Self::slot(kind);
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Removes a kind; returns true if it was present
    pub fn remove(&mut self, kind: ApMessage) -> bool {
        let (word, bit) = Self::slot(kind);
        let was_set = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        was_set
    }

    pub fn contains(&self, kind: ApMessage) -> bool {
        let (word, bit) = Self::slot(kind);
        self.words[word] & bit != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }

    /// Lowest-ordered kind in the set
    pub fn first(&self) -> Option<ApMessage> {
        self.words.iter().enumerate().find_map(|(i, w)| {
            if *w == 0 {
                None
            } else {
                ApMessage::from_index(i * 32 + w.trailing_zeros() as usize)
            }
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ApMessage> + '_ {
        ApMessage::ALL
            .iter()
            .copied()
            .filter(move |kind| self.contains(*kind))
    }

    fn slot(kind: ApMessage) -> (usize, u32) {
        let index = kind.index();
        (index / 32, 1u32 << (index % 32))
    }
}

impl FromIterator<ApMessage> for MessageSet {
    fn from_iter<I: IntoIterator<Item = ApMessage>>(iter: I) -> Self {
        let mut set = MessageSet::new();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_dense_and_ordered() {
        for (i, kind) in ApMessage::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ApMessage::from_index(i), Some(*kind));
        }
        assert_eq!(ApMessage::from_index(ApMessage::COUNT), None);
    }

    #[test]
    fn test_mavlink_ids_are_unique() {
        for a in ApMessage::ALL {
            for b in ApMessage::ALL {
                if a != b {
                    assert_ne!(a.mavlink_id(), b.mavlink_id(), "{a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn test_from_mavlink_id() {
        assert_eq!(ApMessage::from_mavlink_id(0), Some(ApMessage::Heartbeat));
        assert_eq!(ApMessage::from_mavlink_id(30), Some(ApMessage::Attitude));
        assert_eq!(ApMessage::from_mavlink_id(74), Some(ApMessage::VfrHud));
        assert_eq!(ApMessage::from_mavlink_id(22), None);
        assert_eq!(ApMessage::from_mavlink_id(9999), None);
    }

    #[test]
    fn test_payload_lengths() {
        assert_eq!(ApMessage::Heartbeat.max_payload_len(), 9);
        assert_eq!(ApMessage::Attitude.max_payload_len(), 28);
        assert_eq!(ApMessage::NextParam.max_payload_len(), PARAM_VALUE_LEN);
    }

    #[test]
    fn test_message_set_insert_remove() {
        let mut set = MessageSet::new();
        assert!(set.is_empty());
        assert!(set.insert(ApMessage::VfrHud));
        assert!(!set.insert(ApMessage::VfrHud));
        assert!(set.insert(ApMessage::Heartbeat));
        assert_eq!(set.len(), 2);
        assert!(set.contains(ApMessage::VfrHud));

        assert!(set.remove(ApMessage::VfrHud));
        assert!(!set.remove(ApMessage::VfrHud));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_message_set_first_and_iter_order() {
        let set: MessageSet = [
            ApMessage::EstimatorStatus,
            ApMessage::Attitude,
            ApMessage::SysStatus,
        ]
        .into_iter()
        .collect();

        assert_eq!(set.first(), Some(ApMessage::SysStatus));
        let ordered: std::vec::Vec<_> = set.iter().collect();
        assert_eq!(
            ordered,
            vec![
                ApMessage::SysStatus,
                ApMessage::Attitude,
                ApMessage::EstimatorStatus
            ]
        );
    }

    #[test]
    fn test_message_set_last_kind_fits() {
        let mut set = MessageSet::new();
        set.insert(ApMessage::EstimatorStatus);
        assert_eq!(set.first(), Some(ApMessage::EstimatorStatus));
        set.clear();
        assert_eq!(set.first(), None);
    }
}
