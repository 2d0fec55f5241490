//! Bandwidth gate
//!
//! Every outbound send on a link is checked against the free transmit space
//! the transport reported at the start of the current tick. The snapshot is
//! decremented by each accepted packet, so the sum of packet sizes admitted
//! within one tick never exceeds what the transport offered.

/// Upper clamp on the transmit space a transport may report
pub const TXSPACE_CLAMP: usize = 8192;

/// MAVLink 1 header + checksum bytes
pub const MAVLINK1_OVERHEAD: usize = 8;

/// MAVLink 2 header + checksum bytes
pub const MAVLINK2_OVERHEAD: usize = 12;

/// MAVLink 2 signature trailer bytes
pub const SIGNATURE_LEN: usize = 13;

/// Wire protocol version spoken on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

/// Framing overhead of one packet
pub const fn packet_overhead(version: ProtocolVersion, signing: bool) -> usize {
    match version {
        ProtocolVersion::V1 => MAVLINK1_OVERHEAD,
        ProtocolVersion::V2 if signing => MAVLINK2_OVERHEAD + SIGNATURE_LEN,
        ProtocolVersion::V2 => MAVLINK2_OVERHEAD,
    }
}

/// Per-link transmit space accounting for one tick.
#[derive(Debug, Default)]
pub struct BandwidthGate {
    available: usize,
    overhead: usize,
    out_of_space: u32,
    locked: bool,
}

impl BandwidthGate {
    pub fn new() -> Self {
        Self {
            overhead: MAVLINK2_OVERHEAD,
            ..Self::default()
        }
    }

    /// Take the tick's snapshot of transport free space.
    ///
    /// # Arguments
    ///
    /// * `tx_space` - Free bytes the transport reports
    /// * `version` - Protocol version, selects framing overhead
    /// * `signing` - Whether outgoing packets carry a signature
    pub fn begin_tick(&mut self, tx_space: usize, version: ProtocolVersion, signing: bool) {
        self.overhead = packet_overhead(version, signing);
        self.available = if self.locked {
            0
        } else {
            tx_space.min(TXSPACE_CLAMP)
        };
    }

    /// Bytes still available this tick
    pub fn available(&self) -> usize {
        self.available
    }

    /// Wire size of a packet carrying `payload_len` bytes
    pub fn packet_size(&self, payload_len: usize) -> usize {
        self.overhead + payload_len
    }

    /// Check whether a packet with `payload_len` bytes fits.
    ///
    /// A failed check counts as one out-of-space event.
    pub fn fits(&mut self, payload_len: usize) -> bool {
        if self.available >= self.packet_size(payload_len) {
            true
        } else {
            self.out_of_space = self.out_of_space.saturating_add(1);
            false
        }
    }

    /// Account for a packet actually handed to the transport
    pub fn consume(&mut self, payload_len: usize) {
        self.available = self
            .available
            .saturating_sub(self.packet_size(payload_len));
    }

    /// Locked links report no space at all
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        if locked {
            self.available = 0;
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of sends refused for lack of space
    pub fn out_of_space_count(&self) -> u32 {
        self.out_of_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overhead_by_version() {
        assert_eq!(packet_overhead(ProtocolVersion::V1, false), 8);
        assert_eq!(packet_overhead(ProtocolVersion::V1, true), 8);
        assert_eq!(packet_overhead(ProtocolVersion::V2, false), 12);
        assert_eq!(packet_overhead(ProtocolVersion::V2, true), 25);
    }

    #[test]
    fn test_snapshot_is_clamped() {
        let mut gate = BandwidthGate::new();
        gate.begin_tick(1_000_000, ProtocolVersion::V2, false);
        assert_eq!(gate.available(), TXSPACE_CLAMP);
    }

    #[test]
    fn test_fits_exact_boundary() {
        let mut gate = BandwidthGate::new();
        // HEARTBEAT: 12 + 9 = 21
        gate.begin_tick(21, ProtocolVersion::V2, false);
        assert!(gate.fits(9));
        gate.begin_tick(20, ProtocolVersion::V2, false);
        assert!(!gate.fits(9));
        assert_eq!(gate.out_of_space_count(), 1);
    }

    #[test]
    fn test_consumption_never_exceeds_snapshot() {
        let mut gate = BandwidthGate::new();
        gate.begin_tick(100, ProtocolVersion::V2, false);

        let mut sent = 0;
        while gate.fits(28) {
            gate.consume(28);
            sent += 40;
        }
        assert_eq!(sent, 80);
        assert!(sent <= 100);
        assert_eq!(gate.available(), 20);
        assert_eq!(gate.out_of_space_count(), 1);
    }

    #[test]
    fn test_locked_link_reports_zero() {
        let mut gate = BandwidthGate::new();
        gate.set_locked(true);
        gate.begin_tick(4096, ProtocolVersion::V2, false);
        assert_eq!(gate.available(), 0);
        assert!(!gate.fits(0));

        gate.set_locked(false);
        gate.begin_tick(4096, ProtocolVersion::V2, false);
        assert_eq!(gate.available(), 4096);
    }
}
