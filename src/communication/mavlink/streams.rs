//! Telemetry stream groups and their rates
//!
//! A stream groups message kinds that share one configured rate. The vehicle
//! supplies which kinds belong to which stream (`StreamEntry`); the link owns
//! the per-stream rates (`StreamRateTable`) and expands them into
//! per-message intervals for the deferred scheduler.

use super::message::ApMessage;

/// Longest interval a stream rate can produce
pub const MAX_STREAM_INTERVAL_MS: u16 = 60_000;

/// Telemetry stream groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Stream {
    RawSensors = 0,
    ExtendedStatus,
    RcChannels,
    RawController,
    Position,
    Extra1,
    Extra2,
    Extra3,
    Params,
    Adsb,
}

impl Stream {
    pub const COUNT: usize = 10;

    pub const ALL: [Stream; Self::COUNT] = [
        Stream::RawSensors,
        Stream::ExtendedStatus,
        Stream::RcChannels,
        Stream::RawController,
        Stream::Position,
        Stream::Extra1,
        Stream::Extra2,
        Stream::Extra3,
        Stream::Params,
        Stream::Adsb,
    ];

    /// Streams addressed by a `MAV_DATA_STREAM_*` id.
    ///
    /// `MAV_DATA_STREAM_ALL` (0) covers every stream except `Params`, so a
    /// blanket rate change never throttles parameter streaming.
    pub fn from_data_stream_id(id: u8) -> &'static [Stream] {
        match id {
            0 => &[
                Stream::RawSensors,
                Stream::ExtendedStatus,
                Stream::RcChannels,
                Stream::RawController,
                Stream::Position,
                Stream::Extra1,
                Stream::Extra2,
                Stream::Extra3,
                Stream::Adsb,
            ],
            1 => &[Stream::RawSensors],
            2 => &[Stream::ExtendedStatus],
            3 => &[Stream::RcChannels],
            4 => &[Stream::RawController],
            6 => &[Stream::Position],
            10 => &[Stream::Extra1],
            11 => &[Stream::Extra2],
            12 => &[Stream::Extra3],
            _ => &[],
        }
    }
}

/// Vehicle-supplied stream membership
#[derive(Debug, Clone, Copy)]
pub struct StreamEntry {
    pub stream: Stream,
    pub messages: &'static [ApMessage],
}

/// Interval for a stream rate in Hz.
///
/// Returns `None` for rate 0 (stream disabled).
pub fn interval_for_rate(rate_hz: u16) -> Option<u16> {
    if rate_hz == 0 {
        return None;
    }
    Some((1000 / rate_hz).min(MAX_STREAM_INTERVAL_MS))
}

/// Per-link stream rates in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamRateTable {
    rates: [u16; Stream::COUNT],
}

impl Default for StreamRateTable {
    /// Defaults follow the stock SR_* parameter values
    fn default() -> Self {
        let mut table = Self::disabled();
        table.set(Stream::RawSensors, 5);
        table.set(Stream::ExtendedStatus, 1);
        table.set(Stream::RcChannels, 5);
        table.set(Stream::Position, 5);
        table.set(Stream::Extra1, 10);
        table.set(Stream::Extra2, 10);
        table.set(Stream::Extra3, 1);
        table.set(Stream::Params, 10);
        table
    }
}

impl StreamRateTable {
    /// Every stream at rate 0
    pub const fn disabled() -> Self {
        Self {
            rates: [0; Stream::COUNT],
        }
    }

    pub fn rate(&self, stream: Stream) -> u16 {
        self.rates[stream as usize]
    }

    pub fn set(&mut self, stream: Stream, rate_hz: u16) {
        self.rates[stream as usize] = rate_hz;
    }

    pub fn interval_ms(&self, stream: Stream) -> Option<u16> {
        interval_for_rate(self.rate(stream))
    }

    /// Interval the stream table gives `kind`, from the first stream that
    /// lists it.
    ///
    /// Returns `None` when no stream lists `kind` or that stream is disabled.
    pub fn interval_for_message(&self, entries: &[StreamEntry], kind: ApMessage) -> Option<u16> {
        entries
            .iter()
            .find(|entry| entry.messages.contains(&kind))
            .and_then(|entry| self.interval_ms(entry.stream))
    }
}
