//! GCS configuration
//!
//! `GcsConfig` is process-wide and fixed at startup. `LinkConfig` is given
//! per channel when the link is added. Queue depths are compile-time
//! capacities and do not appear here.

use crate::communication::mavlink::bandwidth::ProtocolVersion;
use crate::communication::mavlink::handlers::ftp::DEFAULT_SESSION_TIMEOUT_MS;
use crate::communication::mavlink::intervals::DefaultIntervals;
use crate::communication::mavlink::streams::StreamRateTable;

/// Links a manager accepts by default
pub const DEFAULT_MAX_LINKS: usize = 4;

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GcsConfig {
    /// Our MAVLink system id
    pub system_id: u8,
    /// Our MAVLink component id
    pub component_id: u8,
    pub max_links: usize,
    /// Rate the link tick runs at; bounds the shortest message interval
    pub loop_rate_hz: u16,
    /// Time a link tick may spend on bucket sends (µs)
    pub tick_budget_us: u32,
    /// Idle time after which the FTP session is closed
    pub ftp_session_timeout_ms: u64,
    /// Accept PARAM_SET writes
    pub allow_param_set: bool,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 1,
            max_links: DEFAULT_MAX_LINKS,
            loop_rate_hz: 50,
            tick_budget_us: 1000,
            ftp_session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            allow_param_set: true,
        }
    }
}

/// Per-link option flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkOptions {
    /// Ignore REQUEST_DATA_STREAM from peers
    pub no_stream_override: bool,
}

/// Settings for one channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    pub stream_rates: StreamRateTable,
    /// Protocol used for bandwidth accounting while the transport reports none
    pub protocol: ProtocolVersion,
    pub options: LinkOptions,
    /// Per-message overrides applied after the stream rates
    pub default_intervals: DefaultIntervals,
}

impl LinkConfig {
    pub fn with_stream_rates(mut self, stream_rates: StreamRateTable) -> Self {
        self.stream_rates = stream_rates;
        self
    }

    pub fn with_default_intervals(mut self, default_intervals: DefaultIntervals) -> Self {
        self.default_intervals = default_intervals;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_options(mut self, options: LinkOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::streams::Stream;

    #[test]
    fn test_gcs_config_defaults() {
        let config = GcsConfig::default();
        assert_eq!(config.system_id, 1);
        assert_eq!(config.loop_rate_hz, 50);
        assert_eq!(config.ftp_session_timeout_ms, 3000);
        assert!(config.allow_param_set);
    }

    #[test]
    fn test_link_config_builders() {
        let mut rates = StreamRateTable::disabled();
        rates.set(Stream::Extra1, 4);
        let config = LinkConfig::default()
            .with_stream_rates(rates)
            .with_options(LinkOptions {
                no_stream_override: true,
            });
        assert_eq!(config.stream_rates.rate(Stream::Extra1), 4);
        assert!(config.options.no_stream_override);
        assert_eq!(config.protocol, ProtocolVersion::V2);
        assert_eq!(
            LinkConfig::default().with_protocol(ProtocolVersion::V1).protocol,
            ProtocolVersion::V1
        );
        assert!(config.default_intervals.is_empty());
    }
}
