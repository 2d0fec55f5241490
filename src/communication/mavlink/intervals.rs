//! Default message interval overrides
//!
//! Operators can override the stream-derived interval of individual message
//! kinds with a small text file, one `<mavlink-msg-id> <interval-ms>` pair per
//! line. `#` starts a comment; blank lines are ignored. A negative interval
//! disables the message.
//!
//! ```text
//! # ATTITUDE at 20 Hz, no SYSTEM_TIME
//! 30 50
//! 2 -1
//! ```

use std::path::Path;

use super::message::ApMessage;
use crate::error::IntervalFileError;
use crate::log_warn;

/// Maximum number of override lines
pub const MAX_INTERVAL_OVERRIDES: usize = 32;

/// Parsed interval overrides, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefaultIntervals {
    entries: heapless::Vec<(ApMessage, i32), MAX_INTERVAL_OVERRIDES>,
}

impl DefaultIntervals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse override text.
    ///
    /// Lines naming a MAVLink id with no schedulable kind are skipped with a
    /// warning so one stale line does not void the file.
    pub fn parse(text: &str) -> Result<Self, IntervalFileError> {
        let mut intervals = Self::new();

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let mut fields = content.split_whitespace();
            let id = fields
                .next()
                .ok_or(IntervalFileError::Parse {
                    line,
                    reason: "missing message id",
                })?
                .parse::<u32>()
                .map_err(|_| IntervalFileError::Parse {
                    line,
                    reason: "message id is not an unsigned integer",
                })?;
            let interval = fields
                .next()
                .ok_or(IntervalFileError::Parse {
                    line,
                    reason: "missing interval",
                })?
                .parse::<i32>()
                .map_err(|_| IntervalFileError::Parse {
                    line,
                    reason: "interval is not an integer",
                })?;
            if fields.next().is_some() {
                return Err(IntervalFileError::Parse {
                    line,
                    reason: "trailing fields",
                });
            }

            let Some(kind) = ApMessage::from_mavlink_id(id) else {
                log_warn!("Interval file line {}: unknown message id {}", line, id);
                continue;
            };
            intervals.set(kind, interval, line)?;
        }

        Ok(intervals)
    }

    /// Read and parse an override file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntervalFileError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Override for `kind`, if any
    pub fn interval_for(&self, kind: ApMessage) -> Option<i32> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, interval)| *interval)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApMessage, i32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn set(&mut self, kind: ApMessage, interval: i32, line: usize) -> Result<(), IntervalFileError> {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            entry.1 = interval;
            return Ok(());
        }
        self.entries
            .push((kind, interval))
            .map_err(|_| IntervalFileError::TooManyEntries { line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_entries_and_comments() {
        let text = "# header\n\n30 50\n  2   -1   # no SYSTEM_TIME\n74 200\n";
        let intervals = DefaultIntervals::parse(text).unwrap();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals.interval_for(ApMessage::Attitude), Some(50));
        assert_eq!(intervals.interval_for(ApMessage::SystemTime), Some(-1));
        assert_eq!(intervals.interval_for(ApMessage::VfrHud), Some(200));
        assert_eq!(intervals.interval_for(ApMessage::SysStatus), None);
    }

    #[test]
    fn test_later_line_wins() {
        let intervals = DefaultIntervals::parse("30 50\n30 100\n").unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals.interval_for(ApMessage::Attitude), Some(100));
    }

    #[test]
    fn test_unknown_id_skipped() {
        let intervals = DefaultIntervals::parse("65000 100\n30 50\n").unwrap();
        assert_eq!(intervals.len(), 1);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = DefaultIntervals::parse("30 50\nabc 10\n").unwrap_err();
        assert!(matches!(err, IntervalFileError::Parse { line: 2, .. }));

        let err = DefaultIntervals::parse("30\n").unwrap_err();
        assert!(matches!(
            err,
            IntervalFileError::Parse {
                line: 1,
                reason: "missing interval"
            }
        ));

        let err = DefaultIntervals::parse("30 50 7\n").unwrap_err();
        assert!(matches!(err, IntervalFileError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# overrides").unwrap();
        writeln!(file, "33 250").unwrap();
        let intervals = DefaultIntervals::load(file.path()).unwrap();
        assert_eq!(
            intervals.interval_for(ApMessage::GlobalPositionInt),
            Some(250)
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DefaultIntervals::load(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, IntervalFileError::Io(_)));
    }
}
