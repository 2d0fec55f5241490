//! MAVLink FTP
//!
//! File access over FILE_TRANSFER_PROTOCOL, split across three contexts:
//!
//! - **Inbound handler** (any link): decodes the payload and queues the
//!   request with [`FtpService::submit`]. A full queue drops its oldest
//!   request; the peer retransmits.
//! - **[`FtpWorker`]** (background): executes requests against a
//!   [`FileSystem`], owns the single open session, runs burst reads and CRC
//!   scans in bounded steps and queues replies per channel.
//! - **Link tick**: drains its channel's replies with
//!   [`FtpService::take_reply_for`], subject to its bandwidth gate.

pub mod fs;
pub mod protocol;
mod worker;

pub use fs::{map_io_error, DirEntry, EntryKind, FileSystem, OpenMode, StdFileSystem};
pub use protocol::{FtpError, FtpOpcode, FtpPacket, FTP_MAX_DATA, FTP_PAYLOAD_LEN};
pub use worker::FtpWorker;

use heapless::Deque;

use crate::core::traits::{EmbassyState, SharedState};
use crate::log_warn;

/// Pending request capacity
pub const FTP_REQUEST_QUEUE_LEN: usize = 5;

/// Reply capacity per channel
pub const FTP_REPLY_QUEUE_LEN: usize = 8;

/// Channels the FTP engine can answer on
pub const MAX_FTP_CHANNELS: usize = 8;

/// Replies a link drains per tick at most
pub const FTP_REPLIES_PER_TICK: usize = 4;

/// Idle time after which an open session is closed
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 3000;

/// FTP counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FtpStats {
    pub requests_queued: u32,
    /// Oldest requests evicted because the queue was full
    pub requests_dropped: u32,
    pub replies_queued: u32,
    pub sessions_opened: u32,
    pub session_timeouts: u32,
    /// Duplicate requests answered from the last reply
    pub retransmits: u32,
}

#[derive(Default)]
struct FtpQueues {
    requests: Deque<FtpPacket, FTP_REQUEST_QUEUE_LEN>,
    stats: FtpStats,
}

/// Request and reply queues shared by links and the worker
pub struct FtpService {
    queues: EmbassyState<FtpQueues>,
    replies: [EmbassyState<Deque<FtpPacket, FTP_REPLY_QUEUE_LEN>>; MAX_FTP_CHANNELS],
}

impl FtpService {
    pub fn new() -> Self {
        Self {
            queues: EmbassyState::new(FtpQueues::default()),
            replies: core::array::from_fn(|_| EmbassyState::new(Deque::new())),
        }
    }

    /// Queue an inbound request, dropping the oldest one if the queue is full.
    ///
    /// # Returns
    ///
    /// `false` if the request was refused (channel out of range).
    pub fn submit(&self, request: FtpPacket) -> bool {
        if usize::from(request.channel) >= MAX_FTP_CHANNELS {
            log_warn!("FTP request on unsupported channel {}", request.channel);
            return false;
        }
        let dropped = self.queues.with_mut(|q| {
            let dropped = if q.requests.is_full() {
                q.requests.pop_front();
                q.stats.requests_dropped = q.stats.requests_dropped.saturating_add(1);
                true
            } else {
                false
            };
            // a slot was freed above if needed
            let _ = q.requests.push_back(request);
            q.stats.requests_queued = q.stats.requests_queued.saturating_add(1);
            dropped
        });
        if dropped {
            log_warn!("FTP request queue full, dropped oldest request");
        }
        true
    }

    pub fn pending_requests(&self) -> usize {
        self.queues.with(|q| q.requests.len())
    }

    /// Free reply slots for `channel`
    pub fn reply_space(&self, channel: u8) -> usize {
        self.replies
            .get(usize::from(channel))
            .map_or(0, |r| r.with(|q| FTP_REPLY_QUEUE_LEN - q.len()))
    }

    pub fn pending_replies(&self, channel: u8) -> usize {
        self.replies
            .get(usize::from(channel))
            .map_or(0, |r| r.with(|q| q.len()))
    }

    /// Pop the head reply for `channel` if `accept` agrees
    pub fn take_reply_for<F>(&self, channel: u8, accept: F) -> Option<FtpPacket>
    where
        F: FnOnce(&FtpPacket) -> bool,
    {
        self.replies.get(usize::from(channel))?.with_mut(|q| {
            if accept(q.front()?) {
                q.pop_front()
            } else {
                None
            }
        })
    }

    pub fn stats(&self) -> FtpStats {
        self.queues.with(|q| q.stats)
    }

    /// Pop the next request whose channel has room for a reply
    pub(crate) fn next_request(&self) -> Option<FtpPacket> {
        self.queues.with_mut(|q| {
            let channel = q.requests.front()?.channel;
            if self.reply_space(channel) == 0 {
                return None;
            }
            q.requests.pop_front()
        })
    }

    /// Drop queued reads, writes and burst reads for `session`
    pub(crate) fn purge_session(&self, session: u8) -> usize {
        self.queues.with_mut(|q| {
            let mut kept = Deque::new();
            let mut purged = 0;
            while let Some(request) = q.requests.pop_front() {
                let stale = request.session == session
                    && matches!(
                        request.opcode,
                        FtpOpcode::ReadFile | FtpOpcode::WriteFile | FtpOpcode::BurstReadFile
                    );
                if stale {
                    purged += 1;
                } else {
                    let _ = kept.push_back(request);
                }
            }
            q.requests = kept;
            purged
        })
    }

    pub(crate) fn push_reply(&self, reply: FtpPacket) -> bool {
        let Some(queue) = self.replies.get(usize::from(reply.channel)) else {
            return false;
        };
        let queued = queue.with_mut(|q| q.push_back(reply).is_ok());
        if queued {
            self.update_stats(|s| s.replies_queued = s.replies_queued.saturating_add(1));
        } else {
            log_warn!("FTP reply queue full, reply dropped");
        }
        queued
    }

    pub(crate) fn update_stats<F: FnOnce(&mut FtpStats)>(&self, f: F) {
        self.queues.with_mut(|q| f(&mut q.stats));
    }
}

impl Default for FtpService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(channel: u8, session: u8, opcode: FtpOpcode) -> FtpPacket {
        let mut packet = FtpPacket::new(channel, 255, 190);
        packet.session = session;
        packet.opcode = opcode;
        packet
    }

    #[test]
    fn test_full_request_queue_evicts_oldest() {
        let service = FtpService::new();
        for session in 0..FTP_REQUEST_QUEUE_LEN as u8 {
            assert!(service.submit(request(0, session, FtpOpcode::ReadFile)));
        }
        assert!(service.submit(request(0, 5, FtpOpcode::ReadFile)));
        assert_eq!(service.stats().requests_dropped, 1);
        assert_eq!(service.pending_requests(), FTP_REQUEST_QUEUE_LEN);

        let sessions: Vec<u8> = core::iter::from_fn(|| service.next_request())
            .map(|r| r.session)
            .collect();
        assert_eq!(sessions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_out_of_range_channel_rejected() {
        let service = FtpService::new();
        assert!(!service.submit(request(MAX_FTP_CHANNELS as u8, 0, FtpOpcode::None)));
        assert_eq!(service.reply_space(MAX_FTP_CHANNELS as u8), 0);
    }

    #[test]
    fn test_purge_session_keeps_other_requests() {
        let service = FtpService::new();
        service.submit(request(0, 1, FtpOpcode::ReadFile));
        service.submit(request(0, 2, FtpOpcode::ReadFile));
        service.submit(request(0, 1, FtpOpcode::ListDirectory));
        service.submit(request(0, 1, FtpOpcode::BurstReadFile));

        assert_eq!(service.purge_session(1), 2);
        assert_eq!(service.pending_requests(), 2);
        assert_eq!(service.next_request().unwrap().session, 2);
        assert_eq!(
            service.next_request().unwrap().opcode,
            FtpOpcode::ListDirectory
        );
    }

    #[test]
    fn test_next_request_waits_for_reply_space() {
        let service = FtpService::new();
        for _ in 0..FTP_REPLY_QUEUE_LEN {
            assert!(service.push_reply(request(1, 0, FtpOpcode::Ack)));
        }
        assert!(!service.push_reply(request(1, 0, FtpOpcode::Ack)));
        service.submit(request(1, 0, FtpOpcode::None));
        assert!(service.next_request().is_none());

        assert!(service.take_reply_for(1, |_| true).is_some());
        assert!(service.next_request().is_some());
    }

    #[test]
    fn test_replies_are_per_channel() {
        let service = FtpService::new();
        service.push_reply(request(0, 0, FtpOpcode::Ack));
        assert!(service.take_reply_for(1, |_| true).is_none());
        assert!(service.take_reply_for(0, |_| false).is_none());
        assert_eq!(service.pending_replies(0), 1);
        assert!(service.take_reply_for(0, |_| true).is_some());
    }
}
