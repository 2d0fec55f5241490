//! Deferred message scheduler
//!
//! Decides which outbound message kind a link should attempt next. It owns no
//! transport and builds no packets; the link asks it for the next candidate,
//! tries to send it, and reports success back.
//!
//! # Structure
//!
//! - **Specials**: HEARTBEAT, the parameter-streaming pseudo message and
//!   HIGH_LATENCY2. Each has its own interval and last-sent time, is checked
//!   every tick ahead of everything else, and is never placed in a bucket.
//! - **Buckets**: up to [`MAX_BUCKETS`] groups of message kinds sharing one
//!   interval. A kind lives in at most one bucket. Buckets are served most
//!   overdue first; a bucket stays in service until every member has been
//!   sent, so members skipped for bandwidth are retried before any other
//!   bucket is started.
//! - **Pushed**: one-shot requests to send a kind once at the next
//!   opportunity.
//!
//! # Rescheduling
//!
//! The effective bucket interval adds the link's stream slowdown, and while
//! a parameter dump is active it is multiplied by 4, capped at
//! [`MAX_RESCHEDULE_INTERVAL_MS`]. See [`Reschedule`].

use super::message::{ApMessage, MessageSet};
use crate::error::ScheduleError;
use crate::log_warn;

/// Number of deferred buckets per link
pub const MAX_BUCKETS: usize = 10;

/// Kinds that bypass the buckets, in evaluation order
pub const SPECIAL_MESSAGES: [ApMessage; 3] = [
    ApMessage::Heartbeat,
    ApMessage::NextParam,
    ApMessage::HighLatency2,
];

/// Upper bound of an effective (slowed-down) bucket interval
pub const MAX_RESCHEDULE_INTERVAL_MS: u32 = 60_000;

/// HEARTBEAT interval until configured otherwise
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u16 = 1000;

const PARAM_DUMP_SLOWDOWN_FACTOR: u32 = 4;

/// Link conditions that stretch bucket intervals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reschedule {
    /// Added to every bucket interval (radio back-pressure)
    pub stream_slowdown_ms: u16,
    /// A parameter list dump is in progress on this link
    pub param_dump_active: bool,
}

impl Reschedule {
    /// Effective interval for a bucket configured at `interval_ms`
    pub fn effective_interval(&self, interval_ms: u16) -> u32 {
        let mut interval = u32::from(interval_ms) + u32::from(self.stream_slowdown_ms);
        if self.param_dump_active {
            interval *= PARAM_DUMP_SLOWDOWN_FACTOR;
        }
        interval.min(MAX_RESCHEDULE_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SpecialSlot {
    interval_ms: Option<u16>,
    last_sent_ms: Option<u64>,
}

impl SpecialSlot {
    fn is_due(&self, now_ms: u64) -> bool {
        match (self.interval_ms, self.last_sent_ms) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(interval), Some(last)) => now_ms.saturating_sub(last) >= u64::from(interval),
        }
    }
}

/// A group of message kinds sharing one interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    members: MessageSet,
    interval_ms: u16,
    last_sent_ms: Option<u64>,
}

impl Bucket {
    pub fn members(&self) -> &MessageSet {
        &self.members
    }

    pub fn interval_ms(&self) -> u16 {
        self.interval_ms
    }

    /// Time the last full pass over the members completed
    pub fn last_sent_ms(&self) -> Option<u64> {
        self.last_sent_ms
    }

    /// An empty bucket is free for reuse at any interval
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Per-link deferred scheduling state
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    specials: [SpecialSlot; SPECIAL_MESSAGES.len()],
    buckets: [Bucket; MAX_BUCKETS],
    /// Bucket currently being served
    sending: Option<usize>,
    /// Members of `sending` not yet sent this pass
    remaining: MessageSet,
    pushed: MessageSet,
    min_interval_ms: u16,
}

impl DeferredScheduler {
    /// Create a scheduler for a link ticked at `loop_rate_hz`.
    ///
    /// No interval can be shorter than 1.25 ticks of the scheduling loop.
    pub fn new(loop_rate_hz: u16) -> Self {
        let rate = u32::from(loop_rate_hz.max(1));
        let min_interval_ms = (1250 + rate - 1) / rate;

        let mut specials = [SpecialSlot::default(); SPECIAL_MESSAGES.len()];
        specials[0].interval_ms = Some(DEFAULT_HEARTBEAT_INTERVAL_MS);

        Self {
            specials,
            buckets: [Bucket::default(); MAX_BUCKETS],
            sending: None,
            remaining: MessageSet::new(),
            pushed: MessageSet::new(),
            min_interval_ms: min_interval_ms as u16,
        }
    }

    /// Shortest interval the scheduler will honour
    pub fn min_interval_ms(&self) -> u16 {
        self.min_interval_ms
    }

    /// Raise `requested` to the minimum schedulable interval
    pub fn cap_interval(&self, requested: u16) -> u16 {
        requested.max(self.min_interval_ms)
    }

    /// Configure how often `kind` is sent.
    ///
    /// # Arguments
    ///
    /// * `kind` - Message kind to configure
    /// * `interval_ms` - Negative disables the kind; anything else is raised to
    ///   the minimum interval and saturated at `u16::MAX`
    ///
    /// # Returns
    ///
    /// `Err(ScheduleError::BucketsFull)` when a new interval would need an
    /// eleventh bucket. Scheduling state is left exactly as it was.
    pub fn set_interval(&mut self, kind: ApMessage, interval_ms: i32) -> Result<(), ScheduleError> {
        let interval = if interval_ms < 0 {
            None
        } else {
            Some(self.cap_interval(interval_ms.min(i32::from(u16::MAX)) as u16))
        };

        if let Some(slot) = special_slot(kind) {
            self.specials[slot].interval_ms = interval;
            return Ok(());
        }

        let current = self.bucket_of(kind);
        let Some(interval) = interval else {
            if let Some(bucket) = current {
                self.remove_member(bucket, kind);
            }
            return Ok(());
        };

        if let Some(bucket) = current {
            if self.buckets[bucket].interval_ms == interval {
                return Ok(());
            }
        }

        let Some(target) = self.find_bucket_for(interval, current) else {
            log_warn!("No free deferred bucket for {} at {} ms", kind.name(), interval);
            return Err(ScheduleError::BucketsFull { kind });
        };

        if let Some(bucket) = current {
            self.remove_member(bucket, kind);
        }
        self.add_member(target, kind, interval);
        Ok(())
    }

    /// Configured interval of `kind`, `None` when disabled
    pub fn interval(&self, kind: ApMessage) -> Option<u16> {
        if let Some(slot) = special_slot(kind) {
            return self.specials[slot].interval_ms;
        }
        self.bucket_of(kind).map(|b| self.buckets[b].interval_ms)
    }

    /// Bucket index holding `kind`
    pub fn bucket_of(&self, kind: ApMessage) -> Option<usize> {
        self.buckets.iter().position(|b| b.members.contains(kind))
    }

    /// All bucket slots, free ones included
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn live_bucket_count(&self) -> usize {
        self.buckets.iter().filter(|b| !b.is_empty()).count()
    }

    /// Collect the specials due at `now_ms`, in evaluation order.
    ///
    /// Each returned special has its last-sent time set to `now_ms` whether
    /// or not the caller manages to send it.
    pub fn take_due_specials(&mut self, now_ms: u64) -> heapless::Vec<ApMessage, 3> {
        let mut due = heapless::Vec::new();
        for (slot, kind) in self.specials.iter_mut().zip(SPECIAL_MESSAGES) {
            if slot.is_due(now_ms) {
                slot.last_sent_ms = Some(now_ms);
                let _ = due.push(kind);
            }
        }
        due
    }

    /// Ask for `kind` to be sent once at the next opportunity
    pub fn push(&mut self, kind: ApMessage) {
        self.pushed.insert(kind);
    }

    /// Next pushed kind waiting to be sent
    pub fn next_pushed(&self) -> Option<ApMessage> {
        self.pushed.first()
    }

    /// Drop a pushed kind after it went out
    pub fn clear_pushed(&mut self, kind: ApMessage) {
        self.pushed.remove(kind);
    }

    /// Next bucket member to attempt, or `None` if no bucket is due.
    ///
    /// The same kind is returned again until it is reported sent with
    /// [`mark_bucket_message_sent`](Self::mark_bucket_message_sent).
    /// A partly sent bucket that a stretched interval made not due gives
    /// way to a due bucket, which then starts from its first member.
    pub fn next_bucket_message(&mut self, now_ms: u64, reschedule: Reschedule) -> Option<ApMessage> {
        let in_progress = matches!(
            self.sending,
            Some(b) if self.remaining != self.buckets[b].members
        );
        if !in_progress {
            self.select_bucket(now_ms, reschedule);
        }

        let bucket = self.sending?;
        if self.time_to_due(bucket, now_ms, reschedule) <= 0 {
            return self.remaining.first();
        }
        if !in_progress {
            return None;
        }

        let remaining = self.remaining;
        self.select_bucket(now_ms, reschedule);
        match self.sending {
            Some(other) if other != bucket && self.time_to_due(other, now_ms, reschedule) <= 0 => {
                self.remaining.first()
            }
            _ => {
                self.sending = Some(bucket);
                self.remaining = remaining;
                None
            }
        }
    }

    /// Record that `kind` from the bucket in service went out.
    ///
    /// When the last remaining member is sent the bucket's last-sent time
    /// becomes `now_ms` and the next call selects a new bucket.
    pub fn mark_bucket_message_sent(&mut self, kind: ApMessage, now_ms: u64) {
        let Some(bucket) = self.sending else {
            return;
        };
        self.remaining.remove(kind);
        if self.remaining.is_empty() {
            self.buckets[bucket].last_sent_ms = Some(now_ms);
            self.sending = None;
        }
    }

    /// Milliseconds until the bucket is due; zero or negative means due
    fn time_to_due(&self, bucket: usize, now_ms: u64, reschedule: Reschedule) -> i64 {
        let bucket = &self.buckets[bucket];
        match bucket.last_sent_ms {
            None => i64::MIN,
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last).min(i64::MAX as u64) as i64;
                i64::from(reschedule.effective_interval(bucket.interval_ms)) - elapsed
            }
        }
    }

    fn select_bucket(&mut self, now_ms: u64, reschedule: Reschedule) {
        self.sending = (0..MAX_BUCKETS)
            .filter(|b| !self.buckets[*b].is_empty())
            .min_by_key(|b| (self.time_to_due(*b, now_ms, reschedule), *b));
        self.remaining = match self.sending {
            Some(b) => self.buckets[b].members,
            None => MessageSet::new(),
        };
    }

    fn find_bucket_for(&self, interval_ms: u16, current: Option<usize>) -> Option<usize> {
        self.buckets
            .iter()
            .position(|b| !b.is_empty() && b.interval_ms == interval_ms)
            .or_else(|| self.buckets.iter().position(Bucket::is_empty))
            .or_else(|| current.filter(|b| self.buckets[*b].members.len() == 1))
    }

    fn add_member(&mut self, bucket: usize, kind: ApMessage, interval_ms: u16) {
        let slot = &mut self.buckets[bucket];
        if slot.is_empty() {
            slot.interval_ms = interval_ms;
            slot.last_sent_ms = None;
        }
        slot.members.insert(kind);
        if self.sending == Some(bucket) {
            self.remaining.insert(kind);
        }
    }

    fn remove_member(&mut self, bucket: usize, kind: ApMessage) {
        let slot = &mut self.buckets[bucket];
        slot.members.remove(kind);
        if slot.members.is_empty() {
            *slot = Bucket::default();
        }
        if self.sending == Some(bucket) {
            self.remaining.remove(kind);
            if self.remaining.is_empty() {
                self.sending = None;
            }
        }
    }
}

fn special_slot(kind: ApMessage) -> Option<usize> {
    SPECIAL_MESSAGES.iter().position(|k| *k == kind)
}
