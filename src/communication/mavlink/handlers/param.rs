//! MAVLink Parameter Protocol queue
//!
//! Decouples parameter traffic from the real-time tick.
//!
//! # Flow
//!
//! - **PARAM_REQUEST_READ / PARAM_SET** (any link): decoded into a
//!   [`ParamRequest`] and queued. Never blocks; a full queue drops its oldest
//!   entry and counts the drop.
//! - **Background worker**: [`ParamQueue::service_requests`] resolves
//!   requests against the [`ParameterStore`] and queues a [`ParamReply`]
//!   addressed to the requesting channel. It stops while the reply queue is
//!   full, so replies are never dropped.
//! - **Link tick**: [`ParamQueue::take_reply_for`] hands out replies in FIFO
//!   order, only when the head reply belongs to the asking channel and the
//!   link's bandwidth gate accepts it.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Deque;
use mavlink::common::{MavMessage, PARAM_REQUEST_READ_DATA, PARAM_SET_DATA, PARAM_VALUE_DATA};

use crate::core::traits::{EmbassyState, SharedState};
use crate::error::ParamStoreError;
use crate::parameters::{decode_param_id, encode_param_id, ParamName, ParameterStore, StoredParam};
use crate::{log_debug, log_warn};

/// Pending request capacity
pub const PARAM_REQUEST_QUEUE_LEN: usize = 20;

/// Resolved reply capacity
pub const PARAM_REPLY_QUEUE_LEN: usize = 5;

/// Replies a link drains per tick at most
pub const PARAM_REPLIES_PER_TICK: usize = 5;

const PARAM_COUNT_UNKNOWN: u32 = u32::MAX;

/// How a request names its parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTarget {
    Index(u16),
    Name(ParamName),
}

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamOp {
    Read,
    Write(f32),
}

/// A parameter request waiting for the background worker
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRequest {
    pub channel: u8,
    pub target: ParamTarget,
    pub op: ParamOp,
}

impl ParamRequest {
    /// Decode PARAM_REQUEST_READ.
    ///
    /// A non-negative index wins over the name, as in the MAVLink protocol.
    pub fn from_read(channel: u8, data: &PARAM_REQUEST_READ_DATA) -> Option<Self> {
        let target = if data.param_index >= 0 {
            ParamTarget::Index(data.param_index as u16)
        } else {
            ParamTarget::Name(decode_param_id(&data.param_id)?)
        };
        Some(Self {
            channel,
            target,
            op: ParamOp::Read,
        })
    }

    /// Decode PARAM_SET
    pub fn from_set(channel: u8, data: &PARAM_SET_DATA) -> Option<Self> {
        Some(Self {
            channel,
            target: ParamTarget::Name(decode_param_id(&data.param_id)?),
            op: ParamOp::Write(data.param_value),
        })
    }
}

/// A resolved parameter waiting to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ParamReply {
    pub channel: u8,
    pub param: StoredParam,
    pub count: u16,
}

impl ParamReply {
    /// Build the PARAM_VALUE message
    pub fn to_message(&self) -> MavMessage {
        MavMessage::PARAM_VALUE(PARAM_VALUE_DATA {
            param_value: self.param.value.as_f32(),
            param_count: self.count,
            param_index: self.param.index,
            param_id: encode_param_id(&self.param.name),
            param_type: self.param.value.mav_param_type(),
        })
    }
}

/// Parameter queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamQueueStats {
    /// Requests accepted
    pub requests_queued: u32,
    /// Oldest requests discarded because the queue was full
    pub requests_dropped: u32,
    /// Replies produced by the worker
    pub replies_queued: u32,
    /// Requests naming no parameter
    pub not_found: u32,
    /// Writes refused by the store or by `allow_param_set`
    pub writes_rejected: u32,
}

#[derive(Default)]
struct Queues {
    requests: Deque<ParamRequest, PARAM_REQUEST_QUEUE_LEN>,
    replies: Deque<ParamReply, PARAM_REPLY_QUEUE_LEN>,
    stats: ParamQueueStats,
}

/// Process-wide parameter request/reply queues
pub struct ParamQueue {
    queues: EmbassyState<Queues>,
    param_count: AtomicU32,
    allow_set: bool,
}

impl ParamQueue {
    pub fn new(allow_set: bool) -> Self {
        Self {
            queues: EmbassyState::new(Queues::default()),
            param_count: AtomicU32::new(PARAM_COUNT_UNKNOWN),
            allow_set,
        }
    }

    /// Queue a request, dropping the oldest one if the queue is full
    pub fn submit(&self, request: ParamRequest) {
        let dropped = self.queues.with_mut(|q| {
            let dropped = if q.requests.is_full() {
                q.requests.pop_front();
                q.stats.requests_dropped = q.stats.requests_dropped.saturating_add(1);
                true
            } else {
                false
            };
            // cannot fail: a slot was freed above if needed
            let _ = q.requests.push_back(request);
            q.stats.requests_queued = q.stats.requests_queued.saturating_add(1);
            dropped
        });
        if dropped {
            log_warn!("Parameter request queue full, dropped oldest request");
        }
    }

    /// Queue a request only if there is room
    pub fn try_submit(&self, request: ParamRequest) -> bool {
        self.queues.with_mut(|q| {
            let queued = q.requests.push_back(request).is_ok();
            if queued {
                q.stats.requests_queued = q.stats.requests_queued.saturating_add(1);
            }
            queued
        })
    }

    pub fn pending_requests(&self) -> usize {
        self.queues.with(|q| q.requests.len())
    }

    pub fn pending_replies(&self) -> usize {
        self.queues.with(|q| q.replies.len())
    }

    /// Resolve up to `max` queued requests against `store`.
    ///
    /// Runs on the background worker. The queue lock is released while the
    /// store is accessed. Stops early when the reply queue is full.
    ///
    /// # Returns
    ///
    /// Number of requests consumed.
    pub fn service_requests<S: ParameterStore + ?Sized>(&self, store: &mut S, max: usize) -> usize {
        self.set_param_count(store.count());

        let mut served = 0;
        while served < max {
            let request = self.queues.with_mut(|q| {
                if q.replies.is_full() {
                    None
                } else {
                    q.requests.pop_front()
                }
            });
            let Some(request) = request else {
                break;
            };
            served += 1;

            let Some(param) = self.resolve(store, &request) else {
                log_debug!("Parameter request on channel {} matched nothing", request.channel);
                self.queues
                    .with_mut(|q| q.stats.not_found = q.stats.not_found.saturating_add(1));
                continue;
            };

            let reply = ParamReply {
                channel: request.channel,
                param,
                count: store.count(),
            };
            self.queues.with_mut(|q| {
                // only this worker adds replies, and it checked for room
                let _ = q.replies.push_back(reply);
                q.stats.replies_queued = q.stats.replies_queued.saturating_add(1);
            });
        }
        served
    }

    /// Pop the head reply if it belongs to `channel` and `accept` agrees.
    ///
    /// `accept` runs under the queue lock and must be cheap (a bandwidth
    /// check). Replies for other channels block the head until their link
    /// drains them, preserving FIFO order.
    pub fn take_reply_for<F>(&self, channel: u8, accept: F) -> Option<ParamReply>
    where
        F: FnOnce(&ParamReply) -> bool,
    {
        self.queues.with_mut(|q| {
            let head = q.replies.front()?;
            if head.channel != channel || !accept(head) {
                return None;
            }
            q.replies.pop_front()
        })
    }

    /// Parameter count last reported by the store, if known yet
    pub fn param_count(&self) -> Option<u16> {
        match self.param_count.load(Ordering::Acquire) {
            PARAM_COUNT_UNKNOWN => None,
            n => Some(n as u16),
        }
    }

    pub fn set_param_count(&self, count: u16) {
        self.param_count.store(u32::from(count), Ordering::Release);
    }

    pub fn allow_set(&self) -> bool {
        self.allow_set
    }

    pub fn stats(&self) -> ParamQueueStats {
        self.queues.with(|q| q.stats)
    }

    fn resolve<S: ParameterStore + ?Sized>(
        &self,
        store: &mut S,
        request: &ParamRequest,
    ) -> Option<StoredParam> {
        match (&request.target, request.op) {
            (ParamTarget::Index(index), _) => store.get_by_index(*index),
            (ParamTarget::Name(name), ParamOp::Read) => store.find(name),
            (ParamTarget::Name(name), ParamOp::Write(value)) => {
                if !self.allow_set() {
                    self.count_rejected_write();
                    return store.find(name);
                }
                match store.set(name, value) {
                    Ok(param) => Some(param),
                    Err(ParamStoreError::NotFound) => None,
                    Err(err) => {
                        log_warn!("Parameter {} write refused: {}", name.as_str(), err);
                        self.count_rejected_write();
                        store.find(name)
                    }
                }
            }
        }
    }

    fn count_rejected_write(&self) {
        self.queues
            .with_mut(|q| q.stats.writes_rejected = q.stats.writes_rejected.saturating_add(1));
    }
}
