//! One GCS channel
//!
//! A `GcsLink` owns everything that is per channel: the deferred scheduler,
//! the bandwidth gate, the stream rates and the transport. Inbound messages
//! for the channel go through [`GcsLink::handle_message`]; the periodic tick
//! is [`GcsLink::update_send`].
//!
//! # Tick order
//!
//! 1. Specials (HEARTBEAT, parameter streaming, HIGH_LATENCY2)
//! 2. Pushed one-shot messages, only if no special was due
//! 3. Deferred buckets, only if no special was due, until the gate refuses
//!    a message or the tick's time budget is spent
//! 4. PARAM_VALUE replies for this channel
//! 5. FILE_TRANSFER_PROTOCOL replies for this channel
//!
//! Every send is checked against the gate snapshot taken at the start of the
//! tick. A refused send is left pending for the next tick.

use std::sync::Arc;

use heapless::Deque;
use mavlink::common::{
    MavCmd, MavMessage, MavResult, COMMAND_LONG_DATA, MESSAGE_INTERVAL_DATA, RADIO_STATUS_DATA,
    REQUEST_DATA_STREAM_DATA,
};
use mavlink::MavHeader;

use super::bandwidth::BandwidthGate;
use super::handlers::ftp::{FtpPacket, FTP_REPLIES_PER_TICK};
use super::handlers::param::{ParamOp, ParamRequest, ParamTarget, PARAM_REPLIES_PER_TICK};
use super::message::{ApMessage, FILE_TRANSFER_PROTOCOL_LEN, MESSAGE_INTERVAL_LEN, PARAM_VALUE_LEN};
use super::scheduler::{DeferredScheduler, Reschedule};
use super::streams::{Stream, StreamRateTable};
use super::transport::LinkTransport;
use super::vehicle::VehicleCapabilities;
use crate::config::LinkConfig;
use crate::core::traits::TimeSource;
use crate::error::ScheduleError;
use crate::gcs::GcsShared;
use crate::{log_debug, log_info, log_warn};

/// Parameter reads queued per NextParam firing during a list dump
pub const PARAM_DUMP_BATCH: usize = 5;

/// Upper bound of the radio back-pressure slowdown
pub const MAX_STREAM_SLOWDOWN_MS: u16 = 2000;

const OUTBOX_LEN: usize = 4;

/// Per-link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub packets_sent: u32,
    /// Wire bytes, framing included
    pub bytes_sent: u32,
    /// Sends refused by the bandwidth gate
    pub out_of_space: u32,
    pub send_errors: u32,
    pub param_replies_sent: u32,
    pub ftp_replies_sent: u32,
}

/// Scheduling and protocol state of one channel
pub struct GcsLink<V: VehicleCapabilities> {
    channel: u8,
    config: LinkConfig,
    scheduler: DeferredScheduler,
    gate: BandwidthGate,
    transport: Box<dyn LinkTransport>,
    vehicle: Arc<V>,
    shared: Arc<GcsShared>,
    stream_slowdown_ms: u16,
    /// Next parameter index of an active list dump
    param_dump: Option<u16>,
    /// Dump fully queued, replies still on their way out
    param_dump_draining: bool,
    /// One-shot replies built at receive time (MESSAGE_INTERVAL)
    outbox: Deque<(MavMessage, usize), OUTBOX_LEN>,
    stats: LinkStats,
}

impl<V: VehicleCapabilities> GcsLink<V> {
    /// Create a link and schedule its streams.
    ///
    /// Stream rates are applied first, then the per-message overrides of
    /// `config.default_intervals`.
    pub fn new(
        channel: u8,
        config: LinkConfig,
        transport: Box<dyn LinkTransport>,
        vehicle: Arc<V>,
        shared: Arc<GcsShared>,
    ) -> Self {
        let scheduler = DeferredScheduler::new(shared.config().loop_rate_hz);
        let mut link = Self {
            channel,
            config,
            scheduler,
            gate: BandwidthGate::new(),
            transport,
            vehicle,
            shared,
            stream_slowdown_ms: 0,
            param_dump: None,
            param_dump_draining: false,
            outbox: Deque::new(),
            stats: LinkStats::default(),
        };

        link.apply_streams(&Stream::ALL);
        let overrides: Vec<(ApMessage, i32)> = link.config.default_intervals.iter().collect();
        for (kind, interval_ms) in overrides {
            // failures are logged by the scheduler; the stream interval stays
            let _ = link.scheduler.set_interval(kind, interval_ms);
        }

        log_info!(
            "GCS link {} up for {} ({} buckets)",
            channel,
            link.vehicle.name(),
            link.scheduler.live_bucket_count()
        );
        link
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn scheduler(&self) -> &DeferredScheduler {
        &self.scheduler
    }

    pub fn stream_rates(&self) -> &StreamRateTable {
        &self.config.stream_rates
    }

    pub fn stream_slowdown_ms(&self) -> u16 {
        self.stream_slowdown_ms
    }

    /// A list dump is queueing reads or its replies have not all gone out
    pub fn param_dump_active(&self) -> bool {
        self.param_dump.is_some() || self.param_dump_draining
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            out_of_space: self.gate.out_of_space_count(),
            ..self.stats
        }
    }

    /// Administratively lock the link: while locked it sends nothing and
    /// everything stays queued.
    pub fn lock(&mut self, locked: bool) {
        self.gate.set_locked(locked);
        log_info!("GCS link {} {}", self.channel, if locked { "locked" } else { "unlocked" });
    }

    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }

    /// Configure the interval of one message kind.
    ///
    /// See [`DeferredScheduler::set_interval`].
    pub fn set_interval(&mut self, kind: ApMessage, interval_ms: i32) -> Result<(), ScheduleError> {
        self.scheduler.set_interval(kind, interval_ms)
    }

    /// Change one stream's rate and reschedule its messages
    pub fn set_stream_rate(&mut self, stream: Stream, rate_hz: u16) {
        self.config.stream_rates.set(stream, rate_hz);
        self.apply_streams(&[stream]);
    }

    /// Send `kind` once at the next opportunity
    pub fn push_message(&mut self, kind: ApMessage) {
        self.scheduler.push(kind);
    }

    /// Handle one inbound message addressed to this channel.
    ///
    /// # Returns
    ///
    /// The result to acknowledge a COMMAND_LONG with, if the command was
    /// one this layer owns. `None` for everything else.
    pub fn handle_message(
        &mut self,
        header: &MavHeader,
        message: &MavMessage,
        _now_ms: u64,
    ) -> Option<MavResult> {
        match message {
            MavMessage::COMMAND_LONG(data) if self.addressed_to_us(data.target_system) => {
                self.handle_command_long(data)
            }
            MavMessage::REQUEST_DATA_STREAM(data) if self.addressed_to_us(data.target_system) => {
                self.handle_request_data_stream(data);
                None
            }
            MavMessage::PARAM_REQUEST_LIST(data) if self.addressed_to_us(data.target_system) => {
                log_debug!("Parameter list requested on link {}", self.channel);
                self.param_dump = Some(0);
                None
            }
            MavMessage::PARAM_REQUEST_READ(data) if self.addressed_to_us(data.target_system) => {
                if let Some(request) = ParamRequest::from_read(self.channel, data) {
                    self.shared.params().submit(request);
                }
                None
            }
            MavMessage::PARAM_SET(data) if self.addressed_to_us(data.target_system) => {
                if let Some(request) = ParamRequest::from_set(self.channel, data) {
                    self.shared.params().submit(request);
                }
                None
            }
            MavMessage::FILE_TRANSFER_PROTOCOL(data) if self.addressed_to_us(data.target_system) => {
                let request = FtpPacket::decode(
                    self.channel,
                    header.system_id,
                    header.component_id,
                    &data.payload,
                );
                self.shared.ftp().submit(request);
                None
            }
            MavMessage::RADIO_STATUS(data) => {
                self.handle_radio_status(data);
                None
            }
            _ => None,
        }
    }

    /// Run one scheduler tick
    pub fn update_send<T: TimeSource>(&mut self, time: &T) {
        let now_ms = time.now_ms();
        let start_us = time.now_us();

        let protocol = self
            .transport
            .protocol_version()
            .unwrap_or(self.config.protocol);
        self.gate.begin_tick(
            self.transport.tx_space(),
            protocol,
            self.transport.signing_active(),
        );

        let specials = self.scheduler.take_due_specials(now_ms);
        for kind in specials.iter().copied() {
            if kind == ApMessage::NextParam {
                self.queue_param_dump_batch();
            } else {
                self.try_send_kind(kind);
            }
        }

        if specials.is_empty() {
            self.send_outbox();
            self.send_pushed();
            self.send_buckets(time, now_ms, start_us);
        }

        self.send_param_replies();
        self.send_ftp_replies();

        if self.param_dump_draining {
            let params = self.shared.params();
            if params.pending_requests() == 0 && params.pending_replies() == 0 {
                log_debug!("Parameter list dump drained on link {}", self.channel);
                self.param_dump_draining = false;
            }
        }
    }

    fn addressed_to_us(&self, target_system: u8) -> bool {
        target_system == 0 || target_system == self.shared.config().system_id
    }

    fn reschedule(&self) -> Reschedule {
        Reschedule {
            stream_slowdown_ms: self.stream_slowdown_ms,
            param_dump_active: self.param_dump_active(),
        }
    }

    /// Re-derive message intervals for `streams` from the rate table
    fn apply_streams(&mut self, streams: &[Stream]) {
        let entries = self.vehicle.stream_entries();
        for entry in entries.iter().filter(|e| streams.contains(&e.stream)) {
            for kind in entry.messages.iter().copied() {
                let interval = self
                    .config
                    .stream_rates
                    .interval_for_message(entries, kind)
                    .map_or(-1, i32::from);
                // failures are logged by the scheduler
                let _ = self.scheduler.set_interval(kind, interval);
            }
        }
    }

    fn handle_command_long(&mut self, data: &COMMAND_LONG_DATA) -> Option<MavResult> {
        let owned = matches!(
            data.command,
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL | MavCmd::MAV_CMD_GET_MESSAGE_INTERVAL
        );
        if !owned {
            return None;
        }
        let Some(message_id) = message_id_param(data.param1) else {
            log_warn!("Message interval command with invalid message id {}", data.param1);
            return Some(MavResult::MAV_RESULT_DENIED);
        };
        match data.command {
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL => {
                Some(self.set_message_interval(message_id, data.param2))
            }
            _ => Some(self.get_message_interval(message_id)),
        }
    }

    /// Configure the interval of a message by MAVLink id.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnknownMessage`] if no scheduled kind sends `message_id`,
    /// otherwise as [`DeferredScheduler::set_interval`].
    pub fn set_mavlink_message_interval(
        &mut self,
        message_id: u32,
        interval_ms: i32,
    ) -> Result<(), ScheduleError> {
        let kind =
            ApMessage::from_mavlink_id(message_id).ok_or(ScheduleError::UnknownMessage(message_id))?;
        self.scheduler.set_interval(kind, interval_ms)?;
        log_debug!("{} interval set to {} ms on link {}", kind.name(), interval_ms, self.channel);
        Ok(())
    }

    /// MAV_CMD_SET_MESSAGE_INTERVAL: `interval_us` 0 is as fast as allowed,
    /// negative disables.
    fn set_message_interval(&mut self, message_id: u32, interval_us: f32) -> MavResult {
        let interval_ms = if interval_us < 0.0 {
            -1
        } else {
            (interval_us / 1000.0).min(i32::MAX as f32) as i32
        };

        match self.set_mavlink_message_interval(message_id, interval_ms) {
            Ok(()) => MavResult::MAV_RESULT_ACCEPTED,
            Err(ScheduleError::UnknownMessage(id)) => {
                log_warn!("SET_MESSAGE_INTERVAL for unknown message id {}", id);
                MavResult::MAV_RESULT_DENIED
            }
            Err(_) => MavResult::MAV_RESULT_FAILED,
        }
    }

    fn get_message_interval(&mut self, message_id: u32) -> MavResult {
        let Some(kind) = ApMessage::from_mavlink_id(message_id) else {
            return MavResult::MAV_RESULT_DENIED;
        };

        let interval_us = self
            .scheduler
            .interval(kind)
            .map_or(-1, |ms| i32::from(ms) * 1000);
        let reply = MavMessage::MESSAGE_INTERVAL(MESSAGE_INTERVAL_DATA {
            interval_us,
            message_id: message_id as u16,
        });

        if self.outbox.push_back((reply, MESSAGE_INTERVAL_LEN)).is_err() {
            return MavResult::MAV_RESULT_TEMPORARILY_REJECTED;
        }
        MavResult::MAV_RESULT_ACCEPTED
    }

    fn handle_request_data_stream(&mut self, data: &REQUEST_DATA_STREAM_DATA) {
        if self.config.options.no_stream_override {
            log_debug!("REQUEST_DATA_STREAM ignored on link {}", self.channel);
            return;
        }
        let rate = if data.start_stop == 0 {
            0
        } else {
            data.req_message_rate
        };
        let streams = Stream::from_data_stream_id(data.req_stream_id);
        for stream in streams {
            self.config.stream_rates.set(*stream, rate);
        }
        self.apply_streams(streams);
    }

    /// Adjust the stream slowdown from the radio's free buffer percentage
    fn handle_radio_status(&mut self, data: &RADIO_STATUS_DATA) {
        let slowdown = self.stream_slowdown_ms;
        self.stream_slowdown_ms = match data.txbuf {
            0..=19 => slowdown.saturating_add(60),
            20..=49 => slowdown.saturating_add(20),
            96..=u8::MAX => slowdown.saturating_sub(40),
            91..=95 => slowdown.saturating_sub(20),
            _ => slowdown,
        }
        .min(MAX_STREAM_SLOWDOWN_MS);
    }

    /// Queue the next batch of index reads of a parameter list dump
    fn queue_param_dump_batch(&mut self) {
        let Some(mut next) = self.param_dump else {
            return;
        };
        let params = self.shared.params();
        let Some(count) = params.param_count() else {
            return;
        };

        for _ in 0..PARAM_DUMP_BATCH {
            if next >= count {
                break;
            }
            let request = ParamRequest {
                channel: self.channel,
                target: ParamTarget::Index(next),
                op: ParamOp::Read,
            };
            if !params.try_submit(request) {
                break;
            }
            next += 1;
        }

        if next >= count {
            log_debug!("Parameter list dump of {} queued on link {}", count, self.channel);
            self.param_dump = None;
            self.param_dump_draining = true;
        } else {
            self.param_dump = Some(next);
        }
    }

    fn send_outbox(&mut self) {
        while let Some((message, payload_len)) = self.outbox.front() {
            let payload_len = *payload_len;
            if !self.gate.fits(payload_len) {
                return;
            }
            let message = message.clone();
            self.outbox.pop_front();
            self.send_message(&message, payload_len);
        }
    }

    fn send_pushed(&mut self) {
        while let Some(kind) = self.scheduler.next_pushed() {
            if !self.try_send_kind(kind) {
                return;
            }
            self.scheduler.clear_pushed(kind);
        }
    }

    fn send_buckets<T: TimeSource>(&mut self, time: &T, now_ms: u64, start_us: u64) {
        let budget_us = u64::from(self.shared.config().tick_budget_us);
        let reschedule = self.reschedule();

        while let Some(kind) = self.scheduler.next_bucket_message(now_ms, reschedule) {
            if !self.try_send_kind(kind) {
                return;
            }
            self.scheduler.mark_bucket_message_sent(kind, now_ms);
            if time.elapsed_since(start_us) > budget_us {
                return;
            }
        }
    }

    fn send_param_replies(&mut self) {
        let channel = self.channel;
        for _ in 0..PARAM_REPLIES_PER_TICK {
            let gate = &mut self.gate;
            let Some(reply) = self
                .shared
                .params()
                .take_reply_for(channel, |_| gate.fits(PARAM_VALUE_LEN))
            else {
                return;
            };
            self.send_message(&reply.to_message(), PARAM_VALUE_LEN);
            self.stats.param_replies_sent = self.stats.param_replies_sent.saturating_add(1);
        }
    }

    fn send_ftp_replies(&mut self) {
        let channel = self.channel;
        for _ in 0..FTP_REPLIES_PER_TICK {
            let gate = &mut self.gate;
            let Some(reply) = self
                .shared
                .ftp()
                .take_reply_for(channel, |_| gate.fits(FILE_TRANSFER_PROTOCOL_LEN))
            else {
                return;
            };
            self.send_message(&reply.to_message(), FILE_TRANSFER_PROTOCOL_LEN);
            self.stats.ftp_replies_sent = self.stats.ftp_replies_sent.saturating_add(1);
        }
    }

    /// Attempt one scheduled kind.
    ///
    /// # Returns
    ///
    /// `false` only when the gate refused it. A kind the vehicle cannot
    /// build counts as sent.
    fn try_send_kind(&mut self, kind: ApMessage) -> bool {
        let payload_len = kind.max_payload_len();
        if !self.gate.fits(payload_len) {
            return false;
        }
        if let Some(message) = self.vehicle.build_message(kind) {
            self.send_message(&message, payload_len);
        }
        true
    }

    /// Hand a message the gate already accepted to the transport
    fn send_message(&mut self, message: &MavMessage, payload_len: usize) {
        let wire_len = self.gate.packet_size(payload_len);
        self.gate.consume(payload_len);
        match self.transport.send(message) {
            Ok(()) => {
                self.stats.packets_sent = self.stats.packets_sent.saturating_add(1);
                self.stats.bytes_sent = self.stats.bytes_sent.saturating_add(wire_len as u32);
            }
            Err(err) => {
                self.stats.send_errors = self.stats.send_errors.saturating_add(1);
                log_debug!("Link {} send failed: {}", self.channel, err);
            }
        }
    }
}

/// MAVLink message id carried in a float command parameter
fn message_id_param(param: f32) -> Option<u32> {
    if !param.is_finite() || param < 0.0 || param > u32::MAX as f32 {
        return None;
    }
    Some(param as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::bandwidth::MAVLINK2_OVERHEAD;
    use crate::communication::mavlink::handlers::ftp::FtpOpcode;
    use crate::communication::mavlink::intervals::DefaultIntervals;
    use crate::communication::mavlink::transport::mock::MockTransport;
    use crate::communication::mavlink::vehicle::GroundRover;
    use crate::config::{GcsConfig, LinkOptions};
    use crate::core::traits::MockTime;
    use crate::parameters::{ParamMetadata, ParameterRegistry};
    use mavlink::common::{
        FILE_TRANSFER_PROTOCOL_DATA, PARAM_REQUEST_LIST_DATA, PARAM_REQUEST_READ_DATA,
    };

    struct Fixture {
        link: GcsLink<GroundRover>,
        transport: MockTransport,
        shared: Arc<GcsShared>,
        time: MockTime,
    }

    impl Fixture {
        fn new(config: LinkConfig) -> Self {
            let shared = Arc::new(GcsShared::new(GcsConfig::default()));
            let transport = MockTransport::new(8192);
            let link = GcsLink::new(
                0,
                config,
                Box::new(transport.clone()),
                Arc::new(GroundRover::new()),
                Arc::clone(&shared),
            );
            Self {
                link,
                transport,
                shared,
                time: MockTime::new(),
            }
        }

        fn tick_at(&mut self, ms: u64) -> Vec<MavMessage> {
            self.time.set_ms(ms);
            self.link.update_send(&self.time);
            self.transport.take_sent()
        }

        fn handle(&mut self, message: MavMessage) -> Option<MavResult> {
            let header = MavHeader {
                system_id: 255,
                component_id: 190,
                sequence: 0,
            };
            self.link.handle_message(&header, &message, 0)
        }
    }

    fn command(command: MavCmd, param1: f32, param2: f32) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: 1,
            target_component: 1,
            command,
            confirmation: 0,
            param1,
            param2,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        })
    }

    fn data_stream(stream_id: u8, rate: u16, start_stop: u8) -> MavMessage {
        MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate,
            target_system: 1,
            target_component: 1,
            req_stream_id: stream_id,
            start_stop,
        })
    }

    fn radio_status(txbuf: u8) -> MavMessage {
        MavMessage::RADIO_STATUS(RADIO_STATUS_DATA {
            rxerrors: 0,
            fixed: 0,
            rssi: 200,
            remrssi: 200,
            txbuf,
            noise: 0,
            remnoise: 0,
        })
    }

    fn ids(messages: &[MavMessage]) -> Vec<u32> {
        use mavlink::Message;
        messages.iter().map(|m| m.message_id()).collect()
    }

    #[test]
    fn test_streams_become_buckets() {
        let f = Fixture::new(LinkConfig::default());
        let s = f.link.scheduler();
        assert_eq!(s.interval(ApMessage::Attitude), Some(100));
        assert_eq!(s.interval(ApMessage::SysStatus), Some(1000));
        assert_eq!(s.interval(ApMessage::GlobalPositionInt), Some(200));
        assert_eq!(s.interval(ApMessage::NextParam), Some(100));
        assert_eq!(s.bucket_of(ApMessage::Attitude), s.bucket_of(ApMessage::VfrHud));
        assert_eq!(s.live_bucket_count(), 3);
    }

    #[test]
    fn test_default_intervals_override_streams() {
        let overrides = DefaultIntervals::parse("30 50\n2 -1\n").unwrap();
        let f = Fixture::new(LinkConfig::default().with_default_intervals(overrides));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), Some(50));
        assert_eq!(f.link.scheduler().interval(ApMessage::SystemTime), None);
    }

    #[test]
    fn test_special_tick_skips_buckets() {
        let mut f = Fixture::new(LinkConfig::default());
        assert_eq!(ids(&f.tick_at(0)), vec![0]);

        let sent = ids(&f.tick_at(20));
        assert!(sent.contains(&30)); // ATTITUDE
        assert!(sent.contains(&74)); // VFR_HUD
        assert!(sent.contains(&1)); // SYS_STATUS
        assert!(!sent.contains(&0));
    }

    #[test]
    fn test_gate_limits_tick_bytes() {
        let mut f = Fixture::new(LinkConfig::default());
        f.tick_at(0);

        f.transport.set_tx_space(100);
        f.tick_at(20);
        let stats = f.link.stats();
        assert!(stats.bytes_sent as usize <= 100 + (MAVLINK2_OVERHEAD + 9));
        assert!(stats.out_of_space > 0);
    }

    #[test]
    fn test_configured_protocol_until_transport_reports() {
        use crate::communication::mavlink::bandwidth::{MAVLINK1_OVERHEAD, ProtocolVersion};

        let mut f = Fixture::new(LinkConfig::default().with_protocol(ProtocolVersion::V1));
        assert_eq!(ids(&f.tick_at(0)), vec![0]);
        assert_eq!(f.link.stats().bytes_sent as usize, MAVLINK1_OVERHEAD + 9);

        f.transport.set_protocol(ProtocolVersion::V2);
        assert_eq!(ids(&f.tick_at(1000)), vec![0]);
        assert_eq!(
            f.link.stats().bytes_sent as usize,
            MAVLINK1_OVERHEAD + MAVLINK2_OVERHEAD + 18
        );
    }

    #[test]
    fn test_refused_message_stays_due() {
        let mut f = Fixture::new(LinkConfig::default());
        f.tick_at(0);

        f.transport.set_tx_space(0);
        assert!(f.tick_at(20).is_empty());

        f.transport.set_tx_space(8192);
        let sent = ids(&f.tick_at(40));
        assert!(sent.contains(&30));
        assert!(sent.contains(&1));
    }

    #[test]
    fn test_locked_link_sends_nothing() {
        let mut f = Fixture::new(LinkConfig::default());
        f.link.lock(true);
        assert!(f.tick_at(0).is_empty());
        assert!(f.link.stats().out_of_space > 0);

        // the refused HEARTBEAT waits for its next slot
        f.link.lock(false);
        assert!(!ids(&f.tick_at(20)).contains(&0));
        assert_eq!(ids(&f.tick_at(1000)), vec![0]);
    }

    #[test]
    fn test_set_message_interval_command() {
        let mut f = Fixture::new(LinkConfig::default());
        let result = f.handle(command(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, 30.0, 50_000.0));
        assert_eq!(result, Some(MavResult::MAV_RESULT_ACCEPTED));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), Some(50));

        let result = f.handle(command(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, 30.0, -1.0));
        assert_eq!(result, Some(MavResult::MAV_RESULT_ACCEPTED));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), None);

        let result = f.handle(command(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, 30.0, 0.0));
        assert_eq!(result, Some(MavResult::MAV_RESULT_ACCEPTED));
        assert_eq!(
            f.link.scheduler().interval(ApMessage::Attitude),
            Some(f.link.scheduler().min_interval_ms())
        );

        let result = f.handle(command(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, 9999.0, 1000.0));
        assert_eq!(result, Some(MavResult::MAV_RESULT_DENIED));
    }

    #[test]
    fn test_set_mavlink_message_interval() {
        let mut f = Fixture::new(LinkConfig::default());
        assert_eq!(f.link.set_mavlink_message_interval(30, 250), Ok(()));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), Some(250));

        assert_eq!(
            f.link.set_mavlink_message_interval(9999, 250),
            Err(ScheduleError::UnknownMessage(9999))
        );
    }

    #[test]
    fn test_invalid_message_id_denied() {
        let mut f = Fixture::new(LinkConfig::default());
        let heartbeat = f.link.scheduler().interval(ApMessage::Heartbeat);

        for id in [-1.0, f32::NAN, f32::INFINITY] {
            let result = f.handle(command(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, id, 50_000.0));
            assert_eq!(result, Some(MavResult::MAV_RESULT_DENIED));
            let result = f.handle(command(MavCmd::MAV_CMD_GET_MESSAGE_INTERVAL, id, 0.0));
            assert_eq!(result, Some(MavResult::MAV_RESULT_DENIED));
        }
        assert_eq!(f.link.scheduler().interval(ApMessage::Heartbeat), heartbeat);
    }

    #[test]
    fn test_get_message_interval_queues_reply() {
        let mut f = Fixture::new(LinkConfig::default());
        f.tick_at(0);

        let result = f.handle(command(MavCmd::MAV_CMD_GET_MESSAGE_INTERVAL, 30.0, 0.0));
        assert_eq!(result, Some(MavResult::MAV_RESULT_ACCEPTED));

        let sent = f.tick_at(20);
        let reply = sent.iter().find_map(|m| match m {
            MavMessage::MESSAGE_INTERVAL(data) => Some(data.clone()),
            _ => None,
        });
        let reply = reply.unwrap();
        assert_eq!(reply.message_id, 30);
        assert_eq!(reply.interval_us, 100_000);
    }

    #[test]
    fn test_unowned_command_not_answered() {
        let mut f = Fixture::new(LinkConfig::default());
        assert_eq!(f.handle(command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, 1.0, 0.0)), None);
    }

    #[test]
    fn test_request_data_stream() {
        let mut f = Fixture::new(LinkConfig::default());
        f.handle(data_stream(10, 2, 1));
        assert_eq!(f.link.stream_rates().rate(Stream::Extra1), 2);
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), Some(500));

        f.handle(data_stream(0, 0, 0));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), None);
        assert_eq!(f.link.scheduler().interval(ApMessage::SysStatus), None);
        // ALL leaves parameter streaming alone
        assert_eq!(f.link.stream_rates().rate(Stream::Params), 10);
    }

    #[test]
    fn test_no_stream_override_ignores_requests() {
        let config = LinkConfig::default().with_options(LinkOptions {
            no_stream_override: true,
        });
        let mut f = Fixture::new(config);
        f.handle(data_stream(10, 2, 1));
        assert_eq!(f.link.scheduler().interval(ApMessage::Attitude), Some(100));
    }

    #[test]
    fn test_radio_status_slowdown() {
        let mut f = Fixture::new(LinkConfig::default());
        f.handle(radio_status(10));
        assert_eq!(f.link.stream_slowdown_ms(), 60);
        f.handle(radio_status(40));
        assert_eq!(f.link.stream_slowdown_ms(), 80);
        f.handle(radio_status(93));
        assert_eq!(f.link.stream_slowdown_ms(), 60);
        f.handle(radio_status(99));
        assert_eq!(f.link.stream_slowdown_ms(), 20);
        f.handle(radio_status(99));
        assert_eq!(f.link.stream_slowdown_ms(), 0);

        for _ in 0..100 {
            f.handle(radio_status(0));
        }
        assert_eq!(f.link.stream_slowdown_ms(), MAX_STREAM_SLOWDOWN_MS);
    }

    const NAMES: [&str; 8] = [
        "TEST_P0", "TEST_P1", "TEST_P2", "TEST_P3", "TEST_P4", "TEST_P5", "TEST_P6", "TEST_P7",
    ];

    fn registry(count: usize) -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        for (i, name) in NAMES.iter().take(count).enumerate() {
            registry
                .register(ParamMetadata::new_float(name, i as f32, 0.0, 100.0))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_param_list_dump() {
        let mut f = Fixture::new(LinkConfig::default());
        let mut store = registry(8);
        f.shared.params().set_param_count(8);

        f.handle(MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: 1,
            target_component: 1,
        }));
        assert!(f.link.param_dump_active());

        f.tick_at(0);
        assert_eq!(f.shared.params().pending_requests(), PARAM_DUMP_BATCH);
        assert!(f.link.param_dump_active());

        f.shared.params().service_requests(&mut store, 10);
        let sent = f.tick_at(20);
        let values: Vec<u16> = sent
            .iter()
            .filter_map(|m| match m {
                MavMessage::PARAM_VALUE(data) => Some(data.param_index),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);

        // last batch queued, replies still pending
        f.tick_at(100);
        assert!(f.link.param_dump_active());
        f.shared.params().service_requests(&mut store, 10);
        let sent = f.tick_at(120);
        assert_eq!(
            sent.iter()
                .filter(|m| matches!(m, MavMessage::PARAM_VALUE(_)))
                .count(),
            3
        );
        assert_eq!(f.link.stats().param_replies_sent, 8);
        assert!(!f.link.param_dump_active());
    }

    #[test]
    fn test_param_dump_stretch_lasts_until_replies_sent() {
        let mut f = Fixture::new(LinkConfig::default());
        let mut store = registry(5);
        f.shared.params().set_param_count(5);
        f.handle(MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: 1,
            target_component: 1,
        }));

        // every read is queued on the first firing
        f.tick_at(0);
        assert_eq!(f.shared.params().pending_requests(), 5);
        assert!(f.link.param_dump_active());
        assert!(ids(&f.tick_at(20)).contains(&30));

        f.tick_at(130);
        assert!(!ids(&f.tick_at(150)).contains(&30));

        f.shared.params().service_requests(&mut store, 10);
        f.tick_at(170);
        assert_eq!(f.link.stats().param_replies_sent, 5);
        assert!(!f.link.param_dump_active());
        assert!(ids(&f.tick_at(190)).contains(&30));
    }

    #[test]
    fn test_param_dump_slows_buckets() {
        let mut f = Fixture::new(LinkConfig::default());
        f.shared.params().set_param_count(100);
        f.handle(MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: 1,
            target_component: 1,
        }));
        f.tick_at(0);
        assert!(ids(&f.tick_at(20)).contains(&30));

        // ATTITUDE at 100 ms is stretched to 400 ms while dumping;
        // 130 and 400 are parameter streaming ticks
        f.tick_at(130);
        assert!(!ids(&f.tick_at(150)).contains(&30));
        f.tick_at(400);
        assert!(ids(&f.tick_at(430)).contains(&30));
        assert!(f.link.param_dump_active());
    }

    #[test]
    fn test_param_read_routed_to_queue() {
        let mut f = Fixture::new(LinkConfig::default());
        f.handle(MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            param_index: 3,
            target_system: 1,
            target_component: 1,
            param_id: [0; 16],
        }));
        assert_eq!(f.shared.params().pending_requests(), 1);

        // addressed to another vehicle
        f.handle(MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            param_index: 3,
            target_system: 7,
            target_component: 1,
            param_id: [0; 16],
        }));
        assert_eq!(f.shared.params().pending_requests(), 1);
    }

    #[test]
    fn test_param_replies_for_other_channel_wait() {
        let mut f = Fixture::new(LinkConfig::default());
        let mut store = registry(1);
        f.shared.params().submit(ParamRequest {
            channel: 1,
            target: ParamTarget::Index(0),
            op: ParamOp::Read,
        });
        f.shared.params().service_requests(&mut store, 1);

        f.tick_at(0);
        assert_eq!(f.shared.params().pending_replies(), 1);
        assert_eq!(f.link.stats().param_replies_sent, 0);
    }

    #[test]
    fn test_ftp_request_routed_and_reply_sent() {
        let mut f = Fixture::new(LinkConfig::default());
        let mut request = FtpPacket::new(0, 255, 190);
        request.opcode = FtpOpcode::ResetSessions;

        f.handle(MavMessage::FILE_TRANSFER_PROTOCOL(FILE_TRANSFER_PROTOCOL_DATA {
            target_network: 0,
            target_system: 1,
            target_component: 1,
            payload: request.encode(),
        }));
        f.handle(MavMessage::FILE_TRANSFER_PROTOCOL(FILE_TRANSFER_PROTOCOL_DATA {
            target_network: 0,
            target_system: 42,
            target_component: 1,
            payload: request.encode(),
        }));
        assert_eq!(f.shared.ftp().pending_requests(), 1);

        f.shared.ftp().push_reply(request.reply_template().ack(&[]));
        let sent = f.tick_at(0);
        let reply = sent.iter().find_map(|m| match m {
            MavMessage::FILE_TRANSFER_PROTOCOL(data) => Some(data.clone()),
            _ => None,
        });
        assert_eq!(reply.unwrap().target_system, 255);
        assert_eq!(f.link.stats().ftp_replies_sent, 1);
    }

    #[test]
    fn test_pushed_message_sent_once() {
        let mut f = Fixture::new(LinkConfig::default());
        f.tick_at(0);
        f.tick_at(20);

        f.link.push_message(ApMessage::Attitude);
        assert_eq!(ids(&f.tick_at(40)), vec![30]);
        assert!(f.tick_at(60).is_empty());
    }
}
