//! Sans-IO core of the rig controller.
//!
//! [`Engine`] owns the [`RigState`], the codec, and the command queue. It
//! never touches a transport or a clock: the actor in
//! [`controller`](crate::controller) feeds it bytes, write results and the
//! current [`Instant`], and drains the bytes, events and faults it produces.
//!
//! # Command lifecycle
//!
//! Commands are queued in issuance order and written one at a time. The
//! in-flight command completes when, depending on the codec's [`AckStyle`]:
//!
//! - `Explicit`: an `Ack` carrying its id arrives, or an `Ack` without an id
//!   (the oldest outstanding command, a FIFO fallback for protocols that do
//!   not echo ids);
//! - `ReadBack`: status reports have covered every field the command touches;
//! - `Unacknowledged`: its bytes were written.
//!
//! A `Nack` fails it with [`Error::Rejected`]; no completion within the
//! command timeout fails it with [`Error::Timeout`].
//!
//! Read-back confirmation is by field, not by value: with auto-information
//! on, an unrelated push of the same field can complete a set command before
//! the rig has processed it. The pushed value is still what lands in the
//! state, and the read-back reply that follows overwrites it.

use std::collections::VecDeque;
use std::time::Duration;

use elecraft_core::{
    CommandId, ConnectionState, Error, Mode, Reading, Result, RigEvent, RigLimits, RigState, Vfo,
};
use elecraft_protocol::{AckStyle, Codec, Command, Field, FieldSet, Response, StatusReport};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// When a written value is applied to the [`RigState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Apply as soon as the write succeeds. A later rejection or timeout
    /// marks the field stale and schedules a refresh.
    Optimistic,
    /// Apply only once the rig confirms.
    #[default]
    Confirmed,
}

/// Timing and policy knobs for the [`Engine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub update_policy: UpdatePolicy,
    /// How long a written command may wait for confirmation.
    pub command_timeout: Duration,
    /// How old a field may get before a state query is issued.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            update_policy: UpdatePolicy::Confirmed,
            command_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Where a command's outcome goes.
pub type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
enum Origin {
    Caller(Reply),
    Handshake,
    Poll,
}

#[derive(Debug)]
struct Pending {
    id: CommandId,
    command: Command,
    origin: Origin,
    style: AckStyle,
    /// Fields still to be reported before a read-back completes.
    awaiting: FieldSet,
    /// Set once the command has been written.
    deadline: Option<Instant>,
    /// Whether the commanded value was applied optimistically.
    applied: bool,
}

/// Reject a command whose value the rig cannot take.
pub fn validate_command(limits: &RigLimits, command: &Command) -> Result<()> {
    match command {
        Command::SetFrequency(vfo, khz) => limits.check_frequency(*vfo, *khz),
        Command::SetPower(watts) => limits.check_power(*watts),
        Command::SetMode(mode) => limits.check_mode(*mode),
        Command::QueryState => Ok(()),
    }
}

fn field_index(field: Field) -> usize {
    match field {
        Field::VfoA => 0,
        Field::VfoB => 1,
        Field::Power => 2,
        Field::Mode => 3,
    }
}

/// The rig controller's state machine.
pub struct Engine {
    codec: Box<dyn Codec>,
    limits: RigLimits,
    config: EngineConfig,
    state: RigState,
    next_id: CommandId,
    queue: VecDeque<Pending>,
    in_flight: Option<Pending>,
    last_refresh: [Instant; 4],
    /// When the last poll was queued; polls are spaced from here even if
    /// they fail or come back incomplete.
    last_poll: Instant,
    refresh_requested: bool,
    decode_errors: u64,
    events: Vec<RigEvent>,
    fault: Option<Error>,
    last_fault: Option<Error>,
}

impl Engine {
    pub fn new(codec: Box<dyn Codec>, limits: RigLimits, config: EngineConfig, now: Instant) -> Self {
        Engine {
            codec,
            limits,
            config,
            state: RigState::default(),
            next_id: CommandId::new(1),
            queue: VecDeque::new(),
            in_flight: None,
            last_refresh: [now; 4],
            last_poll: now,
            refresh_requested: false,
            decode_errors: 0,
            events: Vec::new(),
            fault: None,
            last_fault: None,
        }
    }

    pub fn state(&self) -> &RigState {
        &self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_state
    }

    pub fn codec(&self) -> &dyn Codec {
        &*self.codec
    }

    pub fn limits(&self) -> &RigLimits {
        &self.limits
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames dropped as undecodable since construction.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Commands queued or in flight.
    pub fn pending_len(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    /// Events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<RigEvent> {
        std::mem::take(&mut self.events)
    }

    /// A link failure the driver must act on by closing the transport and
    /// calling [`on_fault`](Self::on_fault).
    pub fn take_fault(&mut self) -> Option<Error> {
        self.fault.take()
    }

    /// The error that last moved the link to `Faulted`.
    pub fn last_fault(&self) -> Option<&Error> {
        self.last_fault.as_ref()
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    /// Validate and queue a caller command.
    pub fn submit(&mut self, command: Command, reply: Reply) -> Result<CommandId> {
        validate_command(&self.limits, &command)?;
        if self.state.connection_state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        Ok(self.enqueue(command, Origin::Caller(reply)))
    }

    fn enqueue(&mut self, command: Command, origin: Origin) -> CommandId {
        let id = self.next_id;
        self.next_id = id.next();
        let style = self.codec.ack_style(&command);
        trace!(%id, %command, ?style, "queueing command");
        self.queue.push_back(Pending {
            id,
            command,
            origin,
            style,
            awaiting: command.fields(),
            deadline: None,
            applied: false,
        });
        id
    }

    /// Bytes for the next command to write, if the link is idle.
    ///
    /// The driver must report the write's outcome through
    /// [`on_write_complete`](Self::on_write_complete) before calling this
    /// again.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        if self.in_flight.is_some() {
            return None;
        }
        if !matches!(
            self.state.connection_state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return None;
        }
        let pending = self.queue.pop_front()?;
        let bytes = self.codec.encode(pending.id, &pending.command);
        debug!(id = %pending.id, command = %pending.command, "sending command");
        self.in_flight = Some(pending);
        Some(bytes)
    }

    /// Record the outcome of writing the in-flight command.
    pub fn on_write_complete(&mut self, result: Result<()>, now: Instant) {
        let Some(style) = self.in_flight.as_ref().map(|p| p.style) else {
            return;
        };

        if let Err(e) = result {
            if e.is_link_failure() {
                self.fault = Some(e.clone());
            }
            if let Some(pending) = self.in_flight.take() {
                self.finish(pending, Err(e), now);
            }
            return;
        }

        if style == AckStyle::Unacknowledged {
            if let Some(pending) = self.in_flight.take() {
                self.apply_command(&pending.command);
                self.finish(pending, Ok(()), now);
            }
            return;
        }

        let optimistic = self.config.update_policy == UpdatePolicy::Optimistic;
        let deadline = now + self.config.command_timeout;
        let mut apply = None;
        if let Some(pending) = self.in_flight.as_mut() {
            pending.deadline = Some(deadline);
            if optimistic && !pending.command.is_query() {
                pending.applied = true;
                apply = Some(pending.command);
            }
        }
        if let Some(command) = apply {
            self.apply_command(&command);
        }
    }

    // ---------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------

    /// Decode received bytes and act on every response they complete.
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant) {
        for item in self.codec.decode(bytes) {
            match item {
                Ok(Response::Status(report)) => {
                    self.merge(&report, now);
                    self.check_read_back(report.fields(), now);
                }
                Ok(Response::Ack(id)) => self.on_ack(id, now),
                Ok(Response::Nack(reason)) => self.on_nack(reason, now),
                Err(e) => {
                    self.decode_errors += 1;
                    warn!(error = %e, total = self.decode_errors, "dropping undecodable frame");
                }
            }
        }
    }

    fn written_in_flight(&self) -> Option<&Pending> {
        self.in_flight.as_ref().filter(|p| p.deadline.is_some())
    }

    fn on_ack(&mut self, id: Option<CommandId>, now: Instant) {
        let matches = match (self.written_in_flight(), id) {
            (Some(pending), Some(id)) => pending.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            debug!(?id, "ack matches no in-flight command");
            return;
        }
        if let Some(pending) = self.in_flight.take() {
            if !pending.applied {
                self.apply_command(&pending.command);
            }
            self.finish(pending, Ok(()), now);
        }
    }

    fn on_nack(&mut self, reason: String, now: Instant) {
        if self.written_in_flight().is_none() {
            debug!(reason = reason.as_str(), "nack with no in-flight command");
            return;
        }
        if let Some(pending) = self.in_flight.take() {
            if pending.applied {
                self.invalidate_fields(pending.command.fields());
            }
            self.finish(pending, Err(Error::Rejected(reason)), now);
        }
    }

    fn check_read_back(&mut self, reported: FieldSet, now: Instant) {
        let complete = match self.in_flight.as_mut() {
            Some(pending) if pending.style == AckStyle::ReadBack && pending.deadline.is_some() => {
                pending.awaiting.remove_all(reported);
                pending.awaiting.is_empty()
            }
            _ => false,
        };
        if complete {
            if let Some(pending) = self.in_flight.take() {
                self.finish(pending, Ok(()), now);
            }
        }
    }

    // ---------------------------------------------------------------
    // Time
    // ---------------------------------------------------------------

    /// Expire the in-flight command and schedule polls.
    pub fn on_tick(&mut self, now: Instant) {
        let expired = self
            .in_flight
            .as_ref()
            .and_then(|p| p.deadline)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            if let Some(pending) = self.in_flight.take() {
                warn!(id = %pending.id, command = %pending.command, "command timed out");
                if pending.applied {
                    self.invalidate_fields(pending.command.fields());
                }
                self.finish(pending, Err(Error::Timeout), now);
            }
        }

        if self.state.connection_state == ConnectionState::Connected
            && !self.query_pending()
            && (self.refresh_requested || self.poll_due_at().is_some_and(|due| due <= now))
        {
            debug!(refresh = self.refresh_requested, "polling rig state");
            self.refresh_requested = false;
            self.last_poll = now;
            self.enqueue(Command::QueryState, Origin::Poll);
        }
    }

    /// The next instant at which [`on_tick`](Self::on_tick) has work to do.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let command_deadline = self.in_flight.as_ref().and_then(|p| p.deadline);
        let poll_deadline = if self.state.connection_state == ConnectionState::Connected
            && !self.query_pending()
        {
            if self.refresh_requested {
                Some(now)
            } else {
                self.poll_due_at()
            }
        } else {
            None
        };
        match (command_deadline, poll_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn poll_due_at(&self) -> Option<Instant> {
        self.last_refresh
            .iter()
            .min()
            .map(|oldest| (*oldest).max(self.last_poll) + self.config.poll_interval)
    }

    fn query_pending(&self) -> bool {
        self.in_flight
            .iter()
            .chain(self.queue.iter())
            .any(|p| p.command.is_query())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// The driver started opening a transport.
    pub fn begin_connect(&mut self) {
        self.fault = None;
        self.last_fault = None;
        self.set_connection(ConnectionState::Connecting);
    }

    /// Queue the handshake query. The link becomes `Connected` when it
    /// completes; a failure is reported through [`take_fault`](Self::take_fault).
    pub fn start_handshake(&mut self) {
        self.enqueue(Command::QueryState, Origin::Handshake);
    }

    /// The link is up without a handshake.
    pub fn mark_connected(&mut self, now: Instant) {
        self.last_refresh = [now; 4];
        self.last_poll = now;
        self.refresh_requested = false;
        self.set_connection(ConnectionState::Connected);
    }

    /// The driver closed the link on request. Every pending command fails
    /// with [`Error::Cancelled`].
    pub fn on_disconnected(&mut self) {
        self.teardown(&Error::Cancelled);
        self.set_connection(ConnectionState::Disconnected);
    }

    /// The link failed. Every pending command fails with `error`.
    pub fn on_fault(&mut self, error: Error) {
        warn!(%error, "rig link faulted");
        self.teardown(&error);
        self.last_fault = Some(error);
        self.set_connection(ConnectionState::Faulted);
    }

    fn teardown(&mut self, error: &Error) {
        let pending: Vec<Pending> = self
            .in_flight
            .take()
            .into_iter()
            .chain(self.queue.drain(..))
            .collect();
        for p in pending {
            if let Origin::Caller(reply) = p.origin {
                self.events.push(RigEvent::CommandFailed {
                    id: p.id,
                    reason: error.to_string(),
                });
                let _ = reply.send(Err(error.clone()));
            }
        }
        self.codec.reset();
        self.state.invalidate();
        self.refresh_requested = false;
        self.fault = None;
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.state.connection_state != state {
            debug!(from = %self.state.connection_state, to = %state, "connection state change");
            self.state.connection_state = state;
            self.events.push(RigEvent::ConnectionChanged { state });
        }
    }

    // ---------------------------------------------------------------
    // State updates
    // ---------------------------------------------------------------

    fn finish(&mut self, pending: Pending, result: Result<()>, now: Instant) {
        match pending.origin {
            Origin::Caller(reply) => {
                match &result {
                    Ok(()) => {
                        debug!(id = %pending.id, command = %pending.command, "command confirmed");
                        self.events.push(RigEvent::CommandConfirmed { id: pending.id });
                    }
                    Err(e) => {
                        debug!(id = %pending.id, command = %pending.command, error = %e, "command failed");
                        self.events.push(RigEvent::CommandFailed {
                            id: pending.id,
                            reason: e.to_string(),
                        });
                    }
                }
                let _ = reply.send(result);
            }
            Origin::Handshake => match result {
                Ok(()) => {
                    debug!("handshake complete");
                    self.mark_connected(now);
                }
                Err(e) => {
                    warn!(error = %e, "handshake failed");
                    self.fault = Some(e);
                }
            },
            Origin::Poll => {
                if let Err(e) = result {
                    debug!(error = %e, "state poll failed");
                }
            }
        }
    }

    fn invalidate_fields(&mut self, fields: FieldSet) {
        for field in fields.iter() {
            match field {
                Field::VfoA => self.state.vfo_a_frequency_khz.mark_stale(),
                Field::VfoB => self.state.vfo_b_frequency_khz.mark_stale(),
                Field::Power => self.state.power_level_watts.mark_stale(),
                Field::Mode => self.state.mode.mark_stale(),
            }
        }
        self.refresh_requested = true;
    }

    fn apply_command(&mut self, command: &Command) {
        match *command {
            Command::SetFrequency(vfo, khz) => self.set_frequency(vfo, khz),
            Command::SetPower(watts) => self.set_power(watts),
            Command::SetMode(mode) => self.set_mode(mode),
            Command::QueryState => {}
        }
    }

    fn merge(&mut self, report: &StatusReport, now: Instant) {
        trace!(?report, "merging status report");
        if let Some(khz) = report.vfo_a_khz {
            self.set_frequency(Vfo::A, khz);
        }
        if let Some(khz) = report.vfo_b_khz {
            self.set_frequency(Vfo::B, khz);
        }
        if let Some(watts) = report.power_watts {
            self.set_power(watts);
        }
        if let Some(mode) = report.mode {
            self.set_mode(mode);
        }
        for field in report.fields().iter() {
            self.last_refresh[field_index(field)] = now;
        }
    }

    fn set_frequency(&mut self, vfo: Vfo, khz: u32) {
        let slot = self.state.frequency_mut(vfo);
        let changed = slot.known() != Some(khz);
        *slot = Reading::Known(khz);
        if changed {
            self.events.push(RigEvent::FrequencyChanged { vfo, khz });
        }
    }

    fn set_power(&mut self, watts: f32) {
        let changed = self.state.power_level_watts.known() != Some(watts);
        self.state.power_level_watts = Reading::Known(watts);
        if changed {
            self.events.push(RigEvent::PowerChanged { watts });
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        let changed = self.state.mode.known() != Some(mode);
        self.state.mode = Reading::Known(mode);
        if changed {
            self.events.push(RigEvent::ModeChanged { mode });
        }
    }
}

#[cfg(test)]
mod tests {
    use elecraft_core::FrequencyRange;
    use elecraft_protocol::{CatCodec, SetCommandMode};
    use elecraft_test_harness::LineCodec;
    use tokio::sync::oneshot::error::TryRecvError;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);
    const POLL: Duration = Duration::from_secs(1);

    fn limits() -> RigLimits {
        RigLimits {
            frequency_ranges: vec![FrequencyRange::new(1_800, 54_000)],
            max_power_watts: 100.0,
            supported_modes: Mode::ALL.to_vec(),
        }
    }

    fn engine_with(codec: impl Codec, policy: UpdatePolicy, now: Instant) -> Engine {
        let config = EngineConfig {
            update_policy: policy,
            command_timeout: TIMEOUT,
            poll_interval: POLL,
        };
        engine_with_config(codec, config, now)
    }

    fn engine_with_config(codec: impl Codec, config: EngineConfig, now: Instant) -> Engine {
        let mut engine = Engine::new(Box::new(codec), limits(), config, now);
        engine.begin_connect();
        engine.mark_connected(now);
        engine.drain_events();
        engine
    }

    fn submit(
        engine: &mut Engine,
        command: Command,
    ) -> (CommandId, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let id = engine.submit(command, tx).unwrap();
        (id, rx)
    }

    /// Transmit the next command and report a successful write.
    fn write(engine: &mut Engine, now: Instant) -> Vec<u8> {
        let bytes = engine.poll_transmit().expect("a command to transmit");
        engine.on_write_complete(Ok(()), now);
        bytes
    }

    #[test]
    fn submit_requires_connection() {
        let now = Instant::now();
        let mut engine = Engine::new(
            Box::new(LineCodec::new()),
            limits(),
            EngineConfig::default(),
            now,
        );
        let (tx, _rx) = oneshot::channel();
        assert_eq!(
            engine.submit(Command::SetPower(5.0), tx),
            Err(Error::NotConnected)
        );
        assert!(engine.poll_transmit().is_none());
    }

    #[test]
    fn validation_fails_before_queueing() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            engine.submit(Command::SetPower(150.0), tx),
            Err(Error::Validation(_))
        ));
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            engine.submit(Command::SetFrequency(Vfo::B, 60_000), tx),
            Err(Error::Validation(_))
        ));
        assert_eq!(engine.pending_len(), 0);
        assert!(engine.poll_transmit().is_none());
    }

    #[test]
    fn confirmed_policy_applies_on_ack() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (id, mut rx) = submit(&mut engine, Command::SetFrequency(Vfo::A, 14_074));

        assert_eq!(write(&mut engine, now), b"1 FA 14074\n");
        assert_eq!(engine.state().vfo_a_frequency_khz, Reading::Unknown);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        engine.on_bytes(b"ACK 1\n", now);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert_eq!(engine.state().vfo_a_frequency_khz, Reading::Known(14_074));
        assert_eq!(
            engine.drain_events(),
            vec![
                RigEvent::FrequencyChanged {
                    vfo: Vfo::A,
                    khz: 14_074
                },
                RigEvent::CommandConfirmed { id },
            ]
        );
    }

    #[test]
    fn optimistic_policy_applies_on_write() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Optimistic, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetMode(Mode::CW));
        write(&mut engine, now);
        assert_eq!(engine.state().mode, Reading::Known(Mode::CW));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        engine.on_bytes(b"ACK\n", now);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert_eq!(engine.state().mode, Reading::Known(Mode::CW));
    }

    #[test]
    fn optimistic_nack_marks_stale_and_refreshes() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Optimistic, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetPower(50.0));
        write(&mut engine, now);
        assert_eq!(engine.state().power_level_watts, Reading::Known(50.0));

        engine.on_bytes(b"NAK busy\n", now);
        assert_eq!(rx.try_recv(), Ok(Err(Error::Rejected("busy".into()))));
        assert_eq!(engine.state().power_level_watts, Reading::Stale(50.0));

        assert_eq!(engine.next_deadline(now), Some(now));
        engine.on_tick(now);
        assert_eq!(write(&mut engine, now), b"2 Q\n");
    }

    #[test]
    fn ack_without_id_completes_oldest() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (_a, mut rx_a) = submit(&mut engine, Command::SetFrequency(Vfo::A, 7_074));
        let (_b, mut rx_b) = submit(&mut engine, Command::SetFrequency(Vfo::B, 3_573));

        assert_eq!(write(&mut engine, now), b"1 FA 7074\n");
        assert!(engine.poll_transmit().is_none(), "one command in flight");

        engine.on_bytes(b"ACK\n", now);
        assert_eq!(rx_a.try_recv(), Ok(Ok(())));
        assert_eq!(rx_b.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(write(&mut engine, now), b"2 FB 3573\n");
        engine.on_bytes(b"ACK 2\n", now);
        assert_eq!(rx_b.try_recv(), Ok(Ok(())));
        assert_eq!(engine.state().vfo_b_frequency_khz, Reading::Known(3_573));
    }

    #[test]
    fn ack_with_wrong_id_is_ignored() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetPower(10.0));
        write(&mut engine, now);
        engine.on_bytes(b"ACK 99\n", now);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn timeout_fails_and_advances_queue() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (_a, mut rx_a) = submit(&mut engine, Command::SetPower(10.0));
        let (_b, _rx_b) = submit(&mut engine, Command::SetPower(20.0));
        write(&mut engine, now);

        assert_eq!(engine.next_deadline(now), Some(now + TIMEOUT));
        engine.on_tick(now + TIMEOUT - Duration::from_millis(1));
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));

        engine.on_tick(now + TIMEOUT);
        assert_eq!(rx_a.try_recv(), Ok(Err(Error::Timeout)));
        assert_eq!(write(&mut engine, now + TIMEOUT), b"2 PC 20\n");
    }

    #[test]
    fn read_back_confirms_with_reported_value() {
        let now = Instant::now();
        let mut engine = engine_with(CatCodec::new(), UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetPower(12.5));
        assert_eq!(write(&mut engine, now), b"PC013;PC;");

        engine.on_bytes(b"PC0", now);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        engine.on_bytes(b"13;", now);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert_eq!(engine.state().power_level_watts, Reading::Known(13.0));
    }

    #[test]
    fn read_back_waits_for_its_own_field() {
        let now = Instant::now();
        let mut engine = engine_with(CatCodec::new(), UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetFrequency(Vfo::B, 7_074));
        write(&mut engine, now);

        engine.on_bytes(b"FA00014074000;", now);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(engine.state().vfo_a_frequency_khz, Reading::Known(14_074));

        engine.on_bytes(b"FB00007074000;", now);
        assert_eq!(rx.try_recv(), Ok(Ok(())));
    }

    #[test]
    fn cat_error_response_rejects_command() {
        let now = Instant::now();
        let mut engine = engine_with(CatCodec::new(), UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetMode(Mode::AM));
        write(&mut engine, now);
        engine.on_bytes(b"?;", now);
        assert!(matches!(rx.try_recv(), Ok(Err(Error::Rejected(_)))));
        assert_eq!(engine.state().mode, Reading::Unknown);
    }

    #[test]
    fn unacknowledged_completes_on_write() {
        let now = Instant::now();
        let codec = CatCodec::new().with_set_command_mode(SetCommandMode::NoVerify);
        let mut engine = engine_with(codec, UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetFrequency(Vfo::A, 21_074));
        assert_eq!(write(&mut engine, now), b"FA00021074000;");
        assert_eq!(rx.try_recv(), Ok(Ok(())));
        assert_eq!(engine.state().vfo_a_frequency_khz, Reading::Known(21_074));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn poll_issues_one_query_until_answered() {
        let t0 = Instant::now();
        let config = EngineConfig {
            update_policy: UpdatePolicy::Confirmed,
            command_timeout: POLL * 5,
            poll_interval: POLL,
        };
        let mut engine = engine_with_config(CatCodec::new(), config, t0);

        engine.on_tick(t0 + POLL / 2);
        assert!(engine.poll_transmit().is_none());
        assert_eq!(engine.next_deadline(t0), Some(t0 + POLL));

        engine.on_tick(t0 + POLL);
        assert_eq!(write(&mut engine, t0 + POLL), b"FA;FB;PC;MD;");

        // Interval elapses again with the query unanswered.
        engine.on_tick(t0 + POLL * 2);
        assert_eq!(engine.pending_len(), 1);
        assert!(engine.poll_transmit().is_none());

        let t1 = t0 + POLL * 2;
        engine.on_bytes(b"FA00014074000;FB00007074000;PC100;MD2;", t1);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.next_deadline(t1), Some(t1 + POLL));
        engine.on_tick(t1 + POLL);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn failed_poll_waits_a_full_interval() {
        let t0 = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, t0);

        engine.on_tick(t0 + POLL);
        assert_eq!(write(&mut engine, t0 + POLL), b"1 Q\n");

        let t1 = t0 + POLL + POLL / 10;
        engine.on_bytes(b"NAK busy\n", t1);
        assert_eq!(engine.pending_len(), 0);

        // Fields are still a full interval old, but the query was just sent.
        engine.on_tick(t1);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.next_deadline(t1), Some(t0 + POLL * 2));

        engine.on_tick(t0 + POLL * 2);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn incomplete_poll_answer_does_not_repoll_at_once() {
        let t0 = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, t0);

        engine.on_tick(t0 + POLL);
        write(&mut engine, t0 + POLL);
        let t1 = t0 + POLL + POLL / 10;
        engine.on_bytes(b"FA 14074\nACK 1\n", t1);
        assert_eq!(engine.pending_len(), 0);

        engine.on_tick(t1);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.next_deadline(t1), Some(t0 + POLL * 2));
    }

    #[test]
    fn status_pushes_update_state_and_emit_events() {
        let now = Instant::now();
        let mut engine = engine_with(CatCodec::new(), UpdatePolicy::Confirmed, now);
        engine.on_bytes(b"MD3;MD3;FB00003573000;", now);
        assert_eq!(engine.state().mode, Reading::Known(Mode::CW));
        assert_eq!(engine.state().vfo_b_frequency_khz, Reading::Known(3_573));
        assert_eq!(
            engine.drain_events(),
            vec![
                RigEvent::ModeChanged { mode: Mode::CW },
                RigEvent::FrequencyChanged {
                    vfo: Vfo::B,
                    khz: 3_573
                },
            ]
        );
    }

    #[test]
    fn decode_errors_are_counted_not_fatal() {
        let now = Instant::now();
        let mut engine = engine_with(CatCodec::new(), UpdatePolicy::Confirmed, now);
        engine.on_bytes(b"FA12;MD9;", now);
        assert_eq!(engine.decode_errors(), 1);
        assert_eq!(engine.state().mode, Reading::Known(Mode::DataR));
        assert_eq!(engine.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn disconnect_cancels_every_pending_command_once() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        engine.on_bytes(b"PC 50\n", now);
        let (_a, mut rx_a) = submit(&mut engine, Command::SetPower(10.0));
        let (_b, mut rx_b) = submit(&mut engine, Command::SetPower(20.0));
        write(&mut engine, now);
        engine.on_bytes(b"FA 140", now);

        engine.on_disconnected();
        assert_eq!(rx_a.try_recv(), Ok(Err(Error::Cancelled)));
        assert_eq!(rx_b.try_recv(), Ok(Err(Error::Cancelled)));
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.codec().buffered(), 0);
        assert_eq!(engine.state().power_level_watts, Reading::Stale(50.0));
        assert_eq!(engine.connection_state(), ConnectionState::Disconnected);

        // A late ack after teardown touches nothing.
        engine.on_bytes(b"ACK\n", now);
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn link_failure_on_write_requests_fault() {
        let now = Instant::now();
        let mut engine = engine_with(LineCodec::new(), UpdatePolicy::Confirmed, now);
        let (_id, mut rx) = submit(&mut engine, Command::SetPower(10.0));
        engine.poll_transmit();
        engine.on_write_complete(Err(Error::ConnectionLost), now);
        assert_eq!(rx.try_recv(), Ok(Err(Error::ConnectionLost)));

        let error = engine.take_fault().expect("fault requested");
        engine.on_fault(error);
        assert_eq!(engine.connection_state(), ConnectionState::Faulted);
        assert_eq!(engine.last_fault(), Some(&Error::ConnectionLost));
        assert!(engine.take_fault().is_none());
    }

    #[test]
    fn handshake_connects_on_full_report() {
        let t0 = Instant::now();
        let mut engine = Engine::new(
            Box::new(CatCodec::new()),
            limits(),
            EngineConfig::default(),
            t0,
        );
        engine.begin_connect();
        engine.start_handshake();
        assert_eq!(write(&mut engine, t0), b"FA;FB;PC;MD;");
        engine.on_bytes(b"FA00014074000;FB00007074000;PC", t0);
        assert_eq!(engine.connection_state(), ConnectionState::Connecting);
        engine.on_bytes(b"100;MD2;", t0);
        assert_eq!(engine.connection_state(), ConnectionState::Connected);
        assert_eq!(engine.state().power_level_watts, Reading::Known(100.0));
    }

    #[test]
    fn handshake_timeout_requests_fault() {
        let t0 = Instant::now();
        let mut engine = Engine::new(
            Box::new(CatCodec::new()),
            limits(),
            EngineConfig::default(),
            t0,
        );
        engine.begin_connect();
        engine.start_handshake();
        write(&mut engine, t0);
        engine.on_tick(t0 + Duration::from_secs(1));
        assert_eq!(engine.take_fault(), Some(Error::Timeout));
        assert_eq!(engine.connection_state(), ConnectionState::Connecting);
    }
}
