//! The rig controller actor and its handle.
//!
//! One spawned task owns the [`Engine`], the transport, and the connector.
//! Callers talk to it through [`RigController`], a cheap-to-clone handle.
//! Requests, received bytes, and timers are serialised through a single
//! `tokio::select! { biased; }` loop:
//!
//! 1. Cancellation
//! 2. Caller requests (submit, connect, disconnect)
//! 3. Inbound bytes from the transport
//! 4. The engine's next deadline (command timeout, poll) and the connect
//!    deadline
//!
//! State is published on a [`watch`] channel after every step and changes
//! are broadcast as [`RigEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use elecraft_core::{
    CommandId, ConnectionState, Connector, Error, Mode, Result, RigEvent, RigLimits, RigState,
    Transport, TransportConfig, Vfo,
};
use elecraft_protocol::Command;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{Engine, validate_command};

/// How long one transport read waits before the loop re-checks its timers.
const RECEIVE_SLICE: Duration = Duration::from_millis(100);

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Lifecycle settings the actor applies around the engine.
#[derive(Debug, Clone)]
pub(crate) struct LinkSettings {
    pub(crate) connect_timeout: Duration,
    pub(crate) handshake: bool,
}

enum Request {
    Submit {
        command: Command,
        accepted: oneshot::Sender<Result<CommandId>>,
        done: oneshot::Sender<Result<()>>,
    },
    Connect {
        config: TransportConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// The eventual outcome of one issued command.
///
/// Returned as soon as the command is queued. Dropping it does not cancel
/// the command.
#[derive(Debug)]
pub struct CommandHandle {
    id: CommandId,
    rx: oneshot::Receiver<Result<()>>,
}

impl CommandHandle {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Wait until the rig confirms the command or it fails.
    pub async fn confirmed(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(Error::Cancelled))
    }
}

struct Shared {
    req_tx: mpsc::Sender<Request>,
    state_rx: watch::Receiver<RigState>,
    event_tx: broadcast::Sender<RigEvent>,
    decode_errors: Arc<AtomicU64>,
    limits: RigLimits,
    transport_config: TransportConfig,
    cancel: CancellationToken,
}

/// Handle to a running rig controller.
///
/// Cloning is cheap; every clone talks to the same actor. The actor stops
/// when [`shutdown`](Self::shutdown) is called or the last handle is dropped.
#[derive(Clone)]
pub struct RigController {
    shared: Arc<Shared>,
}

impl RigController {
    /// Spawn the actor. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(
        engine: Engine,
        connector: Box<dyn Connector>,
        transport_config: TransportConfig,
        settings: LinkSettings,
    ) -> Self {
        let (req_tx, req_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(engine.state().clone());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let decode_errors = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        let limits = engine.limits().clone();

        let actor = Actor {
            engine,
            connector,
            settings,
            link: None,
            connect_waiter: None,
            state_tx,
            event_tx: event_tx.clone(),
            decode_errors: Arc::clone(&decode_errors),
        };
        tokio::spawn(actor.run(req_rx, cancel.clone()));

        RigController {
            shared: Arc::new(Shared {
                req_tx,
                state_rx,
                event_tx,
                decode_errors,
                limits,
                transport_config,
                cancel,
            }),
        }
    }

    // ---------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------

    /// Current snapshot of the rig state.
    pub fn state(&self) -> RigState {
        self.shared.state_rx.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn watch(&self) -> watch::Receiver<RigState> {
        self.shared.state_rx.clone()
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<RigEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state_rx.borrow().connection_state
    }

    pub fn vfo_a_frequency_khz(&self) -> Option<u32> {
        self.shared.state_rx.borrow().vfo_a_frequency_khz.value()
    }

    pub fn vfo_b_frequency_khz(&self) -> Option<u32> {
        self.shared.state_rx.borrow().vfo_b_frequency_khz.value()
    }

    pub fn power_level_watts(&self) -> Option<f32> {
        self.shared.state_rx.borrow().power_level_watts.value()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.shared.state_rx.borrow().mode.value()
    }

    /// Frames dropped as undecodable since the controller was built.
    pub fn decode_error_count(&self) -> u64 {
        self.shared.decode_errors.load(Ordering::Relaxed)
    }

    /// The limits setters are validated against.
    pub fn limits(&self) -> &RigLimits {
        &self.shared.limits
    }

    // ---------------------------------------------------------------
    // Setters
    // ---------------------------------------------------------------

    pub async fn set_vfo_a_frequency(&self, khz: u32) -> Result<CommandHandle> {
        self.submit(Command::SetFrequency(Vfo::A, khz)).await
    }

    pub async fn set_vfo_b_frequency(&self, khz: u32) -> Result<CommandHandle> {
        self.submit(Command::SetFrequency(Vfo::B, khz)).await
    }

    pub async fn set_frequency(&self, vfo: Vfo, khz: u32) -> Result<CommandHandle> {
        self.submit(Command::SetFrequency(vfo, khz)).await
    }

    pub async fn set_power_level(&self, watts: f32) -> Result<CommandHandle> {
        self.submit(Command::SetPower(watts)).await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<CommandHandle> {
        self.submit(Command::SetMode(mode)).await
    }

    /// Ask the rig for every tracked field now instead of waiting for the
    /// next poll.
    pub async fn refresh(&self) -> Result<CommandHandle> {
        self.submit(Command::QueryState).await
    }

    /// Validate and queue a command.
    ///
    /// Fails with [`Error::Validation`] before any I/O if the value is out of
    /// range, and with [`Error::NotConnected`] unless the link is up.
    pub async fn submit(&self, command: Command) -> Result<CommandHandle> {
        validate_command(&self.shared.limits, &command)?;

        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Request::Submit {
            command,
            accepted: accepted_tx,
            done: done_tx,
        })
        .await?;
        let id = accepted_rx.await.map_err(|_| Error::NotConnected)??;
        Ok(CommandHandle { id, rx: done_rx })
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Open a transport for `config` and wait until the link is
    /// `Connected` or `Faulted`.
    ///
    /// Fails with [`Error::AlreadyConnected`] while connecting or connected.
    /// From `Faulted` or `Disconnected` a new transport is opened.
    pub async fn connect(&self, config: TransportConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Connect { config, reply }).await?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Connect using the transport configuration given to the builder.
    pub async fn connect_default(&self) -> Result<()> {
        self.connect(self.shared.transport_config.clone()).await
    }

    /// The transport configuration given to the builder.
    pub fn transport_config(&self) -> &TransportConfig {
        &self.shared.transport_config
    }

    /// Close the link. Every pending command fails with [`Error::Cancelled`].
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Disconnect { reply }).await?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Stop the actor. The link is closed as by [`disconnect`](Self::disconnect).
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.shared
            .req_tx
            .send(request)
            .await
            .map_err(|_| Error::NotConnected)
    }
}

struct ConnectWaiter {
    reply: oneshot::Sender<Result<()>>,
    deadline: Instant,
}

/// How a transport open ended.
enum Opening<T> {
    Finished(T),
    /// A disconnect arrived first; the sender acknowledges it.
    Abandoned(oneshot::Sender<Result<()>>),
}

struct Actor {
    engine: Engine,
    connector: Box<dyn Connector>,
    settings: LinkSettings,
    link: Option<Box<dyn Transport>>,
    connect_waiter: Option<ConnectWaiter>,
    state_tx: watch::Sender<RigState>,
    event_tx: broadcast::Sender<RigEvent>,
    decode_errors: Arc<AtomicU64>,
}

impl Actor {
    async fn run(mut self, mut req_rx: mpsc::Receiver<Request>, cancel: CancellationToken) {
        let mut recv_buf = [0u8; 256];

        loop {
            self.settle().await;

            let now = Instant::now();
            let deadline = [
                self.engine.next_deadline(now),
                self.connect_waiter.as_ref().map(|w| w.deadline),
            ]
            .into_iter()
            .flatten()
            .min();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("rig controller cancelled");
                    break;
                }

                req = req_rx.recv() => {
                    match req {
                        Some(req) => self.handle_request(req, &mut req_rx).await,
                        None => {
                            debug!("all controller handles dropped");
                            break;
                        }
                    }
                }

                result = read_link(&mut self.link, &mut recv_buf) => {
                    match result {
                        Ok(0) => self.fault(Error::ConnectionLost).await,
                        Ok(n) => {
                            self.engine.on_bytes(&recv_buf[..n], Instant::now());
                            self.decode_errors
                                .store(self.engine.decode_errors(), Ordering::Relaxed);
                        }
                        Err(Error::Timeout) => {}
                        Err(e) => self.fault(e).await,
                    }
                }

                _ = sleep_until(deadline) => {
                    let now = Instant::now();
                    if self.connect_waiter.as_ref().is_some_and(|w| w.deadline <= now) {
                        warn!("connect timed out");
                        self.fault(Error::Timeout).await;
                    } else {
                        self.engine.on_tick(now);
                    }
                }
            }
        }

        self.close_link().await;
        self.engine.on_disconnected();
        self.resolve_connect_waiter();
        self.publish();
        debug!("rig controller stopped");
    }

    /// Write whatever the engine has ready, handle faults, and publish.
    async fn settle(&mut self) {
        loop {
            if let Some(error) = self.engine.take_fault() {
                self.fault(error).await;
                continue;
            }
            let Some(bytes) = self.engine.poll_transmit() else {
                break;
            };
            let result = match self.link.as_mut() {
                Some(link) => link.send(&bytes).await,
                None => Err(Error::NotConnected),
            };
            self.engine.on_write_complete(result, Instant::now());
        }
        self.resolve_connect_waiter();
        self.publish();
    }

    async fn handle_request(&mut self, req: Request, req_rx: &mut mpsc::Receiver<Request>) {
        match req {
            Request::Submit {
                command,
                accepted,
                done,
            } => {
                let result = self.engine.submit(command, done);
                let _ = accepted.send(result);
            }
            Request::Connect { config, reply } => self.connect(config, reply, req_rx).await,
            Request::Disconnect { reply } => {
                info!("disconnecting from rig");
                self.close_link().await;
                self.engine.on_disconnected();
                self.resolve_connect_waiter();
                self.publish();
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn connect(
        &mut self,
        config: TransportConfig,
        reply: oneshot::Sender<Result<()>>,
        req_rx: &mut mpsc::Receiver<Request>,
    ) {
        if matches!(
            self.engine.connection_state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            let _ = reply.send(Err(Error::AlreadyConnected));
            return;
        }

        info!(port = %config.port, baud_rate = config.baud_rate, "connecting to rig");
        let deadline = Instant::now() + self.settings.connect_timeout;
        self.engine.begin_connect();
        self.publish();

        // Requests are still served while the transport opens so that a
        // disconnect can abandon it.
        let opened = {
            let open = tokio::time::timeout_at(deadline, self.connector.open(&config));
            tokio::pin!(open);
            let mut requests_open = true;
            loop {
                tokio::select! {
                    biased;

                    req = req_rx.recv(), if requests_open => match req {
                        Some(Request::Disconnect { reply: ack }) => break Opening::Abandoned(ack),
                        Some(Request::Connect { reply: other, .. }) => {
                            let _ = other.send(Err(Error::AlreadyConnected));
                        }
                        Some(Request::Submit {
                            command,
                            accepted,
                            done,
                        }) => {
                            let _ = accepted.send(self.engine.submit(command, done));
                        }
                        None => requests_open = false,
                    },

                    opened = &mut open => break Opening::Finished(opened),
                }
            }
        };

        let opened = match opened {
            Opening::Finished(opened) => opened,
            Opening::Abandoned(ack) => {
                info!("disconnect requested while opening transport");
                self.engine.on_disconnected();
                self.publish();
                let _ = reply.send(Err(Error::Cancelled));
                let _ = ack.send(Ok(()));
                return;
            }
        };
        let mut transport = match opened {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                self.engine.on_fault(e.clone());
                self.publish();
                let _ = reply.send(Err(e));
                return;
            }
            Err(_) => {
                warn!("timed out opening transport");
                self.engine.on_fault(Error::Timeout);
                self.publish();
                let _ = reply.send(Err(Error::Timeout));
                return;
            }
        };

        let startup = self.engine.codec().startup_command();
        if let Some(startup) = startup {
            if let Err(e) = transport.send(&startup).await {
                let _ = transport.close().await;
                self.engine.on_fault(e.clone());
                self.publish();
                let _ = reply.send(Err(e));
                return;
            }
        }
        self.link = Some(transport);

        if self.settings.handshake {
            self.engine.start_handshake();
            self.connect_waiter = Some(ConnectWaiter { reply, deadline });
        } else {
            self.engine.mark_connected(Instant::now());
            self.publish();
            info!("connected to rig");
            let _ = reply.send(Ok(()));
        }
    }

    /// Close the transport after a link failure and fault the engine.
    async fn fault(&mut self, error: Error) {
        if let Some(mut link) = self.link.take() {
            let _ = link.close().await;
        }
        self.engine.on_fault(error);
        self.resolve_connect_waiter();
    }

    /// Close the transport on request, telling the rig first.
    async fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            let shutdown = self.engine.codec().shutdown_command();
            if let Some(shutdown) = shutdown {
                if let Err(e) = link.send(&shutdown).await {
                    debug!(error = %e, "failed to send shutdown command");
                }
            }
            if let Err(e) = link.close().await {
                debug!(error = %e, "failed to close transport");
            }
        }
    }

    fn resolve_connect_waiter(&mut self) {
        let outcome = match self.engine.connection_state() {
            ConnectionState::Connecting => return,
            ConnectionState::Connected => Ok(()),
            ConnectionState::Faulted => Err(self
                .engine
                .last_fault()
                .cloned()
                .unwrap_or(Error::ConnectionLost)),
            ConnectionState::Disconnected => Err(Error::Cancelled),
        };
        if let Some(waiter) = self.connect_waiter.take() {
            if outcome.is_ok() {
                info!("connected to rig");
            }
            self.publish();
            let _ = waiter.reply.send(outcome);
        }
    }

    fn publish(&mut self) {
        for event in self.engine.drain_events() {
            // No subscribers is fine.
            let _ = self.event_tx.send(event);
        }
        let engine = &self.engine;
        self.state_tx.send_if_modified(|state| {
            if state != engine.state() {
                *state = engine.state().clone();
                true
            } else {
                false
            }
        });
    }
}

async fn read_link(link: &mut Option<Box<dyn Transport>>, buf: &mut [u8]) -> Result<usize> {
    match link {
        Some(link) => link.receive(buf, RECEIVE_SLICE).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
