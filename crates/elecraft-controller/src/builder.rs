//! ControllerBuilder -- fluent builder for constructing [`RigController`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, the codec, update policy, and timeout values
//! before the controller actor is spawned. Building does not open the port;
//! call [`RigController::connect`] or [`RigController::connect_default`].
//!
//! # Example
//!
//! ```no_run
//! use elecraft_controller::ControllerBuilder;
//! use elecraft_protocol::models::k3;
//! use std::time::Duration;
//!
//! # async fn example() -> elecraft_core::Result<()> {
//! let rig = ControllerBuilder::new(k3())
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_millis(300))
//!     .build()?;
//! rig.connect_default().await?;
//! let handle = rig.set_vfo_a_frequency(14_074).await?;
//! handle.confirmed().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use elecraft_core::error::{Error, Result};
use elecraft_core::transport::{Connector, TransportConfig};
use elecraft_core::types::RigLimits;
use elecraft_protocol::cat::{CatCodec, SetCommandMode};
use elecraft_protocol::codec::Codec;
use elecraft_protocol::models::ElecraftModel;
use elecraft_transport::SerialConnector;
use tokio::time::Instant;

use crate::controller::{LinkSettings, RigController};
use crate::engine::{Engine, EngineConfig, UpdatePolicy};

/// Fluent builder for [`RigController`].
///
/// All configuration has sensible defaults derived from the
/// [`ElecraftModel`], so the simplest usage is:
///
/// ```ignore
/// let rig = ControllerBuilder::new(k3())
///     .serial_port("/dev/ttyUSB0")
///     .build()?;
/// ```
pub struct ControllerBuilder {
    model: ElecraftModel,
    limits: Option<RigLimits>,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    codec: Option<Box<dyn Codec>>,
    set_command_mode: SetCommandMode,
    auto_info: bool,
    engine: EngineConfig,
    connect_timeout: Duration,
    handshake: bool,
}

impl ControllerBuilder {
    /// Create a new builder for the given Elecraft model.
    pub fn new(model: ElecraftModel) -> Self {
        ControllerBuilder {
            model,
            limits: None,
            serial_port: None,
            baud_rate: None,
            codec: None,
            set_command_mode: SetCommandMode::default(),
            auto_info: true,
            engine: EngineConfig::default(),
            connect_timeout: Duration::from_secs(2),
            handshake: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate for this model.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Validate setters against `limits` instead of the model's.
    pub fn limits(mut self, limits: RigLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Use `codec` instead of the CAT codec.
    ///
    /// [`set_command_mode`](Self::set_command_mode) and
    /// [`auto_info`](Self::auto_info) only configure the CAT codec and are
    /// ignored once a codec is given.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Set how SET commands are confirmed: [`Verify`](SetCommandMode::Verify)
    /// (default) appends a read-back query, [`NoVerify`](SetCommandMode::NoVerify)
    /// completes them as soon as they are written.
    pub fn set_command_mode(mut self, mode: SetCommandMode) -> Self {
        self.set_command_mode = mode;
        self
    }

    /// Enable or disable auto-information (`AI2;`) on connect (default: on).
    pub fn auto_info(mut self, enabled: bool) -> Self {
        self.auto_info = enabled;
        self
    }

    /// When written values reach the state (default: [`UpdatePolicy::Confirmed`]).
    pub fn update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.engine.update_policy = policy;
        self
    }

    /// Set the timeout for a single command's confirmation (default: 500ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.engine.command_timeout = timeout;
        self
    }

    /// Set how old a field may get before the rig is polled (default: 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.engine.poll_interval = interval;
        self
    }

    /// Bound on opening the transport plus the handshake (default: 2s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Query the rig before reporting `Connected` (default: on).
    pub fn handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    /// The transport configuration `connect_default()` will use.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.serial_port.clone().unwrap_or_default())
            .with_baud_rate(self.baud_rate.unwrap_or(self.model.default_baud_rate))
    }

    /// Spawn a controller that opens transports through `connector`.
    ///
    /// This is the primary entry point for testing (pass a `MockConnector`
    /// from `elecraft-test-harness`). Must be called inside a Tokio runtime.
    pub fn build_with_connector(self, connector: impl Connector + 'static) -> Result<RigController> {
        if self.engine.command_timeout.is_zero() {
            return Err(Error::Validation("command_timeout must be non-zero".into()));
        }
        if self.engine.poll_interval.is_zero() {
            return Err(Error::Validation("poll_interval must be non-zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Validation("connect_timeout must be non-zero".into()));
        }

        let transport_config = self.transport_config();
        let limits = self.limits.unwrap_or_else(|| self.model.limits());
        let codec = match self.codec {
            Some(codec) => codec,
            None => Box::new(
                CatCodec::new()
                    .with_set_command_mode(self.set_command_mode)
                    .with_auto_info(self.auto_info),
            ),
        };
        let engine = Engine::new(codec, limits, self.engine, Instant::now());
        let settings = LinkSettings {
            connect_timeout: self.connect_timeout,
            handshake: self.handshake,
        };
        Ok(RigController::spawn(
            engine,
            Box::new(connector),
            transport_config,
            settings,
        ))
    }

    /// Spawn a controller that opens serial ports.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    /// The baud rate defaults to the model's default if not overridden.
    pub fn build(self) -> Result<RigController> {
        if self.serial_port.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Validation("serial_port is required for build()".into()));
        }
        self.build_with_connector(SerialConnector)
    }
}
