// elecraft-ctl -- CLI tool for exercising the rig controller against real
// hardware or an in-process simulated radio.
//
// Usage:
//   elecraft-ctl --model K3 --port /dev/ttyUSB0 status
//   elecraft-ctl --port /dev/ttyUSB0 freq set 14074 --vfo a
//   elecraft-ctl --mock mode set CW
//   elecraft-ctl --mock -vv monitor --duration 10
//   elecraft-ctl list

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use elecraft::models::{self, ElecraftModel};
use elecraft::{
    ControllerBuilder, Mode, Reading, RigController, SetCommandMode, TransportConfig,
    UpdatePolicy, Vfo, format_freq_mhz, format_power,
};
use elecraft_test_harness::{MockConnector, MockHandle, SimulatedRig};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// elecraft-ctl -- read and set an Elecraft transceiver from the command line.
#[derive(Parser)]
#[command(name = "elecraft-ctl", version, about)]
struct Cli {
    /// Rig model name (K3, K3S, KX3, KX2, K4).
    #[arg(long, default_value = "K3")]
    model: String,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Required unless --mock.
    #[arg(long)]
    port: Option<String>,

    /// Override the default baud rate for this model.
    #[arg(long)]
    baud: Option<u32>,

    /// Talk to an in-process simulated radio instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Complete set commands when written instead of reading them back.
    #[arg(long)]
    no_verify: bool,

    /// Show written values before the rig confirms them.
    #[arg(long)]
    optimistic: bool,

    /// Command confirmation timeout in milliseconds.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print every property, and disconnect.
    Status,

    /// VFO frequency operations.
    Freq {
        #[command(subcommand)]
        action: FreqAction,
    },

    /// Transmit power operations.
    Power {
        #[command(subcommand)]
        action: PowerAction,
    },

    /// Operating mode operations.
    Mode {
        #[command(subcommand)]
        action: ModeAction,
    },

    /// Print rig events as they arrive.
    Monitor {
        /// Seconds to monitor (0 = until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// List supported models.
    List,
}

#[derive(Subcommand)]
enum FreqAction {
    /// Read a VFO frequency.
    Get {
        #[arg(long, value_enum, default_value_t = VfoArg::A)]
        vfo: VfoArg,
    },
    /// Tune a VFO.
    Set {
        /// Frequency in kHz (e.g. 14074).
        khz: u32,
        #[arg(long, value_enum, default_value_t = VfoArg::A)]
        vfo: VfoArg,
    },
}

#[derive(Subcommand)]
enum PowerAction {
    /// Read the power level.
    Get,
    /// Set the power level.
    Set {
        /// Power in watts.
        watts: f32,
    },
}

#[derive(Subcommand)]
enum ModeAction {
    /// Read the operating mode.
    Get,
    /// Set the operating mode.
    Set {
        /// LSB, USB, CW, CW-R, AM, FM, DATA, DATA-R.
        mode: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VfoArg {
    A,
    B,
}

impl From<VfoArg> for Vfo {
    fn from(v: VfoArg) -> Self {
        match v {
            VfoArg::A => Vfo::A,
            VfoArg::B => Vfo::B,
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).context("invalid log filter")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn lookup_model(name: &str) -> Result<ElecraftModel> {
    models::model_by_name(name).with_context(|| {
        format!("unknown Elecraft model '{name}'. Supported models: K3, K3S, KX3, KX2, K4")
    })
}

/// A connected controller, plus the simulated radio's handle when `--mock`
/// is in use.
struct Session {
    rig: RigController,
    _mock: Option<MockHandle>,
}

async fn connect(cli: &Cli) -> Result<Session> {
    let model = lookup_model(&cli.model)?;
    let mut builder = ControllerBuilder::new(model.clone())
        .command_timeout(Duration::from_millis(cli.timeout_ms));
    if cli.no_verify {
        builder = builder.set_command_mode(SetCommandMode::NoVerify);
    }
    if cli.optimistic {
        builder = builder.update_policy(UpdatePolicy::Optimistic);
    }

    if cli.mock {
        if cli.port.is_some() {
            bail!("--port and --mock are mutually exclusive");
        }
        let connector = MockConnector::new();
        let handle = connector.push_transport();
        SimulatedRig::new()
            .with_max_power(model.max_power_watts as u16)
            .attach(&handle);
        let rig = builder.build_with_connector(connector)?;
        rig.connect(TransportConfig::new("mock"))
            .await
            .context("failed to connect to simulated rig")?;
        info!(model = model.name, "connected to simulated rig");
        return Ok(Session {
            rig,
            _mock: Some(handle),
        });
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required unless --mock is given")?;
    builder = builder.serial_port(port);
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }
    let rig = builder.build()?;
    rig.connect_default()
        .await
        .with_context(|| format!("failed to connect to {} on {port}", model.name))?;
    info!(model = model.name, port, "connected");
    Ok(Session { rig, _mock: None })
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn show<T: Copy>(reading: Reading<T>, format: impl Fn(T) -> String) -> String {
    match reading {
        Reading::Unknown => "unknown".to_string(),
        Reading::Known(v) => format(v),
        Reading::Stale(v) => format!("{} (stale)", format(v)),
    }
}

fn cmd_status(rig: &RigController) -> Result<()> {
    let state = rig.state();
    println!("Rig Status");
    println!("  Connection:  {:?}", state.connection_state);
    println!("  VFO A:       {}", show(state.vfo_a_frequency_khz, format_freq_mhz));
    println!("  VFO B:       {}", show(state.vfo_b_frequency_khz, format_freq_mhz));
    println!("  Power:       {}", show(state.power_level_watts, format_power));
    println!("  Mode:        {}", show(state.mode, |m: Mode| m.to_string()));
    println!("  Decode errs: {}", rig.decode_error_count());
    Ok(())
}

fn cmd_freq_get(rig: &RigController, vfo: Vfo) -> Result<()> {
    println!("{vfo}: {}", show(rig.state().frequency(vfo), format_freq_mhz));
    Ok(())
}

async fn cmd_freq_set(rig: &RigController, vfo: Vfo, khz: u32) -> Result<()> {
    let handle = rig.set_frequency(vfo, khz).await?;
    debug!(id = %handle.id(), "frequency command queued");
    handle
        .confirmed()
        .await
        .with_context(|| format!("rig did not confirm {vfo} = {khz} kHz"))?;
    println!("{vfo}: set to {}", format_freq_mhz(khz));
    Ok(())
}

fn cmd_power_get(rig: &RigController) -> Result<()> {
    println!("Power: {}", show(rig.state().power_level_watts, format_power));
    Ok(())
}

async fn cmd_power_set(rig: &RigController, watts: f32) -> Result<()> {
    rig.set_power_level(watts)
        .await?
        .confirmed()
        .await
        .with_context(|| format!("rig did not confirm power {watts} W"))?;
    println!("Power: set to {}", format_power(watts));
    Ok(())
}

fn cmd_mode_get(rig: &RigController) -> Result<()> {
    println!("Mode: {}", show(rig.state().mode, |m: Mode| m.to_string()));
    Ok(())
}

async fn cmd_mode_set(rig: &RigController, mode_str: &str) -> Result<()> {
    let mode: Mode = mode_str
        .parse()
        .map_err(|e: elecraft::ParseModeError| anyhow::anyhow!("{e}"))?;
    rig.set_mode(mode)
        .await?
        .confirmed()
        .await
        .with_context(|| format!("rig did not confirm mode {mode}"))?;
    println!("Mode: set to {mode}");
    Ok(())
}

async fn cmd_monitor(rig: &RigController, duration_secs: u64) -> Result<()> {
    let mut event_rx = rig.subscribe();

    println!("Monitoring rig events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let next = async {
            match deadline {
                Some(dl) => tokio::time::timeout_at(dl, event_rx.recv()).await.ok(),
                None => Some(event_rx.recv().await),
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
            event = next => match event {
                Some(Ok(event)) => println!("[event] {event:?}"),
                Some(Err(RecvError::Lagged(n))) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Some(Err(RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                None => {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn cmd_list() -> Result<()> {
    let models = elecraft::supported_models();
    let name_width = models.iter().map(|m| m.name.len()).max().unwrap_or(5).max(5);

    println!(
        "{:<name_width$}  {:>7}  {:>6}  Frequency Coverage",
        "Model", "Power", "Baud"
    );
    for model in &models {
        let coverage = model
            .limits()
            .frequency_ranges
            .iter()
            .map(|r| format!("{} - {}", format_freq_mhz(r.low_khz), format_freq_mhz(r.high_khz)))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<name_width$}  {:>7}  {:>6}  {coverage}",
            model.name,
            format_power(model.max_power_watts),
            model.default_baud_rate,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    // The `list` command does not require a rig connection.
    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    let session = connect(&cli).await?;
    let rig = &session.rig;

    let result = match &cli.command {
        Command::Status => cmd_status(rig),
        Command::Freq { action } => match action {
            FreqAction::Get { vfo } => cmd_freq_get(rig, (*vfo).into()),
            FreqAction::Set { khz, vfo } => cmd_freq_set(rig, (*vfo).into(), *khz).await,
        },
        Command::Power { action } => match action {
            PowerAction::Get => cmd_power_get(rig),
            PowerAction::Set { watts } => cmd_power_set(rig, *watts).await,
        },
        Command::Mode { action } => match action {
            ModeAction::Get => cmd_mode_get(rig),
            ModeAction::Set { mode } => cmd_mode_set(rig, mode).await,
        },
        Command::Monitor { duration } => cmd_monitor(rig, *duration).await,
        Command::List => unreachable!("list handled above"),
    };

    rig.disconnect().await.ok();
    rig.shutdown();
    result
}
