//! A newline-delimited codec with explicit acknowledgments.
//!
//! CAT confirms commands only by read-back. [`LineCodec`] exercises the
//! other half of the controller: acks that carry the command id, acks
//! without one (FIFO fallback), and negative acks.
//!
//! Outbound: `<id> FA <khz>`, `<id> FB <khz>`, `<id> PC <watts>`,
//! `<id> MD <MODE>`, `<id> Q`, each terminated by `\n`.
//!
//! Inbound: `ACK`, `ACK <id>`, `NAK <reason>`, `FA <khz>`, `FB <khz>`,
//! `PC <watts>`, `MD <MODE>`. Blank lines are skipped.

use elecraft_core::{CommandId, Mode, Vfo};
use elecraft_protocol::codec::{AckStyle, Codec, Command, DecodeError, Response, StatusReport};

/// Test codec with explicit acks.
#[derive(Debug, Default)]
pub struct LineCodec {
    buf: Vec<u8>,
    style: Option<AckStyle>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `style` for every command instead of [`AckStyle::Explicit`].
    pub fn with_ack_style(mut self, style: AckStyle) -> Self {
        self.style = Some(style);
        self
    }

    fn parse_line(line: &str) -> Result<Response, DecodeError> {
        let malformed = |reason: &str| DecodeError::Malformed {
            frame: line.to_string(),
            reason: reason.to_string(),
        };
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg.trim())),
            None => (line, None),
        };
        match (verb, arg) {
            ("ACK", None) => Ok(Response::Ack(None)),
            ("ACK", Some(id)) => id
                .parse::<u64>()
                .map(|id| Response::Ack(Some(CommandId::new(id))))
                .map_err(|_| malformed("bad command id")),
            ("NAK", reason) => Ok(Response::Nack(reason.unwrap_or("").to_string())),
            ("FA", Some(khz)) | ("FB", Some(khz)) => {
                let vfo = if verb == "FA" { Vfo::A } else { Vfo::B };
                khz.parse::<u32>()
                    .map(|khz| Response::Status(StatusReport::frequency(vfo, khz)))
                    .map_err(|_| malformed("bad frequency"))
            }
            ("PC", Some(watts)) => watts
                .parse::<f32>()
                .map(|w| Response::Status(StatusReport::power(w)))
                .map_err(|_| malformed("bad power")),
            ("MD", Some(mode)) => mode
                .parse::<Mode>()
                .map(|m| Response::Status(StatusReport::mode(m)))
                .map_err(|_| malformed("bad mode")),
            _ => Err(malformed("unknown line")),
        }
    }
}

impl Codec for LineCodec {
    fn encode(&self, id: CommandId, command: &Command) -> Vec<u8> {
        let body = match command {
            Command::SetFrequency(Vfo::A, khz) => format!("FA {khz}"),
            Command::SetFrequency(Vfo::B, khz) => format!("FB {khz}"),
            Command::SetPower(watts) => format!("PC {watts}"),
            Command::SetMode(mode) => format!("MD {mode}"),
            Command::QueryState => "Q".to_string(),
        };
        format!("{} {body}\n", id.get()).into_bytes()
    }

    fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Response, DecodeError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let frame: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&frame[..pos]);
            let line = line.trim();
            if !line.is_empty() {
                out.push(Self::parse_line(line));
            }
        }
        out
    }

    fn reset(&mut self) {
        self.buf.clear();
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn ack_style(&self, _command: &Command) -> AckStyle {
        self.style.unwrap_or(AckStyle::Explicit)
    }
}
