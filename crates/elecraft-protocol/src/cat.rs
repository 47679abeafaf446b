//! [`CatCodec`]: the Elecraft CAT grammar behind the [`Codec`] trait.
//!
//! # Encoding
//!
//! | Command               | Verify               | NoVerify        |
//! |-----------------------|----------------------|-----------------|
//! | `SetFrequency(A, k)`  | `FA{hz:011};FA;`     | `FA{hz:011};`   |
//! | `SetFrequency(B, k)`  | `FB{hz:011};FB;`     | `FB{hz:011};`   |
//! | `SetPower(w)`         | `PC{w:03};PC;`       | `PC{w:03};`     |
//! | `SetMode(m)`          | `MD{code};MD;`       | `MD{code};`     |
//! | `QueryState`          | `FA;FB;PC;MD;`       | `FA;FB;PC;MD;`  |
//!
//! CAT has no positive acknowledgment, so with [`SetCommandMode::Verify`]
//! every set command carries a read-back query and is confirmed by the
//! echoed value. With [`SetCommandMode::NoVerify`] a successful write is the
//! only confirmation the rig gives.
//!
//! # Decoding
//!
//! - `FA`, `FB`, `PC`, `MD` frames become [`Response::Status`].
//! - `?;` becomes [`Response::Nack`].
//! - Other well-formed frames (`AI2;` echoes, `IF`, meter pushes) are
//!   dropped with a debug log.
//! - Frames that fail to parse become [`DecodeError::Malformed`]; decoding
//!   resumes after the frame's `;`.
//! - A run of more than [`MAX_BUF`] bytes without `;` becomes
//!   [`DecodeError::Overflow`]; exactly `MAX_BUF + 1` bytes are dropped and
//!   decoding resumes with the next byte. The cut is measured from the end
//!   of the previous frame, so the output never depends on how the stream
//!   was split into reads.

use bytes::{Buf, BytesMut};
use elecraft_core::{CommandId, Error, Vfo};
use tracing::{debug, trace, warn};

use crate::codec::{AckStyle, Codec, Command, DecodeError, Response, StatusReport};
use crate::commands::{self, PREFIX_FREQ_A, PREFIX_FREQ_B, PREFIX_MODE, PREFIX_POWER};
use crate::protocol::{self, DecodeResult};

/// Longest run without a terminator the decoder will hold.
/// CAT frames are 3 to 50 bytes; 8192 is generous headroom.
pub const MAX_BUF: usize = 8192;

/// How set commands are confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCommandMode {
    /// Follow each set with a read-back query and confirm on the echo.
    #[default]
    Verify,
    /// Send the set alone; a successful write completes it.
    NoVerify,
}

/// Elecraft CAT codec.
#[derive(Debug)]
pub struct CatCodec {
    set_command_mode: SetCommandMode,
    auto_info: bool,
    buf: BytesMut,
}

impl CatCodec {
    /// A codec with read-back verification and auto-information enabled.
    pub fn new() -> Self {
        CatCodec {
            set_command_mode: SetCommandMode::Verify,
            auto_info: true,
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Choose how set commands are confirmed.
    pub fn with_set_command_mode(mut self, mode: SetCommandMode) -> Self {
        self.set_command_mode = mode;
        self
    }

    /// Enable or disable `AI2;` on connect and `AI0;` on disconnect.
    pub fn with_auto_info(mut self, enabled: bool) -> Self {
        self.auto_info = enabled;
        self
    }

    pub fn set_command_mode(&self) -> SetCommandMode {
        self.set_command_mode
    }

    pub fn auto_info(&self) -> bool {
        self.auto_info
    }

    /// Split every complete frame off the front of the carry-over buffer.
    fn drain_frames(&mut self, out: &mut Vec<Result<Response, DecodeError>>) {
        loop {
            let window = &self.buf[..self.buf.len().min(MAX_BUF + 1)];
            if !window.contains(&protocol::TERMINATOR) {
                if self.buf.len() <= MAX_BUF {
                    break;
                }
                let len = MAX_BUF + 1;
                self.buf.advance(len);
                warn!(len, "CAT frame exceeds maximum length, dropping");
                out.push(Err(DecodeError::Overflow { len }));
                continue;
            }
            match protocol::decode_response(&self.buf) {
                DecodeResult::Response {
                    prefix,
                    data,
                    consumed,
                } => {
                    self.buf.advance(consumed);
                    if let Some(item) = interpret(&prefix, &data) {
                        out.push(item);
                    }
                }
                DecodeResult::Rejected(consumed) => {
                    self.buf.advance(consumed);
                    debug!("rig rejected command (?;)");
                    out.push(Ok(Response::Nack(
                        "rig rejected command (?;)".to_string(),
                    )));
                }
                DecodeResult::Malformed { frame, consumed } => {
                    self.buf.advance(consumed);
                    warn!(frame = frame.as_str(), "discarding malformed CAT frame");
                    out.push(Err(DecodeError::Malformed {
                        frame,
                        reason: "not a CAT frame".to_string(),
                    }));
                }
                DecodeResult::Incomplete => break,
            }
        }
    }
}

impl Default for CatCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one well-formed frame into a response.
///
/// Returns `None` for frames outside the tracked state.
fn interpret(prefix: &str, data: &str) -> Option<Result<Response, DecodeError>> {
    let parsed = match prefix {
        PREFIX_FREQ_A => {
            commands::parse_frequency_response(data).map(|khz| StatusReport::frequency(Vfo::A, khz))
        }
        PREFIX_FREQ_B => {
            commands::parse_frequency_response(data).map(|khz| StatusReport::frequency(Vfo::B, khz))
        }
        PREFIX_POWER => commands::parse_power_response(data).map(StatusReport::power),
        PREFIX_MODE => commands::parse_mode_response(data).map(StatusReport::mode),
        _ => {
            debug!(prefix, data, "ignoring untracked CAT frame");
            return None;
        }
    };

    Some(match parsed {
        Ok(report) => {
            trace!(prefix, data, "CAT status frame");
            Ok(Response::Status(report))
        }
        Err(e) => {
            let reason = match e {
                Error::Protocol(msg) => msg,
                other => other.to_string(),
            };
            warn!(prefix, data, reason = reason.as_str(), "discarding unparseable CAT frame");
            Err(DecodeError::Malformed {
                frame: format!("{prefix}{data}"),
                reason,
            })
        }
    })
}

impl Codec for CatCodec {
    fn encode(&self, _id: CommandId, command: &Command) -> Vec<u8> {
        let verify = self.set_command_mode == SetCommandMode::Verify;
        let mut out = match command {
            Command::SetFrequency(vfo, khz) => commands::cmd_set_frequency(*vfo, *khz),
            Command::SetPower(watts) => commands::cmd_set_power(*watts),
            Command::SetMode(mode) => commands::cmd_set_mode(*mode),
            Command::QueryState => return commands::cmd_query_state(),
        };
        if verify {
            let read_back = match command {
                Command::SetFrequency(vfo, _) => commands::cmd_read_frequency(*vfo),
                Command::SetPower(_) => commands::cmd_read_power(),
                Command::SetMode(_) => commands::cmd_read_mode(),
                Command::QueryState => Vec::new(),
            };
            out.extend_from_slice(&read_back);
        }
        out
    }

    fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Response, DecodeError>> {
        self.buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        self.drain_frames(&mut out);
        out
    }

    fn reset(&mut self) {
        self.buf.clear();
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn ack_style(&self, command: &Command) -> AckStyle {
        match (command, self.set_command_mode) {
            (Command::QueryState, _) => AckStyle::ReadBack,
            (_, SetCommandMode::Verify) => AckStyle::ReadBack,
            (_, SetCommandMode::NoVerify) => AckStyle::Unacknowledged,
        }
    }

    fn startup_command(&self) -> Option<Vec<u8>> {
        self.auto_info.then(|| commands::cmd_set_auto_info(true))
    }

    fn shutdown_command(&self) -> Option<Vec<u8>> {
        self.auto_info.then(|| commands::cmd_set_auto_info(false))
    }
}

#[cfg(test)]
mod tests {
    use elecraft_core::Mode;

    use super::*;
    use crate::units;

    fn id() -> CommandId {
        CommandId::new(1)
    }

    fn statuses(items: Vec<Result<Response, DecodeError>>) -> Vec<StatusReport> {
        items
            .into_iter()
            .map(|item| match item {
                Ok(Response::Status(report)) => report,
                other => panic!("expected status, got {other:?}"),
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_verify_appends_read_back() {
        let codec = CatCodec::new();
        assert_eq!(
            codec.encode(id(), &Command::SetFrequency(Vfo::A, 14_074)),
            b"FA00014074000;FA;"
        );
        assert_eq!(
            codec.encode(id(), &Command::SetFrequency(Vfo::B, 7_074)),
            b"FB00007074000;FB;"
        );
        assert_eq!(codec.encode(id(), &Command::SetPower(50.0)), b"PC050;PC;");
        assert_eq!(codec.encode(id(), &Command::SetMode(Mode::CW)), b"MD3;MD;");
        assert_eq!(codec.encode(id(), &Command::QueryState), b"FA;FB;PC;MD;");
    }

    #[test]
    fn encode_no_verify_sends_set_only() {
        let codec = CatCodec::new().with_set_command_mode(SetCommandMode::NoVerify);
        assert_eq!(
            codec.encode(id(), &Command::SetFrequency(Vfo::A, 14_074)),
            b"FA00014074000;"
        );
        assert_eq!(codec.encode(id(), &Command::SetPower(10.0)), b"PC010;");
        assert_eq!(codec.encode(id(), &Command::QueryState), b"FA;FB;PC;MD;");
    }

    #[test]
    fn ack_styles() {
        let verify = CatCodec::new();
        assert_eq!(
            verify.ack_style(&Command::SetPower(5.0)),
            AckStyle::ReadBack
        );
        assert_eq!(verify.ack_style(&Command::QueryState), AckStyle::ReadBack);

        let no_verify = CatCodec::new().with_set_command_mode(SetCommandMode::NoVerify);
        assert_eq!(
            no_verify.ack_style(&Command::SetMode(Mode::AM)),
            AckStyle::Unacknowledged
        );
        assert_eq!(
            no_verify.ack_style(&Command::QueryState),
            AckStyle::ReadBack
        );
    }

    #[test]
    fn startup_and_shutdown_follow_auto_info() {
        let codec = CatCodec::new();
        assert_eq!(codec.startup_command().as_deref(), Some(&b"AI2;"[..]));
        assert_eq!(codec.shutdown_command().as_deref(), Some(&b"AI0;"[..]));

        let quiet = CatCodec::new().with_auto_info(false);
        assert!(quiet.startup_command().is_none());
        assert!(quiet.shutdown_command().is_none());
    }

    // ---------------------------------------------------------------
    // Decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_full_state_reply() {
        let mut codec = CatCodec::new();
        let reports = statuses(codec.decode(b"FA00014074000;FB00007074000;PC050;MD2;"));
        assert_eq!(
            reports,
            vec![
                StatusReport::frequency(Vfo::A, 14_074),
                StatusReport::frequency(Vfo::B, 7_074),
                StatusReport::power(50.0),
                StatusReport::mode(Mode::USB),
            ]
        );
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn decode_is_independent_of_chunk_boundaries() {
        let stream = b"FA00014074000;PC005;\r\nMD3;FB00003573000;";

        let mut whole = CatCodec::new();
        let expected = whole.decode(stream);
        assert_eq!(expected.len(), 4);

        for chunk_size in 1..stream.len() {
            let mut codec = CatCodec::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(codec.decode(chunk));
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
            assert_eq!(codec.buffered(), 0);
        }
    }

    #[test]
    fn oversized_run_is_cut_at_the_same_place_for_any_split() {
        let mut stream = vec![b'X'; MAX_BUF + 100];
        stream.extend_from_slice(b"MD1;PC005;");

        let mut whole = CatCodec::new();
        let expected = whole.decode(&stream);
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[0], Err(DecodeError::Overflow { len: MAX_BUF + 1 }));
        assert!(matches!(expected[1], Err(DecodeError::Malformed { .. })));
        assert_eq!(expected[2], Ok(Response::Status(StatusReport::power(5.0))));
        assert_eq!(whole.buffered(), 0);

        for chunk_size in [1, 7, 64, 4096, MAX_BUF, MAX_BUF + 1, stream.len() - 1] {
            let mut codec = CatCodec::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(codec.decode(chunk));
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
            assert_eq!(codec.buffered(), 0);
        }
    }

    #[test]
    fn decode_keeps_partial_frame() {
        let mut codec = CatCodec::new();
        assert!(codec.decode(b"FA000140").is_empty());
        assert_eq!(codec.buffered(), 8);
        let reports = statuses(codec.decode(b"74000;"));
        assert_eq!(reports, vec![StatusReport::frequency(Vfo::A, 14_074)]);
    }

    #[test]
    fn malformed_frame_then_valid_frame() {
        let mut codec = CatCodec::new();
        let items = codec.decode(b"FA12;MD2;");
        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(DecodeError::Malformed { frame, reason }) => {
                assert_eq!(frame, "FA12");
                assert!(reason.contains("11 digits"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
        assert_eq!(items[1], Ok(Response::Status(StatusReport::mode(Mode::USB))));
    }

    #[test]
    fn unknown_mode_code_is_malformed() {
        let mut codec = CatCodec::new();
        let items = codec.decode(b"MD8;");
        assert!(matches!(
            items.as_slice(),
            [Err(DecodeError::Malformed { .. })]
        ));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let mut codec = CatCodec::new();
        let items = codec.decode(&[0xFF, 0x00, b';', b'P', b'C', b'0', b'1', b'0', b';']);
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1], Ok(Response::Status(StatusReport::power(10.0))));
    }

    #[test]
    fn error_response_is_nack() {
        let mut codec = CatCodec::new();
        let items = codec.decode(b"?;");
        assert!(matches!(items.as_slice(), [Ok(Response::Nack(_))]));
    }

    #[test]
    fn untracked_frames_are_ignored() {
        let mut codec = CatCodec::new();
        let items = codec.decode(b"AI2;IF00014074000     -000000 0002000011 ;PC100;");
        assert_eq!(statuses(items), vec![StatusReport::power(100.0)]);
    }

    #[test]
    fn overflow_drops_the_oversized_run() {
        let mut codec = CatCodec::new();
        let noise = vec![b'X'; MAX_BUF + 1];
        let items = codec.decode(&noise);
        assert_eq!(items, vec![Err(DecodeError::Overflow { len: MAX_BUF + 1 })]);
        assert_eq!(codec.buffered(), 0);

        let reports = statuses(codec.decode(b"MD1;"));
        assert_eq!(reports, vec![StatusReport::mode(Mode::LSB)]);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut codec = CatCodec::new();
        codec.decode(b"FA0001");
        codec.reset();
        assert_eq!(codec.buffered(), 0);
        let items = codec.decode(b"PC020;");
        assert_eq!(statuses(items), vec![StatusReport::power(20.0)]);
    }

    #[test]
    fn integral_khz_round_trips_through_the_wire() {
        let codec = CatCodec::new().with_set_command_mode(SetCommandMode::NoVerify);
        for khz in [1_800, 3_573, 7_074, 14_074, 21_074, 28_074, 50_313, 54_000] {
            let wire = codec.encode(id(), &Command::SetFrequency(Vfo::A, khz));
            let mut decoder = CatCodec::new();
            let reports = statuses(decoder.decode(&wire));
            assert_eq!(reports, vec![StatusReport::frequency(Vfo::A, khz)]);
            assert_eq!(units::hz_to_khz(units::khz_to_hz(khz)), khz);
        }
    }

    #[test]
    fn codec_is_object_safe() {
        let mut boxed: Box<dyn Codec> = Box::new(CatCodec::new());
        assert_eq!(boxed.decode(b"MD5;").len(), 1);
        assert_eq!(boxed.buffered(), 0);
    }
}
