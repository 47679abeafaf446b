//! Elecraft CAT text-protocol framing.
//!
//! Elecraft radios (K3, K3S, KX3, KX2, K4) use an extended Kenwood-style
//! text protocol. Commands are two-letter prefixes followed by ASCII
//! parameters, terminated with `;`. This module is the frame layer only:
//! it splits a byte buffer into prefix/data pairs and builds command frames.
//! Interpreting the data belongs to [`commands`](crate::commands).
//!
//! # Frame format
//!
//! ```text
//! <prefix><params>;
//! ```
//!
//! - `prefix`: one or two uppercase ASCII letters identifying the command
//!   (`FA`, `MD`, `PC`). A longer run of letters is malformed.
//! - `params`: zero or more ASCII characters (digits, etc.).
//! - Terminator: `;` (0x3B).
//!
//! The rig answers a query by echoing the prefix followed by data. The
//! error response for an unrecognised or invalid command is `?;`. With AI
//! (Auto Information) enabled, state changes arrive unsolicited in exactly
//! the same format.

use bytes::{BufMut, BytesMut};

/// CAT command/response terminator byte.
pub const TERMINATOR: u8 = b';';

/// Longest command prefix a response may carry.
pub const MAX_PREFIX_LEN: usize = 2;

/// Error response from the rig: `?;`.
pub const ERROR_RESPONSE: &[u8] = b"?;";

/// Result of attempting to split one frame off the front of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete, well-formed frame.
    Response {
        /// Command prefix echoed in the response.
        prefix: String,
        /// Data payload (everything between the prefix and the terminator).
        data: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The rig returned the error response `?;`.
    ///
    /// The `usize` is the number of bytes consumed from the input buffer.
    Rejected(usize),

    /// A delimited frame that is not valid CAT text (non-ASCII bytes, no
    /// alphabetic prefix, or empty).
    Malformed {
        /// The frame body, lossily converted for diagnostics.
        frame: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The buffer does not yet contain a complete frame.
    Incomplete,
}

/// Encode a CAT command into raw bytes ready for transmission.
///
/// # Example
///
/// ```
/// use elecraft_protocol::protocol::encode_command;
///
/// assert_eq!(encode_command("FA", ""), b"FA;");
/// assert_eq!(encode_command("FA", "00014074000"), b"FA00014074000;");
/// ```
pub fn encode_command(prefix: &str, params: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(prefix.len() + params.len() + 1);
    put_command(&mut buf, prefix, params);
    buf.to_vec()
}

/// Append one CAT command frame to `buf`.
///
/// Used to pack a set command and its read-back query into a single write.
pub fn put_command(buf: &mut BytesMut, prefix: &str, params: &str) {
    buf.put_slice(prefix.as_bytes());
    buf.put_slice(params.as_bytes());
    buf.put_u8(TERMINATOR);
}

/// Attempt to split one CAT frame off the front of `buf`.
///
/// Scans for the `;` terminator. Leading ASCII whitespace (stray CR/LF
/// after a power cycle) is skipped. The prefix is the run of leading
/// uppercase letters; everything after it up to the terminator is data.
///
/// # Example
///
/// ```
/// use elecraft_protocol::protocol::{decode_response, DecodeResult};
///
/// match decode_response(b"FA00014074000;MD2;") {
///     DecodeResult::Response { prefix, data, consumed } => {
///         assert_eq!(prefix, "FA");
///         assert_eq!(data, "00014074000");
///         assert_eq!(consumed, 14);
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn decode_response(buf: &[u8]) -> DecodeResult {
    let term_pos = match buf.iter().position(|&b| b == TERMINATOR) {
        Some(pos) => pos,
        None => return DecodeResult::Incomplete,
    };

    let consumed = term_pos + 1;
    let body = buf[..term_pos].trim_ascii_start();

    if body == b"?" {
        return DecodeResult::Rejected(consumed);
    }

    let malformed = || DecodeResult::Malformed {
        frame: String::from_utf8_lossy(&buf[..term_pos]).into_owned(),
        consumed,
    };

    if body.is_empty() || !body.is_ascii() {
        return malformed();
    }

    // ASCII was checked above, so this cannot fail.
    let Ok(body_str) = std::str::from_utf8(body) else {
        return malformed();
    };

    let alpha_end = body_str
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(body_str.len());

    if alpha_end == 0 || alpha_end > MAX_PREFIX_LEN {
        return malformed();
    }

    DecodeResult::Response {
        prefix: body_str[..alpha_end].to_string(),
        data: body_str[alpha_end..].to_string(),
        consumed,
    }
}
