//! Elecraft CAT protocol codec.
//!
//! This crate turns abstract rig commands into the Elecraft CAT
//! (Computer Aided Transceiver) text protocol and turns the rig's byte
//! stream back into status updates. It performs no I/O.
//!
//! - **Codec model** ([`codec`]) -- [`Command`], [`Response`], and the
//!   [`Codec`] trait the rig controller is generic over.
//! - **CAT codec** ([`cat`]) -- [`CatCodec`], the Elecraft grammar with a
//!   carry-over buffer for frames split across reads.
//! - **Framing** ([`protocol`]) -- split semicolon-terminated frames into
//!   prefix and data.
//! - **Command builders** ([`commands`]) -- `FA`/`FB`/`PC`/`MD`/`AI` builders
//!   and parsers.
//! - **Units** ([`units`]) -- kHz/Hz and watt conversions with one rounding
//!   policy.
//! - **Model definitions** ([`models`]) -- K3, K3S, KX3, KX2, K4 limits.
//!
//! # Example
//!
//! ```
//! use elecraft_core::{CommandId, Vfo};
//! use elecraft_protocol::{CatCodec, Codec, Command, Response, StatusReport};
//!
//! let mut codec = CatCodec::new();
//! let bytes = codec.encode(CommandId::new(1), &Command::SetFrequency(Vfo::A, 14_074));
//! assert_eq!(bytes, b"FA00014074000;FA;");
//!
//! // The rig echoes the read-back, possibly split across reads.
//! assert!(codec.decode(b"FA000140").is_empty());
//! let items = codec.decode(b"74000;");
//! assert_eq!(
//!     items,
//!     vec![Ok(Response::Status(StatusReport::frequency(Vfo::A, 14_074)))]
//! );
//! ```

pub mod cat;
pub mod codec;
pub mod commands;
pub mod models;
pub mod protocol;
pub mod units;

// Re-export the primary types for ergonomic `use elecraft_protocol::*`.
pub use cat::{CatCodec, SetCommandMode};
pub use codec::{AckStyle, Codec, Command, DecodeError, Field, FieldSet, Response, StatusReport};
pub use models::ElecraftModel;
