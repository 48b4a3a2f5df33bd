//! # tds-framing
//!
//! Framing layer for the MS-TDS (Tabular Data Stream) protocol spoken by
//! Microsoft SQL Server clients.
//!
//! This crate parses a TDS byte stream into packets (an 8-byte header plus
//! a payload sized by the header) and reassembles consecutive packets into
//! logical messages, terminated by a packet whose status byte carries the
//! end-of-message flag. Selected message payloads are decoded: a SQL batch
//! embeds UTF-16LE text behind a variable-length ALL_HEADERS block.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime; the `tdsbridge` crate
//! builds the socket handling on top of it.
//!
//! Headers keep their raw wire bytes and decode fields on demand, so a
//! relay can forward the exact bytes it read without a re-serialize step.
//!
//! ## Example
//!
//! ```rust
//! use tds_framing::{MessageAssembler, Packet};
//!
//! let header: [u8; 8] = [0x01, 0x01, 0x00, 0x0C, 0x00, 0x00, 0x01, 0x00];
//! let payload = [0xAA, 0xBB, 0xCC, 0xDD];
//!
//! let packet = Packet::from_parts(&header, &payload, 4);
//! let mut assembler = MessageAssembler::new();
//! let message = assembler.push(packet).expect("single-packet message");
//! assert_eq!(message.assemble_payload().as_ref(), &payload);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod message;
pub mod packet;
pub mod sql_batch;

pub use error::FramingError;
pub use message::{Message, MessageAssembler, MessageKind};
pub use packet::{
    DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE, Packet, PacketHeader, PacketStatus, PacketType,
};
pub use sql_batch::{all_headers_length, batch_text, encode_sql_batch};
