//! TDS message classification and reassembly.
//!
//! TDS messages can span multiple packets, all sharing the type of the
//! first packet. The final packet of a message carries the
//! `END_OF_MESSAGE` status flag. This module groups packets into messages
//! and classifies them by the first packet's header type.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::packet::{Packet, PacketType};
use crate::sql_batch;

/// Logical message subtype, chosen from the first packet's header type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A SQL batch request carrying UTF-16LE batch text.
    SqlBatch,
    /// A remote procedure call request.
    RpcRequest,
    /// An attention signal, typically a header-only packet.
    Attention,
    /// Every other message type; forwarded without interpretation.
    Default,
}

impl MessageKind {
    /// Classify a message by its first packet's type.
    #[must_use]
    pub fn classify(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::SqlBatch => Self::SqlBatch,
            PacketType::Rpc => Self::RpcRequest,
            PacketType::Attention => Self::Attention,
            _ => Self::Default,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SqlBatch => "SQLBatch",
            Self::RpcRequest => "RPC request",
            Self::Attention => "attention",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

/// A logical TDS message: an ordered, non-empty run of packets sharing the
/// type of the first packet.
///
/// A message is complete once its last packet carries `END_OF_MESSAGE`.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    packets: Vec<Packet>,
}

impl Message {
    /// Start a message from its first packet, classifying the subtype.
    #[must_use]
    pub fn begin(first: Packet) -> Self {
        Self {
            kind: MessageKind::classify(first.header().packet_type()),
            packets: vec![first],
        }
    }

    /// Append a packet. The caller must ensure the packet type matches
    /// the first packet's.
    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// The message subtype.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The packets of this message, in arrival order.
    #[must_use]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Number of packets accumulated.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// True iff the last packet carries `END_OF_MESSAGE`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.packets
            .last()
            .is_some_and(Packet::is_end_of_message)
    }

    /// True iff the last packet carries the ignore flag, telling the peer
    /// to discard the message at its layer.
    #[must_use]
    pub fn has_ignore_bit(&self) -> bool {
        self.packets
            .last()
            .is_some_and(|p| p.header().has_ignore())
    }

    /// Concatenation of all packet payloads, in order.
    ///
    /// On an incomplete message this returns the bytes accumulated so far.
    #[must_use]
    pub fn assemble_payload(&self) -> Bytes {
        let total: usize = self.packets.iter().map(|p| p.payload().len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        for packet in &self.packets {
            payload.extend_from_slice(packet.payload());
        }
        payload.freeze()
    }

    /// The batch text of a complete SQL batch message.
    ///
    /// Returns `None` for every other message kind.
    #[must_use]
    pub fn batch_text(&self) -> Option<String> {
        if self.kind != MessageKind::SqlBatch {
            return None;
        }
        Some(sql_batch::batch_text(&self.assemble_payload()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_complete() {
            return write!(f, "{} message (incomplete)", self.kind);
        }
        write!(
            f,
            "{} message: {} packet(s), {} payload bytes",
            self.kind,
            self.packet_count(),
            self.assemble_payload().len()
        )?;
        if self.has_ignore_bit() {
            write!(f, ", ignore bit set")?;
        }
        Ok(())
    }
}

/// Folds a stream of packets into messages.
///
/// The in-progress message is a sum type: either nothing is building, or
/// packets are accumulating under the kind chosen by the first packet.
/// `push` returns the completed message on the packet that carries
/// `END_OF_MESSAGE`, which for a single-packet message is the first one.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    current: Option<Message>,
}

impl MessageAssembler {
    /// Create a new message assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a packet into the assembler.
    ///
    /// Returns `Some(Message)` if this packet completes a message,
    /// `None` if more packets are needed.
    pub fn push(&mut self, packet: Packet) -> Option<Message> {
        let complete = packet.is_end_of_message();

        match self.current.as_mut() {
            None => self.current = Some(Message::begin(packet)),
            Some(message) => message.push(packet),
        }

        let building = self.current.as_ref()?;
        tracing::trace!(
            kind = %building.kind(),
            packet_count = building.packet_count(),
            complete,
            "assembling message"
        );

        if complete {
            self.current.take()
        } else {
            None
        }
    }

    /// Check if the assembler has a partially built message.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.current.is_some()
    }

    /// Discard any partially built message.
    pub fn clear(&mut self) {
        self.current = None;
    }
}
