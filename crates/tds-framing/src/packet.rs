//! TDS packet header and packet definitions.

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes};

use crate::error::FramingError;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Default TDS packet size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// TDS packet type.
///
/// The discriminant values are the on-wire byte. Values outside the
/// enumeration are preserved as [`PacketType::Unknown`] so that
/// classification is total: a bridge must forward packets it does not
/// recognize rather than reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch,
    /// Pre-TDS7 login packet.
    PreTds7Login,
    /// Remote procedure call.
    Rpc,
    /// Tabular response.
    TabularResult,
    /// Attention signal.
    Attention,
    /// Bulk load data.
    BulkLoad,
    /// Transaction manager request.
    TransactionManager,
    /// TDS7+ login packet.
    Tds7Login,
    /// SSPI authentication.
    Sspi,
    /// Pre-login packet.
    PreLogin,
    /// Any type value not in the enumeration, carrying the wire byte.
    Unknown(u8),
}

impl PacketType {
    /// Create a packet type from a raw byte value.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::SqlBatch,
            0x02 => Self::PreTds7Login,
            0x03 => Self::Rpc,
            0x04 => Self::TabularResult,
            0x06 => Self::Attention,
            0x07 => Self::BulkLoad,
            0x0E => Self::TransactionManager,
            0x10 => Self::Tds7Login,
            0x11 => Self::Sspi,
            0x12 => Self::PreLogin,
            other => Self::Unknown(other),
        }
    }

    /// The on-wire byte value of this packet type.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::SqlBatch => 0x01,
            Self::PreTds7Login => 0x02,
            Self::Rpc => 0x03,
            Self::TabularResult => 0x04,
            Self::Attention => 0x06,
            Self::BulkLoad => 0x07,
            Self::TransactionManager => 0x0E,
            Self::Tds7Login => 0x10,
            Self::Sspi => 0x11,
            Self::PreLogin => 0x12,
            Self::Unknown(other) => other,
        }
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Normal packet, more packets to follow.
        const NORMAL = 0x00;
        /// End of message (last packet).
        const END_OF_MESSAGE = 0x01;
        /// The peer must discard this message at its layer.
        const IGNORE = 0x02;
        /// Reset connection (SQL Server 2000+).
        const RESET_CONNECTION = 0x08;
        /// Reset connection but keep transaction state.
        const RESET_CONNECTION_SKIP_TRAN = 0x10;
    }
}

/// TDS packet header.
///
/// Every TDS packet begins with an 8-byte header that describes the packet
/// type, status, and length. The header keeps the raw wire bytes and
/// decodes each field on demand: the same bytes are forwarded verbatim to
/// the other side of a relay, so storing them guarantees bit-exact
/// passthrough with no re-serialize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    raw: [u8; PACKET_HEADER_SIZE],
}

impl PacketHeader {
    /// Create a header with the given type, status, and total length.
    ///
    /// SPID, packet id, and window are zeroed; they are opaque to the
    /// framing layer.
    #[must_use]
    pub fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        let mut raw = [0u8; PACKET_HEADER_SIZE];
        raw[0] = packet_type.as_u8();
        raw[1] = status.bits();
        raw[2..4].copy_from_slice(&length.to_be_bytes());
        Self { raw }
    }

    /// Wrap the raw 8 header bytes. Total: any byte pattern is a header.
    #[must_use]
    pub const fn from_bytes(raw: [u8; PACKET_HEADER_SIZE]) -> Self {
        Self { raw }
    }

    /// Parse a packet header from a buffer.
    pub fn decode(src: &mut impl Buf) -> Result<Self, FramingError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(FramingError::IncompleteHeader {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }
        let mut raw = [0u8; PACKET_HEADER_SIZE];
        src.copy_to_slice(&mut raw);
        Ok(Self { raw })
    }

    /// Write the 8 header bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.raw);
    }

    /// The raw wire bytes of this header.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PACKET_HEADER_SIZE] {
        &self.raw
    }

    /// Type of packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        PacketType::from_u8(self.raw[0])
    }

    /// Status flags. Bits outside the known set are retained.
    #[must_use]
    pub fn status(&self) -> PacketStatus {
        PacketStatus::from_bits_retain(self.raw[1])
    }

    /// Total packet length including the header, big-endian on the wire.
    #[must_use]
    pub fn length_including_header(&self) -> u16 {
        u16::from_be_bytes([self.raw[2], self.raw[3]])
    }

    /// The payload length (total length minus header).
    #[must_use]
    pub fn payload_size(&self) -> usize {
        (self.length_including_header() as usize).saturating_sub(PACKET_HEADER_SIZE)
    }

    /// Server process ID (SPID). Opaque to the framing layer.
    #[must_use]
    pub fn spid(&self) -> u16 {
        u16::from_be_bytes([self.raw[4], self.raw[5]])
    }

    /// Packet sequence number (wraps at 255).
    #[must_use]
    pub fn packet_id(&self) -> u8 {
        self.raw[6]
    }

    /// Window (unused, should be 0).
    #[must_use]
    pub fn window(&self) -> u8 {
        self.raw[7]
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.status().contains(PacketStatus::END_OF_MESSAGE)
    }

    /// Check if the ignore flag is set.
    #[must_use]
    pub fn has_ignore(&self) -> bool {
        self.status().contains(PacketStatus::IGNORE)
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} status={:#04x} len={} payload={}",
            self.packet_type(),
            self.status().bits(),
            self.length_including_header(),
            self.payload_size()
        )
    }
}

/// A single framed TDS packet: 8-byte header plus payload.
///
/// Packets are immutable after construction.
#[derive(Debug, Clone)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
}

impl Packet {
    /// Create a packet from an already-parsed header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Build a packet from a header buffer and a scratch payload buffer.
    ///
    /// `payload_len` bytes are taken from `payload`, which must be at
    /// least that long. Both slices are copied, so callers may reuse
    /// their buffers immediately after this returns.
    #[must_use]
    pub fn from_parts(
        header: &[u8; PACKET_HEADER_SIZE],
        payload: &[u8],
        payload_len: usize,
    ) -> Self {
        Self {
            header: PacketHeader::from_bytes(*header),
            payload: Bytes::copy_from_slice(&payload[..payload_len]),
        }
    }

    /// Packet header.
    #[must_use]
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    /// Packet payload (excluding header).
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total packet size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TDS packet [{}]", self.header)
    }
}
