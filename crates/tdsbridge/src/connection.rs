//! Bridged connection: one client socket paired with one upstream socket
//! and two forwarding directions.
//!
//! The ingress direction (client→upstream) parses the byte stream into
//! TDS packets and messages as it forwards them; the egress direction
//! (upstream→client) is an opaque copy. TCP provides all back-pressure:
//! there is no application-level queue and at most one in-flight packet
//! per direction.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use tds_framing::{
    MessageAssembler, Packet, PacketHeader, PacketType, DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE,
};

use crate::error::BridgeError;
use crate::events::BridgeEvents;

/// Which half of the paired relay an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → bridge → SQL Server ingress.
    ClientBridge,
    /// SQL Server → bridge → client egress.
    BridgeSql,
}

impl Direction {
    /// The other half of the pair.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::ClientBridge => Self::BridgeSql,
            Self::BridgeSql => Self::ClientBridge,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClientBridge => "ClientBridge",
            Self::BridgeSql => "BridgeSQL",
        };
        f.write_str(name)
    }
}

/// The two sockets a bridged connection owns, destroyed together when
/// either half disconnects.
#[derive(Debug)]
pub struct SocketCouple {
    /// Socket to the client.
    pub client: TcpStream,
    /// Socket to the upstream SQL Server.
    pub upstream: TcpStream,
}

/// Identity of a bridged connection, handed to observer callbacks.
///
/// This is a plain value: callbacks get the connection's id and peer
/// addresses, not access to the sockets themselves.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    id: u64,
    client_addr: SocketAddr,
    upstream_addr: SocketAddr,
}

impl ConnectionInfo {
    pub(crate) fn new(id: u64, client_addr: SocketAddr, upstream_addr: SocketAddr) -> Self {
        Self {
            id,
            client_addr,
            upstream_addr,
        }
    }

    /// Identifier unique within the acceptor that spawned the connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address of the client socket.
    #[must_use]
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Remote address of the upstream socket.
    #[must_use]
    pub fn upstream_addr(&self) -> SocketAddr {
        self.upstream_addr
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} <-> {}",
            self.id, self.client_addr, self.upstream_addr
        )
    }
}

/// A bridged connection: drives both forwarding directions over its
/// socket couple until either fails, then tears both down.
pub struct BridgedConnection {
    info: ConnectionInfo,
    couple: SocketCouple,
    events: Arc<BridgeEvents>,
}

// The reference bridge has a special branch for header type 23, which is
// not an enumerated TDS type: it issues one plain read into a 4088-byte
// buffer regardless of the declared payload size, and forwards only what
// arrived. Preserved for behavioral compatibility.
const LARGE_READ_TYPE: PacketType = PacketType::Unknown(23);

impl BridgedConnection {
    pub(crate) fn new(
        info: ConnectionInfo,
        couple: SocketCouple,
        events: Arc<BridgeEvents>,
    ) -> Self {
        Self {
            info,
            couple,
            events,
        }
    }

    /// Run both forwarding directions to completion.
    ///
    /// Returns once the connection is gone: one direction has failed (or
    /// seen end-of-stream), both sockets are shut down, and a disconnect
    /// event has fired for each direction exactly once.
    pub(crate) async fn run(self) {
        let Self {
            info,
            couple,
            events,
        } = self;
        let SocketCouple {
            mut client,
            mut upstream,
        } = couple;

        let (failed, error) = {
            let (mut client_rd, mut client_wr) = client.split();
            let (mut upstream_rd, mut upstream_wr) = upstream.split();

            tokio::select! {
                error = ingress(&info, &events, &mut client_rd, &mut upstream_wr) => {
                    (Direction::ClientBridge, error)
                }
                error = egress(&mut upstream_rd, &mut client_wr) => {
                    (Direction::BridgeSql, error)
                }
            }
        };

        events.on_bridge_exception(&info, failed, &error);
        events.on_connection_disconnected(&info, failed);

        // The surviving direction was cancelled above; shut both sockets
        // down so each peer sees the teardown, then drop the couple.
        let _ = client.shutdown().await;
        let _ = upstream.shutdown().await;

        events.on_connection_disconnected(&info, failed.opposite());
        debug!(connection = %info, direction = %failed, %error, "bridged connection closed");
    }
}

/// Client→upstream: parse packets and messages, then forward the exact
/// bytes read. Runs until a read or write fails.
async fn ingress(
    info: &ConnectionInfo,
    events: &BridgeEvents,
    client: &mut ReadHalf<'_>,
    upstream: &mut WriteHalf<'_>,
) -> BridgeError {
    let mut header_buf = [0u8; PACKET_HEADER_SIZE];
    let mut scratch = vec![0u8; DEFAULT_PACKET_SIZE];
    let mut assembler = MessageAssembler::new();

    loop {
        if let Err(e) = client.read_exact(&mut header_buf).await {
            return eof_as_disconnect(e);
        }
        let header = PacketHeader::from_bytes(header_buf);
        let payload_size = header.payload_size();

        let min_len = DEFAULT_PACKET_SIZE.max(header.length_including_header() as usize + 1);
        if scratch.len() < min_len {
            scratch.resize(min_len, 0);
        }

        let forward_len = if header.packet_type() == LARGE_READ_TYPE {
            match client
                .read(&mut scratch[..DEFAULT_PACKET_SIZE - PACKET_HEADER_SIZE])
                .await
            {
                Ok(0) => return BridgeError::Disconnected,
                Ok(n) => n,
                Err(e) => return BridgeError::Io(e),
            }
        } else {
            if payload_size > 0 {
                if let Err(e) = client.read_exact(&mut scratch[..payload_size]).await {
                    return eof_as_disconnect(e);
                }
            }
            payload_size
        };

        trace!(connection = %info, %header, "received packet");

        let packet = Packet::from_parts(&header_buf, &scratch, payload_size);
        events.on_packet_received(info, &packet);

        if let Some(message) = assembler.push(packet) {
            events.on_message_received(info, &message);
        }

        if let Err(e) = upstream.write_all(&header_buf).await {
            return BridgeError::Io(e);
        }
        if let Err(e) = upstream.write_all(&scratch[..forward_len]).await {
            return BridgeError::Io(e);
        }
    }
}

/// Upstream→client: opaque copy through a fixed 4 KiB buffer. Runs until
/// a read or write fails.
async fn egress(upstream: &mut ReadHalf<'_>, client: &mut WriteHalf<'_>) -> BridgeError {
    let mut buf = [0u8; DEFAULT_PACKET_SIZE];

    loop {
        let n = match upstream.read(&mut buf).await {
            Ok(0) => return BridgeError::Disconnected,
            Ok(n) => n,
            Err(e) => return BridgeError::Io(e),
        };
        if let Err(e) = client.write_all(&buf[..n]).await {
            return BridgeError::Io(e);
        }
    }
}

/// End-of-stream during a framed read is a peer disconnect, not an
/// application error.
fn eof_as_disconnect(e: std::io::Error) -> BridgeError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        BridgeError::Disconnected
    } else {
        BridgeError::Io(e)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::ClientBridge.opposite(), Direction::BridgeSql);
        assert_eq!(Direction::BridgeSql.opposite(), Direction::ClientBridge);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::ClientBridge.to_string(), "ClientBridge");
        assert_eq!(Direction::BridgeSql.to_string(), "BridgeSQL");
    }

    #[test]
    fn test_eof_maps_to_disconnect() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(eof_as_disconnect(eof), BridgeError::Disconnected));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(eof_as_disconnect(reset), BridgeError::Io(_)));
    }
}
