//! End-to-end bridge tests over loopback sockets.
//!
//! Each test stands up a mock upstream peer, starts an acceptor against
//! it, and drives a real client connection through the bridge, checking
//! both the observer events and the bytes delivered upstream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use tds_framing::{
    encode_sql_batch, Message, MessageKind, Packet, PacketHeader, PacketStatus, PacketType,
    PACKET_HEADER_SIZE,
};
use tdsbridge::{BridgeAcceptor, Direction};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// A mock SQL Server peer: accepts connections and records every byte it
/// receives. `close_connections` drops all accepted sockets, simulating
/// an upstream that goes away mid-stream.
struct MockUpstream {
    addr: SocketAddr,
    bytes: mpsc::UnboundedReceiver<Vec<u8>>,
    close: broadcast::Sender<()>,
}

async fn mock_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (bytes_tx, bytes_rx) = mpsc::unbounded_channel();
    let (close_tx, _) = broadcast::channel(1);
    let close = close_tx.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let bytes_tx = bytes_tx.clone();
            let mut close_rx = close_tx.subscribe();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    tokio::select! {
                        _ = close_rx.recv() => break,
                        read = socket.read(&mut buf) => match read {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                let _ = bytes_tx.send(buf[..n].to_vec());
                            }
                        },
                    }
                }
            });
        }
    });

    MockUpstream {
        addr,
        bytes: bytes_rx,
        close,
    }
}

impl MockUpstream {
    /// Receive exactly `n` bytes, however TCP chunks them.
    async fn recv_exact(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let chunk = timeout(WAIT, self.bytes.recv())
                .await
                .expect("timed out waiting for upstream bytes")
                .expect("upstream closed");
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out.len(), n, "upstream received unexpected extra bytes");
        out
    }

    fn close_connections(&self) {
        let _ = self.close.send(());
    }
}

struct Taps {
    accepted: mpsc::UnboundedReceiver<SocketAddr>,
    packets: mpsc::UnboundedReceiver<Packet>,
    messages: mpsc::UnboundedReceiver<Message>,
    exceptions: mpsc::UnboundedReceiver<Direction>,
    disconnects: mpsc::UnboundedReceiver<Direction>,
}

/// Register handlers that feed every event into channels the test can
/// await on.
fn tap_events(acceptor: &BridgeAcceptor) -> Taps {
    let (atx, accepted) = mpsc::unbounded_channel();
    acceptor.events().set_connection_accepted(move |socket| {
        if let Ok(addr) = socket.peer_addr() {
            let _ = atx.send(addr);
        }
    });

    let (ptx, packets) = mpsc::unbounded_channel();
    acceptor.events().set_packet_received(move |_, packet| {
        let _ = ptx.send(packet.clone());
    });

    let (mtx, messages) = mpsc::unbounded_channel();
    acceptor.events().set_message_received(move |_, message| {
        let _ = mtx.send(message.clone());
    });

    let (etx, exceptions) = mpsc::unbounded_channel();
    acceptor
        .events()
        .set_bridge_exception(move |_, direction, _| {
            let _ = etx.send(direction);
        });

    let (dtx, disconnects) = mpsc::unbounded_channel();
    acceptor
        .events()
        .set_connection_disconnected(move |_, direction| {
            let _ = dtx.send(direction);
        });

    Taps {
        accepted,
        packets,
        messages,
        exceptions,
        disconnects,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Frame a payload into one wire packet.
fn frame(packet_type: PacketType, status: PacketStatus, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader::new(
        packet_type,
        status,
        (PACKET_HEADER_SIZE + payload.len()) as u16,
    );
    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

async fn start_bridge(upstream_addr: SocketAddr) -> (BridgeAcceptor, Taps, SocketAddr) {
    let acceptor = BridgeAcceptor::new("127.0.0.1:0".parse().unwrap(), upstream_addr);
    let taps = tap_events(&acceptor);
    acceptor.start().await.unwrap();
    let addr = acceptor.local_addr().await.unwrap();
    (acceptor, taps, addr)
}

#[tokio::test]
async fn test_sql_batch_round_trip() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let wire = frame(
        PacketType::SqlBatch,
        PacketStatus::END_OF_MESSAGE,
        &encode_sql_batch("hi"),
    );
    client.write_all(&wire).await.unwrap();

    recv(&mut taps.accepted).await;

    let packet = recv(&mut taps.packets).await;
    assert_eq!(packet.header().packet_type(), PacketType::SqlBatch);
    assert!(packet.is_end_of_message());

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.kind(), MessageKind::SqlBatch);
    assert_eq!(message.packet_count(), 1);
    assert_eq!(message.batch_text().as_deref(), Some("hi"));

    // The identical bytes arrive at the upstream peer.
    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_multi_packet_batch() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    let payload = encode_sql_batch("SELECT 1");
    let chunks = [&payload[..10], &payload[10..20], &payload[20..]];

    let mut wire = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let status = if i == chunks.len() - 1 {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        wire.extend_from_slice(&frame(PacketType::SqlBatch, status, chunk));
    }

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    // Packet events fire in order; only the last carries end-of-message.
    for i in 0..3 {
        let packet = recv(&mut taps.packets).await;
        assert_eq!(packet.header().packet_type(), PacketType::SqlBatch);
        assert_eq!(packet.is_end_of_message(), i == 2);
    }

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.packet_count(), 3);
    assert_eq!(message.batch_text().as_deref(), Some("SELECT 1"));

    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_attention_signal() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    let wire = frame(PacketType::Attention, PacketStatus::END_OF_MESSAGE, b"");
    assert_eq!(wire, [0x06, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00]);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    let packet = recv(&mut taps.packets).await;
    assert_eq!(packet.payload().len(), 0);

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.kind(), MessageKind::Attention);
    assert!(message.assemble_payload().is_empty());

    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_unknown_type_forwards_verbatim() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    let wire = frame(
        PacketType::Unknown(0x7F),
        PacketStatus::END_OF_MESSAGE,
        &[0xAA],
    );
    assert_eq!(wire, [0x7F, 0x01, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0xAA]);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.kind(), MessageKind::Default);
    assert_eq!(message.assemble_payload().as_ref(), &[0xAA]);

    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_type_23_large_read_path() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    // Type 23 is not an enumerated TDS type; the ingress loop takes a
    // single plain read and forwards whatever arrived.
    let wire = frame(
        PacketType::Unknown(23),
        PacketStatus::END_OF_MESSAGE,
        &[0xDE, 0xAD, 0xBE, 0xEF],
    );
    assert_eq!(wire[0], 23);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    let packet = recv(&mut taps.packets).await;
    assert_eq!(packet.header().packet_type(), PacketType::Unknown(23));
    assert_eq!(packet.payload().as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.kind(), MessageKind::Default);

    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_dribbled_bytes_are_reassembled() {
    // TCP may deliver fewer bytes than requested per read. The ingress
    // loop uses exact reads for the header and payload; the reference
    // implementation's single-read framing silently assumed full reads,
    // a latent bug this bridge does not reproduce.
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    let wire = frame(
        PacketType::SqlBatch,
        PacketStatus::END_OF_MESSAGE,
        &encode_sql_batch("SELECT 42"),
    );

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire[..4]).await.unwrap();
    client.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    client.write_all(&wire[4..]).await.unwrap();

    let message = recv(&mut taps.messages).await;
    assert_eq!(message.batch_text().as_deref(), Some("SELECT 42"));

    assert_eq!(upstream.recv_exact(wire.len()).await, wire);
}

#[tokio::test]
async fn test_upstream_close_tears_down_both_directions() {
    let mut upstream = mock_upstream().await;
    let (_acceptor, mut taps, addr) = start_bridge(upstream.addr).await;

    // First packet of a message with end-of-message clear, so the
    // connection is mid-message when the upstream goes away.
    let wire = frame(PacketType::SqlBatch, PacketStatus::NORMAL, &[0u8; 4]);
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();
    recv(&mut taps.packets).await;
    upstream.recv_exact(wire.len()).await;

    upstream.close_connections();

    assert_eq!(recv(&mut taps.exceptions).await, Direction::BridgeSql);
    assert_eq!(recv(&mut taps.disconnects).await, Direction::BridgeSql);
    assert_eq!(recv(&mut taps.disconnects).await, Direction::ClientBridge);

    // The client side is torn down too.
    let mut buf = [0u8; 1];
    let n = timeout(WAIT, client.read(&mut buf))
        .await
        .expect("timed out waiting for client close")
        .unwrap();
    assert_eq!(n, 0);

    // One disconnect per direction, and no second exception from the
    // deliberately closed half.
    sleep(Duration::from_millis(100)).await;
    assert!(taps.disconnects.try_recv().is_err());
    assert!(taps.exceptions.try_recv().is_err());
}

#[tokio::test]
async fn test_dial_failure_drops_client_silently() {
    // Bind then drop to find a port with no listener behind it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let (_acceptor, mut taps, addr) = start_bridge(dead_addr).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    recv(&mut taps.accepted).await;

    let mut buf = [0u8; 1];
    let n = timeout(WAIT, client.read(&mut buf))
        .await
        .expect("timed out waiting for client close")
        .unwrap_or(0);
    assert_eq!(n, 0, "client socket should be closed");

    // No bridge-exception fires for a failed dial.
    assert!(taps.exceptions.try_recv().is_err());
}

#[tokio::test]
async fn test_acceptor_restart() {
    let mut upstream = mock_upstream().await;
    let (acceptor, mut taps, first_addr) = start_bridge(upstream.addr).await;

    let attention = frame(PacketType::Attention, PacketStatus::END_OF_MESSAGE, b"");

    // Establish a connection while running.
    let mut client = TcpStream::connect(first_addr).await.unwrap();
    client.write_all(&attention).await.unwrap();
    recv(&mut taps.messages).await;
    upstream.recv_exact(attention.len()).await;

    acceptor.stop().await;
    assert!(acceptor.local_addr().await.is_none());

    // A second start succeeds...
    acceptor.start().await.unwrap();
    let second_addr = acceptor.local_addr().await.unwrap();

    // ...previously established connections continue to operate...
    client.write_all(&attention).await.unwrap();
    recv(&mut taps.messages).await;
    upstream.recv_exact(attention.len()).await;

    // ...and new clients are accepted on the new listener.
    let mut client2 = TcpStream::connect(second_addr).await.unwrap();
    client2.write_all(&attention).await.unwrap();
    recv(&mut taps.messages).await;
    upstream.recv_exact(attention.len()).await;

    acceptor.stop().await;
}
