//! Observer callbacks for bridge events.
//!
//! Hosts register at most one handler per event kind; registering again
//! replaces the previous handler, and unset handlers are silent. Handlers
//! run synchronously on the task that produced the event and may be
//! invoked concurrently from different connections, so a handler shared
//! across connections is responsible for its own synchronization and must
//! not block on long-running work without offloading it.

use std::sync::RwLock;

use tds_framing::{Message, Packet};
use tokio::net::{TcpListener, TcpStream};

use crate::connection::{ConnectionInfo, Direction};
use crate::error::BridgeError;

/// Handler for newly accepted client sockets.
pub type ConnectionAcceptedHandler = Box<dyn Fn(&TcpStream) + Send + Sync>;
/// Handler for each parsed client→server packet.
pub type PacketReceivedHandler = Box<dyn Fn(&ConnectionInfo, &Packet) + Send + Sync>;
/// Handler for each completed client→server message.
pub type MessageReceivedHandler = Box<dyn Fn(&ConnectionInfo, &Message) + Send + Sync>;
/// Handler for forwarding failures on either direction of a connection.
pub type BridgeExceptionHandler =
    Box<dyn Fn(&ConnectionInfo, Direction, &BridgeError) + Send + Sync>;
/// Handler for accept-loop failures.
pub type ListenerExceptionHandler = Box<dyn Fn(&TcpListener, &std::io::Error) + Send + Sync>;
/// Handler for per-direction connection teardown.
pub type ConnectionDisconnectedHandler = Box<dyn Fn(&ConnectionInfo, Direction) + Send + Sync>;

/// Registry of bridge event handlers, owned by the acceptor and shared
/// with every connection it spawns.
#[derive(Default)]
pub struct BridgeEvents {
    connection_accepted: RwLock<Option<ConnectionAcceptedHandler>>,
    packet_received: RwLock<Option<PacketReceivedHandler>>,
    message_received: RwLock<Option<MessageReceivedHandler>>,
    bridge_exception: RwLock<Option<BridgeExceptionHandler>>,
    listener_exception: RwLock<Option<ListenerExceptionHandler>>,
    connection_disconnected: RwLock<Option<ConnectionDisconnectedHandler>>,
}

impl BridgeEvents {
    /// Register the handler for accepted client connections.
    pub fn set_connection_accepted<F>(&self, handler: F)
    where
        F: Fn(&TcpStream) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.connection_accepted.write() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Register the handler for parsed client→server packets.
    pub fn set_packet_received<F>(&self, handler: F)
    where
        F: Fn(&ConnectionInfo, &Packet) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.packet_received.write() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Register the handler for completed client→server messages.
    pub fn set_message_received<F>(&self, handler: F)
    where
        F: Fn(&ConnectionInfo, &Message) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.message_received.write() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Register the handler for forwarding failures.
    pub fn set_bridge_exception<F>(&self, handler: F)
    where
        F: Fn(&ConnectionInfo, Direction, &BridgeError) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.bridge_exception.write() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Register the handler for accept-loop failures.
    pub fn set_listener_exception<F>(&self, handler: F)
    where
        F: Fn(&TcpListener, &std::io::Error) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.listener_exception.write() {
            *slot = Some(Box::new(handler));
        }
    }

    /// Register the handler for per-direction connection teardown.
    pub fn set_connection_disconnected<F>(&self, handler: F)
    where
        F: Fn(&ConnectionInfo, Direction) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.connection_disconnected.write() {
            *slot = Some(Box::new(handler));
        }
    }

    pub(crate) fn on_connection_accepted(&self, socket: &TcpStream) {
        if let Ok(slot) = self.connection_accepted.read() {
            if let Some(handler) = slot.as_ref() {
                handler(socket);
            }
        }
    }

    pub(crate) fn on_packet_received(&self, connection: &ConnectionInfo, packet: &Packet) {
        if let Ok(slot) = self.packet_received.read() {
            if let Some(handler) = slot.as_ref() {
                handler(connection, packet);
            }
        }
    }

    pub(crate) fn on_message_received(&self, connection: &ConnectionInfo, message: &Message) {
        if let Ok(slot) = self.message_received.read() {
            if let Some(handler) = slot.as_ref() {
                handler(connection, message);
            }
        }
    }

    pub(crate) fn on_bridge_exception(
        &self,
        connection: &ConnectionInfo,
        direction: Direction,
        error: &BridgeError,
    ) {
        if let Ok(slot) = self.bridge_exception.read() {
            if let Some(handler) = slot.as_ref() {
                handler(connection, direction, error);
            }
        }
    }

    pub(crate) fn on_listener_exception(&self, listener: &TcpListener, error: &std::io::Error) {
        if let Ok(slot) = self.listener_exception.read() {
            if let Some(handler) = slot.as_ref() {
                handler(listener, error);
            }
        }
    }

    pub(crate) fn on_connection_disconnected(
        &self,
        connection: &ConnectionInfo,
        direction: Direction,
    ) {
        if let Ok(slot) = self.connection_disconnected.read() {
            if let Some(handler) = slot.as_ref() {
                handler(connection, direction);
            }
        }
    }
}
