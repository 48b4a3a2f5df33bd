//! # tdsbridge
//!
//! Transparent TCP bridge for the TDS protocol used by SQL Server.
//!
//! The bridge accepts client connections on a listen port, opens a paired
//! upstream connection to a configured SQL Server endpoint, and shuttles
//! bytes in both directions. The client→server stream is parsed into TDS
//! packets and logical messages as it passes through; the server→client
//! stream is forwarded opaquely. Parsed packets and messages, along with
//! connection lifecycle changes, are published through observer callbacks.
//!
//! The bridge is bit-transparent: every byte received on one side appears
//! in order on the other, so it is compatible with any TDS version the
//! client and server agree on, including PRELOGIN/TLS handshakes (the
//! encrypted bytes are forwarded opaquely once TLS begins inside TDS).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tdsbridge::BridgeAcceptor;
//!
//! let acceptor = BridgeAcceptor::new(
//!     "0.0.0.0:11433".parse()?,
//!     "10.0.0.5:1433".parse()?,
//! );
//! acceptor.events().set_message_received(|conn, message| {
//!     println!("{conn}: {message}");
//! });
//! acceptor.start().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod acceptor;
pub mod connection;
pub mod error;
pub mod events;

pub use acceptor::BridgeAcceptor;
pub use connection::{BridgedConnection, ConnectionInfo, Direction, SocketCouple};
pub use error::{BridgeError, Result};
pub use events::BridgeEvents;
