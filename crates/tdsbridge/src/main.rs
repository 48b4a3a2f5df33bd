//! tdsbridge binary: transparent TDS bridge for SQL Server.
//!
//! Listens on a local port, forwards every connection to the configured
//! SQL Server endpoint, and logs the TDS packets and messages observed on
//! the client→server stream. Runs until a newline is read from standard
//! input (or Ctrl-C).

use std::net::SocketAddr;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tds_framing::codec::utf16_byte_len;
use tdsbridge::{BridgeAcceptor, BridgeError, BridgeEvents};

#[cfg(feature = "rpc-dump")]
mod rpc_dump;

#[derive(Parser)]
#[command(name = "tdsbridge")]
#[command(version)]
#[command(about = "Transparent TDS bridge for SQL Server")]
struct Cli {
    /// Port to listen on for client connections
    listen_port: u16,

    /// SQL Server host name or address
    sql_server_address: String,

    /// SQL Server port
    sql_server_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == clap::error::ErrorKind::MissingRequiredArgument => {
            // A bare invocation prints usage and exits cleanly.
            println!("tdsbridge <listen port> <sql server address> <sql server port>");
            return Ok(());
        }
        Err(e) => e.exit(),
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_level))
        .init();

    // Resolve the SQL Server address; the first result wins.
    let upstream = tokio::net::lookup_host((cli.sql_server_address.as_str(), cli.sql_server_port))
        .await?
        .next()
        .ok_or_else(|| BridgeError::Resolve {
            host: cli.sql_server_address.clone(),
        })?;

    let listen = SocketAddr::from(([0, 0, 0, 0], cli.listen_port));
    let acceptor = BridgeAcceptor::new(listen, upstream);
    register_logging(acceptor.events());

    acceptor.start().await?;

    println!("Press enter to kill this process...");
    wait_for_shutdown().await;

    acceptor.stop().await;
    Ok(())
}

/// Wire up handlers that log everything the bridge observes.
fn register_logging(events: &BridgeEvents) {
    events.set_connection_accepted(|socket| match socket.peer_addr() {
        Ok(addr) => info!(%addr, "new connection"),
        Err(_) => info!("new connection"),
    });

    events.set_packet_received(|connection, packet| {
        info!(%connection, %packet, "packet received");
    });

    events.set_message_received(|connection, message| {
        info!(%connection, %message, "message received");

        if let Some(text) = message.batch_text() {
            info!(
                chars = text.chars().count(),
                bytes = utf16_byte_len(&text),
                batch = %text,
                "sql batch"
            );
        }

        #[cfg(feature = "rpc-dump")]
        rpc_dump::dump_rpc(message);
    });

    events.set_bridge_exception(|connection, direction, error| {
        warn!(%connection, %direction, %error, "bridge error");
    });

    events.set_listener_exception(|_listener, error| {
        warn!(%error, "accept failed");
    });

    events.set_connection_disconnected(|connection, direction| {
        info!(%connection, %direction, "connection closed");
    });
}

/// Block until a newline arrives on stdin or the process receives Ctrl-C.
async fn wait_for_shutdown() {
    let read_line = async {
        let mut line = String::new();
        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let _ = stdin.read_line(&mut line).await;
    };

    tokio::select! {
        () = read_line => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
