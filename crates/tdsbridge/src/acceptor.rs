//! Bridge acceptor: listen, accept, dial upstream, and spawn a bridged
//! connection per client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::{BridgedConnection, ConnectionInfo, SocketCouple};
use crate::error::Result;
use crate::events::BridgeEvents;

/// Accepts client connections and bridges each one to the upstream
/// SQL Server endpoint.
///
/// The lifecycle is `Stopped → Running → Stopped`: [`start`] binds the
/// listener and spawns the accept task, [`stop`] closes the listener, and
/// a stopped acceptor may be started again. Stopping does not touch
/// established bridged connections; they run until their sockets close.
///
/// [`start`]: BridgeAcceptor::start
/// [`stop`]: BridgeAcceptor::stop
pub struct BridgeAcceptor {
    listen_addr: SocketAddr,
    upstream_addr: SocketAddr,
    events: Arc<BridgeEvents>,
    next_connection_id: Arc<AtomicU64>,
    state: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    local_addr: SocketAddr,
}

impl BridgeAcceptor {
    /// Create a stopped acceptor for the given listen and upstream
    /// addresses.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, upstream_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            upstream_addr,
            events: Arc::new(BridgeEvents::default()),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            state: Mutex::new(None),
        }
    }

    /// The observer registry. Handlers may be registered or replaced at
    /// any time, before or after [`start`](BridgeAcceptor::start).
    #[must_use]
    pub fn events(&self) -> &BridgeEvents {
        &self.events
    }

    /// Bind the listener and spawn the accept task.
    ///
    /// Starting a running acceptor is a no-op. Fails only when the bind
    /// fails.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            self.upstream_addr,
            Arc::clone(&self.events),
            Arc::clone(&self.next_connection_id),
            cancel.clone(),
        ));

        *state = Some(Running { cancel, local_addr });
        info!(%local_addr, upstream = %self.upstream_addr, "bridge listening");
        Ok(())
    }

    /// Close the listener and stop accepting.
    ///
    /// Stopping a stopped acceptor is a no-op. Outstanding bridged
    /// connections are not awaited.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.take() {
            running.cancel.cancel();
            debug!("bridge stopped");
        }
    }

    /// The address the listener is bound to, or `None` when stopped.
    ///
    /// Useful when listening on port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    upstream_addr: SocketAddr,
    events: Arc<BridgeEvents>,
    ids: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    loop {
        let client = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((client, _peer)) => client,
                Err(error) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    events.on_listener_exception(&listener, &error);
                    continue;
                }
            },
        };

        let id = ids.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(bridge_client(
            client,
            upstream_addr,
            id,
            Arc::clone(&events),
        ));
    }
    // Dropping the listener closes it.
}

async fn bridge_client(
    client: TcpStream,
    upstream_addr: SocketAddr,
    id: u64,
    events: Arc<BridgeEvents>,
) {
    events.on_connection_accepted(&client);

    let upstream = match TcpStream::connect(upstream_addr).await {
        Ok(upstream) => upstream,
        Err(error) => {
            // Mirror the reference bridge: drop the client silently when
            // the upstream dial fails.
            debug!(%upstream_addr, %error, "upstream dial failed, dropping client");
            return;
        }
    };

    let info = match (client.peer_addr(), upstream.peer_addr()) {
        (Ok(client_addr), Ok(upstream_addr)) => ConnectionInfo::new(id, client_addr, upstream_addr),
        (Err(error), _) | (_, Err(error)) => {
            debug!(%error, "peer address unavailable, dropping connection");
            return;
        }
    };

    debug!(connection = %info, "bridging connection");
    BridgedConnection::new(info, SocketCouple { client, upstream }, events)
        .run()
        .await;
}
