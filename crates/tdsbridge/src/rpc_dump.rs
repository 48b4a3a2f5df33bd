//! Debug dump of RPC request payloads to `./dev/<N>.raw` files.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tds_framing::{Message, MessageKind};
use tracing::{info, warn};

// Process-wide counter so concurrent connections get unique file names.
static NEXT_DUMP: AtomicU64 = AtomicU64::new(1);

/// Write a completed RPC request payload to `./dev/<N>.raw`.
///
/// Dumping is best-effort: failures are logged and swallowed.
pub fn dump_rpc(message: &Message) {
    if message.kind() != MessageKind::RpcRequest {
        return;
    }

    let n = NEXT_DUMP.fetch_add(1, Ordering::SeqCst);
    let path = PathBuf::from("dev").join(format!("{n}.raw"));
    let payload = message.assemble_payload();

    match OpenOptions::new().create(true).write(true).open(&path) {
        Ok(mut file) => {
            if let Err(error) = file.write_all(&payload) {
                warn!(path = %path.display(), %error, "failed to write RPC dump");
            } else {
                info!(path = %path.display(), bytes = payload.len(), "wrote RPC dump");
            }
        }
        Err(error) => warn!(path = %path.display(), %error, "failed to create RPC dump"),
    }
}
