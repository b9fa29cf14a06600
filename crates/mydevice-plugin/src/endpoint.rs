//! Plugin endpoint preparation
//!
//! The node agent caches the endpoint path it was given at registration and
//! reconnects to it across plugin restarts. A socket file left behind by a
//! previous run must therefore be removed before rebinding; otherwise the
//! bind fails and the agent keeps dialing a dead socket.

use std::io;
use std::path::Path;

use tokio::net::UnixListener;
use tracing::{debug, info};

use crate::{PluginError, Result};

/// Remove any stale socket file at `path` and bind a fresh listener.
pub fn prepare(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale endpoint socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(PluginError::EndpointBusy {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    let listener = UnixListener::bind(path).map_err(|e| PluginError::Bind {
        path: path.to_path_buf(),
        source: e,
    })?;

    info!(path = %path.display(), "Listening on plugin endpoint");
    Ok(listener)
}
