//! Registration with the node agent
//!
//! A single handshake performed once at startup, after the plugin's own
//! endpoint is already serving: the node agent may dial back the moment
//! Register returns. Failure here is fatal to startup; the caller decides
//! what to do (typically exit and let the supervisor restart the process).

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{info, warn};

use mydevice_proto::{RegisterRequest, RegistrationClient, API_VERSION};

use crate::{Config, PluginError, Result};

/// Announce this plugin's resource and endpoint to the node agent.
pub async fn register(config: &Config) -> Result<()> {
    let channel = dial(config).await?;
    let mut client = RegistrationClient::new(channel);

    let request = RegisterRequest {
        version: API_VERSION.to_string(),
        endpoint: config.socket_name.clone(),
        resource_name: config.resource_name.clone(),
        options: None,
    };

    info!(
        resource = %config.resource_name,
        endpoint = %config.socket_name,
        "Registering with node agent"
    );

    client
        .register(request)
        .await
        .map_err(PluginError::RegistrationRejected)?;

    info!("Registered with node agent");
    Ok(())
}

/// Dial the node agent's registration socket, retrying with backoff until
/// the configured budget is spent.
///
/// The agent's socket may appear slightly after ours on node boot; retrying
/// the dial is the readiness check.
async fn dial(config: &Config) -> Result<Channel> {
    let target = config.kubelet_socket.clone();
    let budget = Duration::from_millis(config.register_timeout_ms);
    let deadline = Instant::now() + budget;
    let mut delay = Duration::from_millis(config.register_retry_initial_ms);
    let max_delay = Duration::from_millis(config.register_retry_max_ms);

    loop {
        match connect(&target).await {
            Ok(channel) => return Ok(channel),
            Err(e) => {
                if Instant::now() + delay >= deadline {
                    warn!(socket = %target.display(), "Giving up dialing node agent: {e}");
                    return Err(PluginError::AgentUnreachable {
                        target,
                        waited: budget,
                    });
                }
                warn!("Node agent not reachable yet ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

async fn connect(path: &Path) -> std::result::Result<Channel, tonic::transport::Error> {
    let path: PathBuf = path.to_path_buf();
    // The URI is a placeholder; the connector below always dials the socket.
    Endpoint::try_from("http://[::1]:0")?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                let stream = UnixStream::connect(path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
}
