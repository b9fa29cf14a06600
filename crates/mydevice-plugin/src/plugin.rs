//! Plugin lifecycle
//!
//! [`PluginServer`] owns the serving task and shutdown handle as instance
//! state, so several plugins can coexist in one process (tests start more
//! than one). Startup order matters: the endpoint must be serving before
//! registration returns, because the node agent may dial back immediately.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use mydevice_proto::DevicePluginServer;

use crate::inventory::DeviceSource;
use crate::service::{DevicePluginService, PreStartHook};
use crate::{endpoint, registration, Config, Result};

pub struct PluginServer {
    config: Config,
    source: Arc<dyn DeviceSource>,
    pre_start: Option<Arc<dyn PreStartHook>>,
    shutdown: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

impl PluginServer {
    pub fn new(config: Config, source: Arc<dyn DeviceSource>) -> Self {
        Self {
            config,
            source,
            pre_start: None,
            shutdown: None,
            serve_task: None,
        }
    }

    /// Run a preparation hook before each workload start and advertise it.
    pub fn with_pre_start_hook(mut self, hook: Arc<dyn PreStartHook>) -> Self {
        self.pre_start = Some(hook);
        self
    }

    /// Bind the endpoint, start serving, then register with the node agent.
    pub async fn start(&mut self) -> Result<()> {
        let socket_path = self.config.socket_path();
        let listener = endpoint::prepare(&socket_path)?;

        let mut service = DevicePluginService::new(self.source.clone());
        if let Some(hook) = &self.pre_start {
            service = service.with_pre_start_hook(hook.clone());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let incoming = UnixListenerStream::new(listener);

        let serve_task = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Plugin endpoint server failed: {e}");
            }
        });

        self.shutdown = Some(shutdown_tx);
        self.serve_task = Some(serve_task);

        if let Err(e) = registration::register(&self.config).await {
            // Registration is fatal; do not keep serving unregistered.
            self.stop().await;
            return Err(e);
        }

        info!(
            resource = %self.config.resource_name,
            socket = %socket_path.display(),
            "Device plugin started"
        );
        Ok(())
    }

    /// Signal shutdown and wait for the serving task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.serve_task.take() {
            let _ = task.await;
        }
    }
}
