//! Test helpers for exercising the plugin over real unix sockets
//!
//! Provides an in-process stand-in for the node agent's registration
//! endpoint and a client dialer for the plugin's own socket.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hyper_util::rt::TokioIo;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::{Channel, Endpoint, Server, Uri};
use tonic::{Request, Response, Status};
use tower::service_fn;

use mydevice_plugin::Config;
use mydevice_proto::{
    DevicePluginClient, Empty, RegisterRequest, Registration, RegistrationServer, API_VERSION,
};

/// Fake node agent: accepts registrations on `kubelet.sock` and records
/// every request it sees.
pub struct FakeKubelet {
    pub requests: Arc<Mutex<Vec<RegisterRequest>>>,
    expected_version: String,
}

impl FakeKubelet {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            expected_version: API_VERSION.to_string(),
        }
    }

    /// A node agent speaking a different protocol version; it rejects
    /// everything our plugin sends.
    pub fn expecting_version(version: &str) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            expected_version: version.to_string(),
        }
    }

    /// Serve the registration endpoint on `socket` until the handle is
    /// aborted or the test ends.
    pub fn spawn(&self, socket: &Path) -> JoinHandle<()> {
        let service = RegistrationService {
            requests: self.requests.clone(),
            expected_version: self.expected_version.clone(),
        };
        let listener = UnixListener::bind(socket).unwrap();

        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(RegistrationServer::new(service))
                .serve_with_incoming(UnixListenerStream::new(listener))
                .await;
        })
    }

    pub fn registered(&self) -> Vec<RegisterRequest> {
        self.requests.lock().unwrap().clone()
    }
}

struct RegistrationService {
    requests: Arc<Mutex<Vec<RegisterRequest>>>,
    expected_version: String,
}

#[tonic::async_trait]
impl Registration for RegistrationService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        if req.version != self.expected_version {
            return Err(Status::invalid_argument(format!(
                "unsupported API version {}",
                req.version
            )));
        }
        self.requests.lock().unwrap().push(req);
        Ok(Response::new(Empty {}))
    }
}

/// Dial a device-plugin endpoint over its unix socket.
pub async fn connect_plugin(socket: &Path) -> DevicePluginClient<Channel> {
    let path: PathBuf = socket.to_path_buf();
    let channel = Endpoint::try_from("http://[::1]:0")
        .unwrap()
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                let stream = UnixStream::connect(path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .unwrap();
    DevicePluginClient::new(channel)
}

/// Config with both sockets under `dir` and short registration budgets.
pub fn test_config(dir: &Path) -> Config {
    Config {
        plugin_dir: dir.to_path_buf(),
        kubelet_socket: dir.join("kubelet.sock"),
        register_timeout_ms: 2_000,
        register_retry_initial_ms: 50,
        register_retry_max_ms: 200,
        ..Config::default()
    }
}
