//! gRPC service surface
//!
//! Implements the device-plugin interface the node agent drives after
//! registration. Tonic runs each handler in its own task, so the inventory
//! stream and Allocate calls proceed concurrently; the stream loop clones
//! the snapshot before sending and never holds a borrow across a write.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use mydevice_proto::{
    AllocateRequest, AllocateResponse, DevicePlugin, DevicePluginOptions, Empty,
    ListAndWatchResponse, PreStartContainerRequest, PreStartContainerResponse,
    PreferredAllocationRequest, PreferredAllocationResponse,
};

use crate::allocation::Allocator;
use crate::inventory::DeviceSource;
use crate::PluginError;

/// Last-second device preparation run before a workload starts.
///
/// A failing hook blocks only the workload it was invoked for; the plugin
/// keeps serving.
#[async_trait]
pub trait PreStartHook: Send + Sync {
    async fn prepare(&self, device_ids: &[String]) -> Result<(), String>;
}

/// Acknowledges without doing anything. Used unless a real hook is
/// installed.
pub struct NoopPreStartHook;

#[async_trait]
impl PreStartHook for NoopPreStartHook {
    async fn prepare(&self, _device_ids: &[String]) -> Result<(), String> {
        Ok(())
    }
}

/// The full interface surface the node agent is allowed to call.
pub struct DevicePluginService {
    source: Arc<dyn DeviceSource>,
    allocator: Allocator,
    pre_start: Arc<dyn PreStartHook>,
    options: DevicePluginOptions,
}

impl DevicePluginService {
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            allocator: Allocator::new(source.clone()),
            source,
            pre_start: Arc::new(NoopPreStartHook),
            options: DevicePluginOptions {
                pre_start_required: false,
                get_preferred_allocation_available: true,
            },
        }
    }

    /// Install a real pre-start hook and advertise it to the node agent.
    pub fn with_pre_start_hook(mut self, hook: Arc<dyn PreStartHook>) -> Self {
        self.pre_start = hook;
        self.options.pre_start_required = true;
        self
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    type ListAndWatchStream =
        Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send>>;

    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(self.options.clone()))
    }

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        let mut updates = self.source.subscribe();
        let (tx, rx) = mpsc::channel(4);

        info!("Node agent opened inventory stream");

        tokio::spawn(async move {
            loop {
                let snapshot = updates.borrow_and_update().clone();
                debug!(
                    revision = snapshot.revision,
                    devices = snapshot.devices.len(),
                    "Pushing inventory"
                );

                let message = ListAndWatchResponse {
                    devices: snapshot.to_wire(),
                };
                if tx.send(Ok(message)).await.is_err() {
                    // Peer closed its end: end of interest, not an error.
                    debug!("Inventory stream closed by peer");
                    break;
                }

                if updates.changed().await.is_err() {
                    // Source dropped; nothing further to report.
                    break;
                }
            }
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::ListAndWatchStream
        ))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let req = request.into_inner();
        info!(containers = req.container_requests.len(), "Allocate");

        match self.allocator.allocate(&req) {
            Ok(response) => Ok(Response::new(response)),
            Err(e) => {
                warn!(error = %e, "Allocation failed");
                Err(e.to_status())
            }
        }
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        let response = self.allocator.preferred_allocation(&request.into_inner());
        Ok(Response::new(response))
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        let req = request.into_inner();

        if let Err(reason) = self.pre_start.prepare(&req.device_ids).await {
            let err = PluginError::PreStartFailed(reason);
            warn!(error = %err, "Pre-start hook failed");
            return Err(err.to_status());
        }

        Ok(Response::new(PreStartContainerResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Device, StaticDeviceSource};
    use tokio_stream::StreamExt;

    fn service_with_source() -> (Arc<StaticDeviceSource>, DevicePluginService) {
        let source = Arc::new(StaticDeviceSource::single_default());
        let service = DevicePluginService::new(source.clone());
        (source, service)
    }

    #[tokio::test]
    async fn options_advertise_preferred_allocation() {
        let (_source, service) = service_with_source();

        let options = service
            .get_device_plugin_options(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();

        assert!(options.get_preferred_allocation_available);
        assert!(!options.pre_start_required);
    }

    #[tokio::test]
    async fn stream_sends_current_inventory_then_updates() {
        let (source, service) = service_with_source();

        let mut stream = service
            .list_and_watch(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.devices.len(), 1);
        assert_eq!(first.devices[0].id, "dev1");
        assert_eq!(first.devices[0].health, "Healthy");

        source.replace(vec![Device::healthy("dev1"), Device::healthy("dev2")]);

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.devices.len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_is_not_an_error() {
        let (source, service) = service_with_source();

        let stream = service
            .list_and_watch(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        drop(stream);

        // The push task must exit quietly; further replacements still work.
        source.replace(vec![Device::healthy("dev1"), Device::healthy("dev2")]);
        assert_eq!(source.current().devices.len(), 2);
    }

    #[tokio::test]
    async fn unknown_device_maps_to_not_found() {
        let (_source, service) = service_with_source();

        let request = AllocateRequest {
            container_requests: vec![mydevice_proto::ContainerAllocateRequest {
                device_ids: vec!["ghost".to_string()],
            }],
        };

        let status = service
            .allocate(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    struct FailingHook;

    #[async_trait]
    impl PreStartHook for FailingHook {
        async fn prepare(&self, _device_ids: &[String]) -> Result<(), String> {
            Err("device warm-up failed".to_string())
        }
    }

    #[tokio::test]
    async fn failing_pre_start_hook_fails_only_that_call() {
        let source = Arc::new(StaticDeviceSource::single_default());
        let service =
            DevicePluginService::new(source).with_pre_start_hook(Arc::new(FailingHook));

        let status = service
            .pre_start_container(Request::new(PreStartContainerRequest {
                device_ids: vec!["dev1".to_string()],
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        // The service keeps answering other calls.
        let options = service
            .get_device_plugin_options(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert!(options.pre_start_required);
    }

    #[tokio::test]
    async fn noop_hook_acknowledges() {
        let (_source, service) = service_with_source();

        let response = service
            .pre_start_container(Request::new(PreStartContainerRequest {
                device_ids: vec!["dev1".to_string()],
            }))
            .await;
        assert!(response.is_ok());
    }
}
