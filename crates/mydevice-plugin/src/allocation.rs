//! Allocation responses
//!
//! Builds the environment variables and host-device mappings the node agent
//! injects into each workload. Responses are a pure function of the request
//! and the current snapshot: entry `i` of the response answers entry `i` of
//! the request, always.

use std::collections::HashMap;
use std::sync::Arc;

use mydevice_proto::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse,
    ContainerPreferredAllocationResponse, DeviceSpec, PreferredAllocationRequest,
    PreferredAllocationResponse,
};

use crate::inventory::{DeviceSource, Health};
use crate::{PluginError, Result};

/// Environment variable injected into every workload granted the device.
pub const DEVICE_ENV: &str = "MYDEVICE_ENABLED";

/// Host node the mapped device resolves to.
pub const DEVICE_HOST_PATH: &str = "/dev/null";

/// Path the device appears at inside the workload.
pub const DEVICE_CONTAINER_PATH: &str = "/dev/null";

/// Access mode granted on the mapped device.
pub const DEVICE_PERMISSIONS: &str = "rw";

/// Answers allocation requests against the current device snapshot.
pub struct Allocator {
    source: Arc<dyn DeviceSource>,
}

impl Allocator {
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self { source }
    }

    /// Build one response entry per container request, in request order.
    ///
    /// Every requested id must exist in the current snapshot. An unknown id
    /// fails the whole call: handing the workload a mapping to a device
    /// that does not exist is worse than rejecting the scheduling attempt.
    pub fn allocate(&self, request: &AllocateRequest) -> Result<AllocateResponse> {
        let snapshot = self.source.current();

        let mut container_responses = Vec::with_capacity(request.container_requests.len());
        for container in &request.container_requests {
            let mut devices = Vec::with_capacity(container.device_ids.len());
            for id in &container.device_ids {
                if !snapshot.contains(id) {
                    return Err(PluginError::UnknownResource(id.clone()));
                }
                devices.push(DeviceSpec {
                    container_path: DEVICE_CONTAINER_PATH.to_string(),
                    host_path: DEVICE_HOST_PATH.to_string(),
                    permissions: DEVICE_PERMISSIONS.to_string(),
                });
            }

            let mut envs = HashMap::new();
            envs.insert(DEVICE_ENV.to_string(), "1".to_string());

            container_responses.push(ContainerAllocateResponse {
                envs,
                mounts: vec![],
                devices,
                annotations: HashMap::new(),
            });
        }

        Ok(AllocateResponse {
            container_responses,
        })
    }

    /// Non-binding hint for choosing among equivalent devices.
    ///
    /// Per container: the must-include ids first, then available healthy
    /// devices in snapshot order until the asked size is reached.
    /// Deterministic for a given request and snapshot; no side effects.
    pub fn preferred_allocation(
        &self,
        request: &PreferredAllocationRequest,
    ) -> PreferredAllocationResponse {
        let snapshot = self.source.current();

        let container_responses = request
            .container_requests
            .iter()
            .map(|container| {
                let wanted = usize::try_from(container.allocation_size).unwrap_or(0);
                let mut device_ids: Vec<String> = container.must_include_device_ids.clone();

                for device in &snapshot.devices {
                    if device_ids.len() >= wanted {
                        break;
                    }
                    if device.health != Health::Healthy {
                        continue;
                    }
                    if container.available_device_ids.contains(&device.id)
                        && !device_ids.contains(&device.id)
                    {
                        device_ids.push(device.id.clone());
                    }
                }

                ContainerPreferredAllocationResponse { device_ids }
            })
            .collect();

        PreferredAllocationResponse {
            container_responses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Device, StaticDeviceSource};
    use mydevice_proto::{ContainerAllocateRequest, ContainerPreferredAllocationRequest};

    fn allocator(devices: Vec<Device>) -> Allocator {
        Allocator::new(Arc::new(StaticDeviceSource::new(devices)))
    }

    fn request_for(ids: &[&[&str]]) -> AllocateRequest {
        AllocateRequest {
            container_requests: ids
                .iter()
                .map(|ids| ContainerAllocateRequest {
                    device_ids: ids.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn single_device_allocation() {
        let allocator = allocator(vec![Device::healthy("dev1")]);

        let response = allocator.allocate(&request_for(&[&["dev1"]])).unwrap();

        assert_eq!(response.container_responses.len(), 1);
        let container = &response.container_responses[0];
        assert_eq!(container.envs.get(DEVICE_ENV), Some(&"1".to_string()));
        assert_eq!(container.devices.len(), 1);
        assert_eq!(container.devices[0].host_path, DEVICE_HOST_PATH);
        assert_eq!(container.devices[0].permissions, "rw");
    }

    #[test]
    fn response_order_matches_request_order() {
        let allocator = allocator(vec![Device::healthy("dev1"), Device::healthy("dev2")]);

        let response = allocator
            .allocate(&request_for(&[&["dev2"], &[], &["dev1", "dev2"]]))
            .unwrap();

        assert_eq!(response.container_responses.len(), 3);
        assert_eq!(response.container_responses[0].devices.len(), 1);
        assert_eq!(response.container_responses[1].devices.len(), 0);
        assert_eq!(response.container_responses[2].devices.len(), 2);
    }

    #[test]
    fn unknown_device_fails_the_call() {
        let allocator = allocator(vec![Device::healthy("dev1")]);

        let err = allocator
            .allocate(&request_for(&[&["dev1"], &["ghost"]]))
            .unwrap_err();

        match err {
            PluginError::UnknownResource(id) => assert_eq!(id, "ghost"),
            other => panic!("expected UnknownResource, got {other:?}"),
        }
    }

    #[test]
    fn device_may_be_shared_across_workloads() {
        let allocator = allocator(vec![Device::healthy("dev1")]);

        let response = allocator
            .allocate(&request_for(&[&["dev1"], &["dev1"]]))
            .unwrap();

        assert_eq!(response.container_responses.len(), 2);
        for container in &response.container_responses {
            assert_eq!(container.envs.get(DEVICE_ENV), Some(&"1".to_string()));
            assert_eq!(container.devices.len(), 1);
        }
    }

    #[test]
    fn preferred_allocation_is_deterministic() {
        let allocator = allocator(vec![
            Device::healthy("dev1"),
            Device {
                id: "dev2".to_string(),
                health: Health::Unhealthy,
            },
            Device::healthy("dev3"),
        ]);

        let request = PreferredAllocationRequest {
            container_requests: vec![ContainerPreferredAllocationRequest {
                available_device_ids: vec![
                    "dev1".to_string(),
                    "dev2".to_string(),
                    "dev3".to_string(),
                ],
                must_include_device_ids: vec![],
                allocation_size: 2,
            }],
        };

        let first = allocator.preferred_allocation(&request);
        let second = allocator.preferred_allocation(&request);
        assert_eq!(first, second);

        // Unhealthy dev2 is skipped; healthy devices come in snapshot order.
        assert_eq!(
            first.container_responses[0].device_ids,
            vec!["dev1".to_string(), "dev3".to_string()]
        );
    }

    #[test]
    fn preferred_allocation_keeps_must_include_first() {
        let allocator = allocator(vec![Device::healthy("dev1"), Device::healthy("dev2")]);

        let request = PreferredAllocationRequest {
            container_requests: vec![ContainerPreferredAllocationRequest {
                available_device_ids: vec!["dev1".to_string(), "dev2".to_string()],
                must_include_device_ids: vec!["dev2".to_string()],
                allocation_size: 2,
            }],
        };

        let response = allocator.preferred_allocation(&request);
        assert_eq!(
            response.container_responses[0].device_ids,
            vec!["dev2".to_string(), "dev1".to_string()]
        );
    }
}
