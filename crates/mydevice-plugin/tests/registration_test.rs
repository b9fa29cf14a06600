//! Registration handshake against a fake node agent

mod helpers;

use helpers::{test_config, FakeKubelet};
use mydevice_plugin::{registration, PluginError};
use mydevice_proto::API_VERSION;

#[tokio::test]
async fn registers_endpoint_and_resource() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let kubelet = FakeKubelet::new();
    let _agent = kubelet.spawn(&config.kubelet_socket);

    registration::register(&config).await.unwrap();

    let requests = kubelet.registered();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].version, API_VERSION);
    assert_eq!(requests[0].endpoint, "example.sock");
    assert_eq!(requests[0].resource_name, "example.com/mydevice");
}

#[tokio::test]
async fn version_mismatch_is_rejected_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let kubelet = FakeKubelet::expecting_version("v1alpha1");
    let _agent = kubelet.spawn(&config.kubelet_socket);

    let err = registration::register(&config).await.unwrap_err();
    match err {
        PluginError::RegistrationRejected(status) => {
            assert_eq!(status.code(), tonic::Code::InvalidArgument);
        }
        other => panic!("expected RegistrationRejected, got {other:?}"),
    }
    assert!(kubelet.registered().is_empty());
}

#[tokio::test]
async fn unreachable_agent_exhausts_dial_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.register_timeout_ms = 300;

    // No agent is listening on kubelet.sock at all.
    let err = registration::register(&config).await.unwrap_err();
    match err {
        PluginError::AgentUnreachable { target, .. } => {
            assert_eq!(target, config.kubelet_socket);
        }
        other => panic!("expected AgentUnreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn dial_retries_until_agent_appears() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let kubelet = FakeKubelet::new();
    let socket = config.kubelet_socket.clone();
    let spawn_config = config.clone();

    // Bring the agent up only after the plugin has started dialing.
    let register = tokio::spawn(async move { registration::register(&spawn_config).await });
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    let _agent = kubelet.spawn(&socket);

    register.await.unwrap().unwrap();
    assert_eq!(kubelet.registered().len(), 1);
}
