//! MyDevice Device Plugin
//!
//! This crate implements the plugin side of the node agent's device-plugin
//! protocol: it advertises the `example.com/mydevice` resource over a local
//! socket and answers allocation requests for workloads scheduled onto it.
//!
//! Key pieces:
//! - One-shot registration with the node agent
//! - Long-lived inventory stream (current set first, then every change)
//! - Deterministic per-container allocation responses
//! - Substitutable device source, static in this build

pub mod allocation;
pub mod config;
pub mod endpoint;
pub mod inventory;
pub mod plugin;
pub mod registration;
pub mod service;

pub use allocation::Allocator;
pub use config::Config;
pub use inventory::{Device, DeviceSnapshot, DeviceSource, Health, StaticDeviceSource};
pub use plugin::PluginServer;
pub use service::{DevicePluginService, NoopPreStartHook, PreStartHook};

use std::path::PathBuf;
use std::time::Duration;

use tonic::Status;

/// Plugin result type
pub type Result<T> = std::result::Result<T, PluginError>;

/// Plugin error types
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Endpoint {path:?} is busy: {source}")]
    EndpointBusy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to bind endpoint {path:?}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Node agent at {target:?} unreachable after {waited:?}")]
    AgentUnreachable { target: PathBuf, waited: Duration },

    #[error("Registration rejected by node agent: {0}")]
    RegistrationRejected(Status),

    #[error("Unknown device requested: {0}")]
    UnknownResource(String),

    #[error("Pre-start hook failed: {0}")]
    PreStartFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Map a per-call failure onto the status reported for that RPC.
    ///
    /// Startup errors never travel this path; they abort the process
    /// instead of reaching a peer.
    pub fn to_status(&self) -> Status {
        match self {
            PluginError::UnknownResource(id) => Status::not_found(format!("unknown device: {id}")),
            PluginError::PreStartFailed(reason) => Status::failed_precondition(reason.clone()),
            other => Status::internal(other.to_string()),
        }
    }
}
