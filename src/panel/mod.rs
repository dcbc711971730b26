//! Panel control plane: instance run state, working directories and
//! autosave toggling, consumed as an external capability.

pub mod client;

pub use client::PanelClient;

use crate::utils::errors::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// One managed server instance, as registered in the configuration.
#[derive(Debug, Clone)]
pub struct InstanceDescriptor {
    pub name: String,

    /// Opaque token identifying the instance on the panel (its uuid)
    pub remote_id: String,
}

/// Run state reported by the panel for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Busy,
    Stopped,
    Stopping,
    Starting,
    Running,
}

impl InstanceStatus {
    /// Decode the panel's wire status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Busy),
            0 => Some(Self::Stopped),
            1 => Some(Self::Stopping),
            2 => Some(Self::Starting),
            3 => Some(Self::Running),
            _ => None,
        }
    }

    /// Whether live writes must be paused before reading the instance's
    /// working directory.
    pub fn should_pause_writes(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Control-plane capability consumed by the coordinator. Every call may fail
/// with a transport or authorization error; the coordinator applies a
/// conservative fallback per call site.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn status(&self, instance: &InstanceDescriptor) -> Result<InstanceStatus>;

    async fn working_directory(&self, instance: &InstanceDescriptor) -> Result<PathBuf>;

    async fn pause_writes(&self, instance: &InstanceDescriptor) -> Result<()>;

    async fn resume_writes(&self, instance: &InstanceDescriptor) -> Result<()>;
}
