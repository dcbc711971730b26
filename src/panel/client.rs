//! HTTP client for the panel API.
//!
//! Authentication rides in the query string (`apikey`); every instance call
//! also carries the instance uuid and the daemon id the panel expects.

use super::{ControlPlane, InstanceDescriptor, InstanceStatus};
use crate::config::PanelConfig;
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

/// Every panel response wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct InstanceDetail {
    status: i32,
    config: InstanceDetailConfig,
}

#[derive(Debug, Deserialize)]
struct InstanceDetailConfig {
    cwd: String,
}

pub struct PanelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    daemon_id: String,
}

impl PanelClient {
    pub fn new(config: &PanelConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            daemon_id: config.daemon_id.clone(),
        })
    }

    async fn fetch_detail(&self, instance: &InstanceDescriptor) -> Result<InstanceDetail> {
        let response = self
            .http
            .get(format!("{}/api/instance", self.base_url))
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("uuid", instance.remote_id.as_str()),
                ("daemonId", self.daemon_id.as_str()),
            ])
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope<InstanceDetail> = response.json().await?;
        Ok(envelope.data)
    }

    async fn send_command(&self, instance: &InstanceDescriptor, command: &str) -> Result<()> {
        self.http
            .get(format!("{}/api/protected_instance/command", self.base_url))
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("uuid", instance.remote_id.as_str()),
                ("daemonId", self.daemon_id.as_str()),
                ("command", command),
            ])
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for PanelClient {
    async fn status(&self, instance: &InstanceDescriptor) -> Result<InstanceStatus> {
        let detail = self.fetch_detail(instance).await?;
        InstanceStatus::from_code(detail.status).ok_or(BackupError::Status(detail.status))
    }

    async fn working_directory(&self, instance: &InstanceDescriptor) -> Result<PathBuf> {
        let detail = self.fetch_detail(instance).await?;
        Ok(PathBuf::from(detail.config.cwd))
    }

    async fn pause_writes(&self, instance: &InstanceDescriptor) -> Result<()> {
        self.send_command(instance, "save-off").await
    }

    async fn resume_writes(&self, instance: &InstanceDescriptor) -> Result<()> {
        self.send_command(instance, "save-on").await
    }
}
