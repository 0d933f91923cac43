//! Environment bootstrap
//!
//! One-time provisioning of the remote objects a host needs before any
//! volume operation: project, host record, initiator, IP network with its
//! endpoints, and the export group. Every step tolerates "already exists"
//! so the driver can be constructed repeatedly against the same controller;
//! anything else aborts construction.

use crate::config::DriverConfig;
use crate::controlplane::session::SessionManager;
use crate::domain::ports::ControllerApiRef;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Protocol registered for the local initiator.
const INITIATOR_PROTOCOL: &str = "iSCSI";

/// Export group type for a single-host group.
const EXPORT_GROUP_TYPE: &str = "Host";

/// Network type of the driver's fixed network.
const NETWORK_TYPE: &str = "IP";

/// Idempotently provisions the fixed set of remote objects for one host.
pub struct EnvironmentBootstrapper {
    api: ControllerApiRef,
    session: SessionManager,
    config: DriverConfig,
    host: String,
}

impl EnvironmentBootstrapper {
    pub fn new(
        api: ControllerApiRef,
        session: SessionManager,
        config: DriverConfig,
        host: String,
    ) -> Self {
        Self {
            api,
            session,
            config,
            host,
        }
    }

    /// Run all setup steps in order. Safe to call more than once.
    pub async fn run(&self) -> Result<()> {
        self.session.ensure_authenticated().await?;

        let initiator = read_initiator_name(&self.config.iscsi_config_path)?;
        info!(host = %self.host, initiator = %initiator, "bootstrapping controller environment");

        self.create_project().await?;
        self.create_host().await?;
        self.register_initiator(&initiator).await?;
        self.create_network(&initiator).await?;
        self.create_export_group(&initiator).await?;

        info!("controller environment ready");
        Ok(())
    }

    async fn create_project(&self) -> Result<()> {
        let project = self.config.scoped_project();
        swallow_exists(
            self.api.project_create(&project, &self.config.tenant).await,
            "project",
            &project,
        )
    }

    async fn create_host(&self) -> Result<()> {
        if self.api.host_search(&self.host).await?.is_some() {
            debug!(host = %self.host, "host record already exists, reusing");
            return Ok(());
        }
        swallow_exists(
            self.api.host_create(&self.host, &self.config.tenant).await,
            "host",
            &self.host,
        )
    }

    async fn register_initiator(&self, initiator: &str) -> Result<()> {
        swallow_exists(
            self.api
                .initiator_create(&self.host, INITIATOR_PROTOCOL, initiator)
                .await,
            "initiator",
            initiator,
        )
    }

    /// Create (or reuse) the fixed IP network, then register every
    /// IP-capable storage port plus the local initiator port as endpoints.
    /// Endpoint registration only ever grows the set; duplicates are
    /// swallowed per endpoint so a partial earlier run completes here.
    async fn create_network(&self, initiator: &str) -> Result<()> {
        let name = &self.config.network_name;
        if self.api.network_query(name).await?.is_some() {
            debug!(network = %name, "network already exists, reusing");
        } else {
            swallow_exists(
                self.api.network_create(name, NETWORK_TYPE).await,
                "network",
                name,
            )?;
        }

        let systems = self.api.list_storage_systems(&self.config.varray).await?;
        for system in &systems {
            let ports = self.api.list_storage_ports(system).await?;
            for port in ports {
                // IP-capable ports are iqn-named, so they start with 'i'.
                if !port.starts_with('i') {
                    continue;
                }
                swallow_exists(
                    self.api.network_add_endpoint(name, &port).await,
                    "network endpoint",
                    &port,
                )?;
            }
        }

        swallow_exists(
            self.api.network_add_endpoint(name, initiator).await,
            "network endpoint",
            initiator,
        )
    }

    async fn create_export_group(&self, initiator: &str) -> Result<()> {
        let group = &self.config.export_group;
        let project = self.config.scoped_project();

        swallow_exists(
            self.api
                .export_group_create(
                    group,
                    &project,
                    &self.config.tenant,
                    &self.config.varray,
                    EXPORT_GROUP_TYPE,
                )
                .await,
            "export group",
            group,
        )?;

        swallow_exists(
            self.api
                .export_group_add_host(group, &self.config.tenant, &project, &self.host)
                .await,
            "export group host",
            &self.host,
        )?;
        swallow_exists(
            self.api
                .export_group_add_initiator(
                    group,
                    &self.config.tenant,
                    &project,
                    initiator,
                    &self.host,
                )
                .await,
            "export group initiator",
            initiator,
        )
    }
}

/// Treat "already exists" as success; everything else is a fatal setup
/// failure.
fn swallow_exists(result: Result<()>, kind: &str, name: &str) -> Result<()> {
    match result {
        Err(err) if err.is_already_exists() => {
            debug!(kind, name, "already exists, treating as success");
            Ok(())
        }
        Err(err) => {
            warn!(kind, name, error = %err, "environment setup step failed");
            Err(err)
        }
        Ok(()) => Ok(()),
    }
}

/// Read the local iSCSI initiator name: the value of the first uncommented
/// `InitiatorName=` line, trailing whitespace stripped.
pub fn read_initiator_name(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "InitiatorName" && !value.trim().is_empty() {
                return Ok(value.trim().to_string());
            }
        }
    }
    Err(Error::Configuration(format!(
        "no InitiatorName entry in {}",
        path.display()
    )))
}
