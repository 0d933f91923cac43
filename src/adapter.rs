//! Caller-facing block device adapter
//!
//! Translates dataset identifiers and byte sizes into lifecycle and device
//! resolution calls, and enforces the attachment state machine: no double
//! attach, no detach when unattached, unknown-volume errors for absent
//! datasets. Construction runs the environment bootstrap; a driver is never
//! handed out half-initialized.

use crate::config::{DestroyPolicy, DriverConfig};
use crate::controlplane::bootstrap::EnvironmentBootstrapper;
use crate::controlplane::lifecycle::VolumeLifecycleManager;
use crate::controlplane::retry::RetryingCallExecutor;
use crate::controlplane::session::SessionManager;
use crate::domain::ident::{BlockDeviceId, DatasetId};
use crate::domain::ports::{
    BlockDeviceApi, BlockDeviceVolume, ControllerApiRef, NameResolverRef, ProfileTier, ScsiBusRef,
};
use crate::error::{Error, Result};
use crate::hostbus::resolver::DeviceResolver;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Bytes per gibibyte; the controller provisions and reports in whole GiB.
pub const GIB: u64 = 1 << 30;

/// Block-device driver for one host against one controller.
pub struct BlockDeviceAdapter {
    lifecycle: VolumeLifecycleManager,
    resolver: DeviceResolver,
    scsi: ScsiBusRef,
    destroy_policy: DestroyPolicy,
    instance_id: String,
    allocation_unit: u64,
}

impl BlockDeviceAdapter {
    /// Connect as the local host.
    pub async fn connect(
        config: DriverConfig,
        api: ControllerApiRef,
        scsi: ScsiBusRef,
        resolver: NameResolverRef,
    ) -> Result<Self> {
        let host = local_hostname();
        Self::connect_as(config, api, scsi, resolver, host).await
    }

    /// Connect with an explicit host identity. Bootstraps the controller
    /// environment before returning; a setup failure aborts construction.
    pub async fn connect_as(
        config: DriverConfig,
        api: ControllerApiRef,
        scsi: ScsiBusRef,
        resolver: NameResolverRef,
        host: String,
    ) -> Result<Self> {
        let session = SessionManager::new(api.clone(), config.controller.clone());

        EnvironmentBootstrapper::new(api.clone(), session.clone(), config.clone(), host.clone())
            .run()
            .await?;

        let retry = RetryingCallExecutor::new(session);
        let destroy_policy = config.destroy_policy;
        let lifecycle =
            VolumeLifecycleManager::new(api, retry, resolver, config, host.clone());

        info!(host = %host, "block device adapter ready");
        Ok(Self {
            lifecycle,
            resolver: DeviceResolver::new(scsi.clone()),
            scsi,
            destroy_policy,
            instance_id: host,
            allocation_unit: 1,
        })
    }

    async fn create(
        &self,
        dataset_id: DatasetId,
        size: u64,
        tier: Option<ProfileTier>,
    ) -> Result<BlockDeviceVolume> {
        let name = dataset_id.volume_name();
        if let Some(details) = self.lifecycle.volume_details(&name).await? {
            debug!(volume = %name, "volume already exists, returning existing descriptor");
            return Ok(BlockDeviceVolume {
                size: details.size_gb * GIB,
                attached_to: details.attached_to,
                dataset_id,
                blockdevice_id: dataset_id.blockdevice_id(),
            });
        }

        // The controller provisions whole GiB; report the rounded size so a
        // repeated create returns the same descriptor.
        let size_gb = size.div_ceil(GIB);
        self.lifecycle.create_volume(&name, size_gb, tier).await?;
        Ok(BlockDeviceVolume {
            size: size_gb * GIB,
            attached_to: None,
            dataset_id,
            blockdevice_id: dataset_id.blockdevice_id(),
        })
    }
}

#[async_trait]
impl BlockDeviceApi for BlockDeviceAdapter {
    async fn create_volume(&self, dataset_id: DatasetId, size: u64) -> Result<BlockDeviceVolume> {
        self.create(dataset_id, size, None).await
    }

    async fn create_volume_with_profile(
        &self,
        dataset_id: DatasetId,
        size: u64,
        profile: &str,
    ) -> Result<BlockDeviceVolume> {
        let tier = ProfileTier::parse(profile);
        if tier.is_none() {
            debug!(profile, "unrecognized profile, using default pool");
        }
        self.create(dataset_id, size, tier).await
    }

    async fn destroy_volume(&self, blockdevice_id: &BlockDeviceId) -> Result<()> {
        let dataset_id = blockdevice_id.dataset_id()?;
        let name = dataset_id.volume_name();
        let details = self
            .lifecycle
            .volume_details(&name)
            .await?
            .ok_or_else(|| Error::UnknownVolume(blockdevice_id.to_string()))?;

        if details.attached_to.is_some() {
            match self.destroy_policy {
                DestroyPolicy::Reject => {
                    return Err(Error::AlreadyAttachedVolume(blockdevice_id.to_string()));
                }
                DestroyPolicy::ForceDetach => {
                    warn!(volume = %name, "destroying an attached volume, unexporting first");
                    self.lifecycle.unexport_volume(&name).await?;
                }
            }
        }

        info!(volume = %name, "destroying volume");
        self.lifecycle.delete_volume(&name).await
    }

    async fn attach_volume(
        &self,
        blockdevice_id: &BlockDeviceId,
        attach_to: &str,
    ) -> Result<BlockDeviceVolume> {
        let dataset_id = blockdevice_id.dataset_id()?;
        let name = dataset_id.volume_name();
        let details = self
            .lifecycle
            .volume_details(&name)
            .await?
            .ok_or_else(|| Error::UnknownVolume(blockdevice_id.to_string()))?;

        if details.attached_to.is_some() {
            return Err(Error::AlreadyAttachedVolume(blockdevice_id.to_string()));
        }

        self.lifecycle.export_volume(&name).await?;
        self.scsi.rescan().await?;

        Ok(BlockDeviceVolume {
            size: details.size_gb * GIB,
            attached_to: Some(attach_to.to_string()),
            dataset_id,
            blockdevice_id: blockdevice_id.clone(),
        })
    }

    async fn detach_volume(&self, blockdevice_id: &BlockDeviceId) -> Result<()> {
        let dataset_id = blockdevice_id.dataset_id()?;
        let name = dataset_id.volume_name();
        let details = self
            .lifecycle
            .volume_details(&name)
            .await?
            .ok_or_else(|| Error::UnknownVolume(blockdevice_id.to_string()))?;

        if details.attached_to.is_none() {
            return Err(Error::UnattachedVolume(blockdevice_id.to_string()));
        }

        self.lifecycle.unexport_volume(&name).await
    }

    async fn get_device_path(&self, blockdevice_id: &BlockDeviceId) -> Result<PathBuf> {
        let dataset_id = blockdevice_id.dataset_id()?;
        let name = dataset_id.volume_name();
        let wwn = self
            .lifecycle
            .volume_wwn(&name)
            .await?
            .ok_or_else(|| Error::UnknownVolume(blockdevice_id.to_string()))?;

        self.resolver.resolve(&wwn).await.map_err(|err| match err {
            Error::UnknownVolume(_) => Error::UnknownVolume(blockdevice_id.to_string()),
            other => other,
        })
    }

    async fn list_volumes(&self) -> Result<Vec<BlockDeviceVolume>> {
        let listing = self.lifecycle.list_volumes().await?;
        let mut volumes = Vec::with_capacity(listing.len());
        for (stripped, summary) in listing {
            let dataset_id = match DatasetId::parse(&stripped) {
                Ok(id) => id,
                Err(_) => {
                    warn!(name = %stripped, "skipping volume with malformed dataset id");
                    continue;
                }
            };
            volumes.push(BlockDeviceVolume {
                size: summary.size_gb * GIB,
                attached_to: summary.attached_to,
                dataset_id,
                blockdevice_id: dataset_id.blockdevice_id(),
            });
        }
        Ok(volumes)
    }

    /// Resizing is not supported by this driver; the call is accepted and
    /// ignored so callers can probe without failing.
    async fn resize_volume(&self, blockdevice_id: &BlockDeviceId, size: u64) -> Result<()> {
        warn!(volume = %blockdevice_id, size, "resize is not supported, ignoring");
        Ok(())
    }

    fn compute_instance_id(&self) -> &str {
        &self.instance_id
    }

    fn allocation_unit(&self) -> u64 {
        self.allocation_unit
    }
}

/// Local hostname, from `/etc/hostname` with a `hostname` fallback.
fn local_hostname() -> String {
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        let hostname = hostname.trim();
        if !hostname.is_empty() {
            return hostname.to_string();
        }
    }
    if let Ok(output) = std::process::Command::new("hostname").output() {
        if output.status.success() {
            return String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
    }
    "unknown".to_string()
}
