//! Volume lifecycle management
//!
//! Create/delete/export/unexport/query/list against the controller, scoped
//! to this driver's project and export group. Attachment state is never
//! cached: it is derived on every call from export-group membership.

use crate::config::DriverConfig;
use crate::controlplane::retry::RetryingCallExecutor;
use crate::domain::ident::VolumeName;
use crate::domain::ports::{ControllerApiRef, NameResolverRef, ProfileTier};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// =============================================================================
// Query Results
// =============================================================================

/// Attributes of one driver volume, joined with export-group membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDetails {
    pub name: VolumeName,
    pub size_gb: u64,
    /// Short hostname the volume is exported to, if any
    pub attached_to: Option<String>,
}

/// One entry of a project-wide listing, keyed by stripped volume name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSummary {
    pub size_gb: u64,
    pub attached_to: Option<String>,
}

// =============================================================================
// Lifecycle Manager
// =============================================================================

/// Implements the volume operations of the driver against the controller.
pub struct VolumeLifecycleManager {
    api: ControllerApiRef,
    retry: RetryingCallExecutor,
    resolver: NameResolverRef,
    config: DriverConfig,
    host: String,
}

impl VolumeLifecycleManager {
    pub fn new(
        api: ControllerApiRef,
        retry: RetryingCallExecutor,
        resolver: NameResolverRef,
        config: DriverConfig,
        host: String,
    ) -> Self {
        Self {
            api,
            retry,
            resolver,
            config,
            host,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Attributes and attachment state for one volume; `None` when the name
    /// resolves to nothing (distinct from an error).
    pub async fn volume_details(&self, name: &VolumeName) -> Result<Option<VolumeDetails>> {
        let project_path = self.config.project_path();
        let project = self.config.scoped_project();
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;

                let uri = match self.api.volume_query(&project_path, name.as_str()).await? {
                    Some(uri) => uri,
                    None => return Ok(None),
                };
                let info = self.api.volume_show(&uri).await?;
                let group = self
                    .api
                    .export_group_show(&self.config.export_group, &project, &self.config.tenant)
                    .await?;

                let attached_to = group
                    .volumes
                    .iter()
                    .any(|v| v.id == uri)
                    .then(|| self.host.clone());

                Ok(Some(VolumeDetails {
                    name: name.clone(),
                    size_gb: info.provisioned_gb,
                    attached_to,
                }))
            })
            .await
    }

    /// The volume's WWN, reported only while it is a member of this host's
    /// export group (an unexported volume has no local device to match).
    pub async fn volume_wwn(&self, name: &VolumeName) -> Result<Option<String>> {
        let project_path = self.config.project_path();
        let project = self.config.scoped_project();
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;

                let uri = match self.api.volume_query(&project_path, name.as_str()).await? {
                    Some(uri) => uri,
                    None => return Ok(None),
                };
                let info = self.api.volume_show(&uri).await?;
                let group = self
                    .api
                    .export_group_show(&self.config.export_group, &project, &self.config.tenant)
                    .await?;
                Ok(group
                    .volumes
                    .iter()
                    .any(|v| v.id == uri)
                    .then_some(info.wwn))
            })
            .await
    }

    /// The LUN assigned to the volume in this host's export group.
    pub async fn volume_lun(&self, name: &VolumeName) -> Result<Option<u32>> {
        let project_path = self.config.project_path();
        let project = self.config.scoped_project();
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;

                let uri = match self.api.volume_query(&project_path, name.as_str()).await? {
                    Some(uri) => uri,
                    None => return Ok(None),
                };
                let group = self
                    .api
                    .export_group_show(&self.config.export_group, &project, &self.config.tenant)
                    .await?;
                Ok(group
                    .volumes
                    .iter()
                    .find(|v| v.id == uri)
                    .map(|v| v.lun))
            })
            .await
    }

    /// Every driver volume in the project, keyed by stripped name, with the
    /// attachment target derived by joining all export groups in the
    /// project.
    pub async fn list_volumes(&self) -> Result<BTreeMap<String, VolumeSummary>> {
        let project = self.config.scoped_project();
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;

                let project_uri = self.api.project_query(&project, &self.config.tenant).await?;
                let volume_uris = self.api.search_volumes(&project_uri).await?;
                let groups = self
                    .api
                    .export_group_list(&project, &self.config.tenant)
                    .await?;

                let mut memberships: BTreeMap<String, String> = BTreeMap::new();
                for group in &groups {
                    let details = self
                        .api
                        .export_group_show(group, &project, &self.config.tenant)
                        .await?;
                    for exported in details.volumes {
                        memberships.insert(exported.id, details.name.clone());
                    }
                }

                let mut listing = BTreeMap::new();
                for uri in volume_uris {
                    let info = self.api.volume_show(&uri).await?;
                    let name = match VolumeName::from_raw(&info.name) {
                        Some(name) => name,
                        None => continue,
                    };
                    let attached_to = match memberships.get(&uri) {
                        Some(group) => Some(self.attach_target(group).await),
                        None => None,
                    };
                    listing.insert(
                        name.stripped().to_string(),
                        VolumeSummary {
                            size_gb: info.provisioned_gb,
                            attached_to,
                        },
                    );
                }
                Ok(listing)
            })
            .await
    }

    /// Create a volume, selecting the storage pool from the profile tier.
    pub async fn create_volume(
        &self,
        name: &VolumeName,
        size_gb: u64,
        tier: Option<ProfileTier>,
    ) -> Result<()> {
        let vpool = self.vpool_for(tier);
        let project_path = self.config.project_path();
        debug!(volume = %name, size_gb, vpool = %vpool, "creating volume");
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;
                match self
                    .api
                    .volume_create(
                        &project_path,
                        name.as_str(),
                        size_gb,
                        &self.config.varray,
                        vpool,
                    )
                    .await
                {
                    Err(err) if err.is_already_exists() => {
                        debug!(volume = %name, "volume already exists, create is a no-op");
                        Ok(())
                    }
                    other => other,
                }
            })
            .await
    }

    /// Delete a volume. Destroy is best-effort: "not found" means already
    /// deleted, a controller failure is raised, and anything else is logged
    /// and swallowed so the deletion path cannot crash the caller.
    pub async fn delete_volume(&self, name: &VolumeName) -> Result<()> {
        let project_path = self.config.project_path();
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;
                match self.api.volume_delete(&project_path, name.as_str()).await {
                    Ok(()) => Ok(()),
                    Err(err) if err.is_session_expired() => Err(err),
                    Err(err) if err.is_not_found() => {
                        debug!(volume = %name, "volume already deleted");
                        Ok(())
                    }
                    Err(err) if err.is_controller_failure() => Err(err),
                    Err(err) => {
                        warn!(volume = %name, error = %err, "volume delete failed, ignoring");
                        Ok(())
                    }
                }
            })
            .await
    }

    /// Add the volume to this host's export group.
    pub async fn export_volume(&self, name: &VolumeName) -> Result<()> {
        let project_path = self.config.project_path();
        let project = self.config.scoped_project();
        debug!(volume = %name, group = %self.config.export_group, "exporting volume");
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;
                let uri = self
                    .api
                    .volume_query(&project_path, name.as_str())
                    .await?
                    .ok_or_else(|| Error::UnknownVolume(name.to_string()))?;
                self.api
                    .export_group_add_volumes(
                        &self.config.export_group,
                        &self.config.tenant,
                        &project,
                        &[uri],
                    )
                    .await
            })
            .await
    }

    /// Remove the volume from this host's export group.
    pub async fn unexport_volume(&self, name: &VolumeName) -> Result<()> {
        let project_path = self.config.project_path();
        let project = self.config.scoped_project();
        debug!(volume = %name, group = %self.config.export_group, "unexporting volume");
        self.retry
            .execute(|| async {
                self.retry.session().ensure_authenticated().await?;
                let uri = self
                    .api
                    .volume_query(&project_path, name.as_str())
                    .await?
                    .ok_or_else(|| Error::UnknownVolume(name.to_string()))?;
                self.api
                    .export_group_remove_volumes(
                        &self.config.export_group,
                        &self.config.tenant,
                        &project,
                        &[uri],
                    )
                    .await
            })
            .await
    }

    fn vpool_for(&self, tier: Option<ProfileTier>) -> &str {
        match tier {
            Some(ProfileTier::Platinum) => &self.config.vpool.platinum,
            Some(ProfileTier::Gold) => &self.config.vpool.gold,
            Some(ProfileTier::Silver) => &self.config.vpool.silver,
            Some(ProfileTier::Bronze) => &self.config.vpool.bronze,
            None => &self.config.vpool.default,
        }
    }

    /// Attachment target for a membership in `group`. Our own export group
    /// is this host by construction; foreign groups go through the injected
    /// resolver, and a resolution miss falls back to the raw group name
    /// rather than failing the listing.
    async fn attach_target(&self, group: &str) -> String {
        if group == self.config.export_group {
            return self.host.clone();
        }
        match self.resolver.canonical_host(group).await {
            Some(host) => host,
            None => {
                warn!(group, "could not resolve export group to a host");
                group.to_string()
            }
        }
    }
}
