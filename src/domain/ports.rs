//! Domain ports - trait definitions for the driver's boundaries
//!
//! These traits separate the orchestration core from the controller
//! management API, the host's SCSI tooling, and name resolution. Adapters
//! implement them; the core only sees the contracts.

use crate::domain::ident::{BlockDeviceId, DatasetId};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Controller Data Types
// =============================================================================

/// A storage system known to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSystem {
    pub name: String,
    pub serial_number: String,
    pub system_type: String,
}

/// A volume member of an export group with its assigned LUN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedVolume {
    /// Controller-assigned volume handle
    pub id: String,
    pub lun: u32,
}

/// An export group's membership view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportGroupDetails {
    pub name: String,
    pub volumes: Vec<ExportedVolume>,
}

/// Controller-side volume attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    /// World-Wide Name correlating the volume with a local SCSI device
    pub wwn: String,
    pub provisioned_gb: u64,
    pub allocated_gb: u64,
}

// =============================================================================
// Profile Tiers
// =============================================================================

/// Named storage-pool class selected at volume creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
}

impl ProfileTier {
    /// Case-insensitive parse. Unrecognized names select no tier, which
    /// means the default pool.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "platinum" => Some(ProfileTier::Platinum),
            "gold" => Some(ProfileTier::Gold),
            "silver" => Some(ProfileTier::Silver),
            "bronze" => Some(ProfileTier::Bronze),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileTier::Platinum => write!(f, "platinum"),
            ProfileTier::Gold => write!(f, "gold"),
            ProfileTier::Silver => write!(f, "silver"),
            ProfileTier::Bronze => write!(f, "bronze"),
        }
    }
}

// =============================================================================
// Caller-Facing Volume Descriptor
// =============================================================================

/// The logical volume descriptor exposed to the caller. Derived on every
/// query by joining controller volume attributes with export-group
/// membership; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceVolume {
    /// Size in bytes
    pub size: u64,
    /// Host identifier the volume is attached to, if any
    pub attached_to: Option<String>,
    pub dataset_id: DatasetId,
    pub blockdevice_id: BlockDeviceId,
}

// =============================================================================
// Controller API Port
// =============================================================================

/// Operations the driver consumes from the controller management API.
///
/// Every call may fail with a classified [`Error::Controller`] carrying a
/// [`crate::error::ControllerFault`] and message; the retry layer relies on
/// that classification.
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Authenticate and establish a session on the underlying transport.
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    // -- projects -------------------------------------------------------------

    async fn project_create(&self, name: &str, tenant: &str) -> Result<()>;

    /// Resolve a project name to its controller handle.
    async fn project_query(&self, name: &str, tenant: &str) -> Result<String>;

    // -- hosts and initiators -------------------------------------------------

    /// Look up a host record by name; `None` when unregistered.
    async fn host_search(&self, name: &str) -> Result<Option<String>>;

    async fn host_create(&self, name: &str, tenant: &str) -> Result<()>;

    async fn initiator_create(&self, host: &str, protocol: &str, port_wwn: &str) -> Result<()>;

    // -- networks -------------------------------------------------------------

    /// Look up a network by name; `None` when absent.
    async fn network_query(&self, name: &str) -> Result<Option<String>>;

    async fn network_create(&self, name: &str, net_type: &str) -> Result<()>;

    async fn network_add_endpoint(&self, name: &str, endpoint: &str) -> Result<()>;

    // -- storage topology -----------------------------------------------------

    /// Storage systems backing the given virtual array.
    async fn list_storage_systems(&self, varray: &str) -> Result<Vec<StorageSystem>>;

    /// Port identifiers of one storage system.
    async fn list_storage_ports(&self, system: &StorageSystem) -> Result<Vec<String>>;

    // -- export groups --------------------------------------------------------

    async fn export_group_create(
        &self,
        name: &str,
        project: &str,
        tenant: &str,
        varray: &str,
        group_type: &str,
    ) -> Result<()>;

    async fn export_group_add_host(
        &self,
        group: &str,
        tenant: &str,
        project: &str,
        host: &str,
    ) -> Result<()>;

    async fn export_group_add_initiator(
        &self,
        group: &str,
        tenant: &str,
        project: &str,
        initiator: &str,
        host: &str,
    ) -> Result<()>;

    async fn export_group_show(
        &self,
        group: &str,
        project: &str,
        tenant: &str,
    ) -> Result<ExportGroupDetails>;

    /// Names of every export group in the project.
    async fn export_group_list(&self, project: &str, tenant: &str) -> Result<Vec<String>>;

    async fn export_group_add_volumes(
        &self,
        group: &str,
        tenant: &str,
        project: &str,
        volumes: &[String],
    ) -> Result<()>;

    async fn export_group_remove_volumes(
        &self,
        group: &str,
        tenant: &str,
        project: &str,
        volumes: &[String],
    ) -> Result<()>;

    // -- volumes --------------------------------------------------------------

    /// Resolve a volume name within `tenant/project` to its handle;
    /// `None` when no such volume exists.
    async fn volume_query(&self, project_path: &str, name: &str) -> Result<Option<String>>;

    async fn volume_show(&self, uri: &str) -> Result<VolumeInfo>;

    /// Synchronous single-volume create.
    async fn volume_create(
        &self,
        project_path: &str,
        name: &str,
        size_gb: u64,
        varray: &str,
        vpool: &str,
    ) -> Result<()>;

    async fn volume_delete(&self, project_path: &str, name: &str) -> Result<()>;

    /// Handles of every volume in the project.
    async fn search_volumes(&self, project_uri: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Host SCSI Port
// =============================================================================

/// The host's SCSI tooling: a bus rescan and a device listing with WWN
/// annotations, one device per line.
#[async_trait]
pub trait ScsiBus: Send + Sync {
    async fn rescan(&self) -> Result<()>;

    /// Raw device listing, lines of the form `[H:C:T:L] type wwn /dev/name`.
    async fn list_devices(&self) -> Result<String>;
}

// =============================================================================
// Name Resolution Port
// =============================================================================

/// Maps an export-group name to the short hostname it serves. Used only for
/// volumes exported to groups other than this host's own; failures must not
/// abort a listing.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn canonical_host(&self, name: &str) -> Option<String>;
}

/// Default resolver: take the group name's leading label, the convention
/// export groups here are named by host.
pub struct ShortNameResolver;

#[async_trait]
impl NameResolver for ShortNameResolver {
    async fn canonical_host(&self, name: &str) -> Option<String> {
        let short = name.split('.').next()?;
        if short.is_empty() {
            None
        } else {
            Some(short.to_string())
        }
    }
}

// =============================================================================
// Caller-Facing Block Device Port
// =============================================================================

/// The outward-facing block-device contract.
#[async_trait]
pub trait BlockDeviceApi: Send + Sync {
    /// Idempotent create; an existing volume is returned unchanged.
    async fn create_volume(&self, dataset_id: DatasetId, size: u64) -> Result<BlockDeviceVolume>;

    /// Create with a storage-pool profile tier.
    async fn create_volume_with_profile(
        &self,
        dataset_id: DatasetId,
        size: u64,
        profile: &str,
    ) -> Result<BlockDeviceVolume>;

    async fn destroy_volume(&self, blockdevice_id: &BlockDeviceId) -> Result<()>;

    async fn attach_volume(
        &self,
        blockdevice_id: &BlockDeviceId,
        attach_to: &str,
    ) -> Result<BlockDeviceVolume>;

    async fn detach_volume(&self, blockdevice_id: &BlockDeviceId) -> Result<()>;

    async fn get_device_path(&self, blockdevice_id: &BlockDeviceId)
        -> Result<std::path::PathBuf>;

    async fn list_volumes(&self) -> Result<Vec<BlockDeviceVolume>>;

    /// Documented limitation: resizing is not supported and is a no-op.
    async fn resize_volume(&self, blockdevice_id: &BlockDeviceId, size: u64) -> Result<()>;

    /// Identifier of the host this driver manages.
    fn compute_instance_id(&self) -> &str;

    fn allocation_unit(&self) -> u64;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ControllerApiRef = Arc<dyn ControllerApi>;
pub type ScsiBusRef = Arc<dyn ScsiBus>;
pub type NameResolverRef = Arc<dyn NameResolver>;
pub type BlockDeviceApiRef = Arc<dyn BlockDeviceApi>;
