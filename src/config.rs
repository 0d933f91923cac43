//! Driver configuration
//!
//! All knobs the driver needs to talk to one controller on behalf of one
//! host. Loadable from a YAML file; every section carries defaults so a
//! minimal config only names the controller endpoint and scoping objects.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Controller Endpoint
// =============================================================================

/// Connection and credential settings for the controller management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller hostname or IP
    pub host: String,
    /// Management API port
    pub port: u16,
    /// Username for direct authentication
    pub username: String,
    /// Password for direct authentication
    pub password: String,
    /// Optional credential file (two lines: username, password) used instead
    /// of the inline credentials when set. Must be readable only by the
    /// service user.
    pub security_file: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4443,
            username: "root".to_string(),
            password: String::new(),
            security_file: None,
        }
    }
}

// =============================================================================
// Storage Pool Tiers
// =============================================================================

/// Virtual pool names per profile tier, plus the default pool used when a
/// create carries no profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VpoolConfig {
    pub default: String,
    pub platinum: String,
    pub gold: String,
    pub silver: String,
    pub bronze: String,
}

impl Default for VpoolConfig {
    fn default() -> Self {
        Self {
            default: "vpool".to_string(),
            platinum: "vpool-platinum".to_string(),
            gold: "vpool-gold".to_string(),
            silver: "vpool-silver".to_string(),
            bronze: "vpool-bronze".to_string(),
        }
    }
}

// =============================================================================
// Destroy Policy
// =============================================================================

/// What to do when destroy targets a volume that is still attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestroyPolicy {
    /// Fail the destroy with an already-attached error.
    Reject,
    /// Unexport the volume first, then destroy it.
    ForceDetach,
}

impl Default for DestroyPolicy {
    fn default() -> Self {
        DestroyPolicy::Reject
    }
}

// =============================================================================
// Driver Configuration
// =============================================================================

/// Top-level driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub controller: ControllerConfig,
    /// Tenant the project and export group live under
    pub tenant: String,
    /// Base project name; the effective project is scoped per cluster
    pub project: String,
    /// Cluster identifier appended to the project name so multiple clusters
    /// sharing one controller do not collide
    pub cluster_id: String,
    /// Virtual array volumes are carved from
    pub varray: String,
    pub vpool: VpoolConfig,
    /// Fixed export group name for this host
    pub export_group: String,
    /// Fixed IP network name registered during bootstrap
    pub network_name: String,
    /// iSCSI initiator configuration file
    pub iscsi_config_path: PathBuf,
    /// Timeout applied to local SCSI tooling invocations
    pub scsi_timeout_secs: u64,
    pub destroy_policy: DestroyPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            tenant: "standalone".to_string(),
            project: "flockerproject".to_string(),
            cluster_id: "default".to_string(),
            varray: "varray".to_string(),
            vpool: VpoolConfig::default(),
            export_group: "flockerexportgroup".to_string(),
            network_name: "flockeripnetwork".to_string(),
            iscsi_config_path: PathBuf::from("/etc/iscsi/initiatorname.iscsi"),
            scsi_timeout_secs: 120,
            destroy_policy: DestroyPolicy::default(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// The cluster-scoped project name used for every controller call.
    pub fn scoped_project(&self) -> String {
        format!("{}-{}", self.project, self.cluster_id)
    }

    /// Tenant-qualified path for the scoped project.
    pub fn project_path(&self) -> String {
        format!("{}/{}", self.tenant, self.scoped_project())
    }

    pub fn scsi_timeout(&self) -> Duration {
        Duration::from_secs(self.scsi_timeout_secs)
    }
}
