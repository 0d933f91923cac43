//! CoprHD Flocker Driver - Block Storage Provisioning
//!
//! A block-device driver binding a cluster volume manager to a remote
//! CoprHD storage controller: volume lifecycle orchestration, host and
//! export-group reconciliation, session and retry handling, and local
//! SCSI device resolution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Block Device Adapter                         │
//! │        (create / destroy / attach / detach / device path)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐  ┌────────────────┐  ┌───────────────┐  │
//! │  │ Volume Lifecycle   │  │  Environment   │  │   Device      │  │
//! │  │ Manager            │  │  Bootstrapper  │  │   Resolver    │  │
//! │  └─────────┬──────────┘  └───────┬────────┘  └───────┬───────┘  │
//! │            │                     │                   │          │
//! │  ┌─────────┴─────────────────────┴────────┐  ┌───────┴───────┐  │
//! │  │  Retrying Call Executor + Session      │  │  SCSI Bus     │  │
//! │  └─────────────────┬──────────────────────┘  │  (rescan /    │  │
//! │                    │                         │   lsscsi)     │  │
//! │  ┌─────────────────┴──────────────────────┐  └───────────────┘  │
//! │  │  REST Controller Client (CoprHD API)   │                     │
//! │  └────────────────────────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapter`]: Caller-facing block device operations and state machine
//! - [`controlplane`]: Controller session, retry, REST client, bootstrap, lifecycle
//! - [`hostbus`]: Local SCSI rescan, listing, and WWN-based path resolution
//! - [`domain`]: Typed identifiers and boundary traits
//! - [`config`]: Driver configuration
//! - [`error`]: Error types and fault classification

pub mod adapter;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod hostbus;

// Re-export commonly used types
pub use adapter::{BlockDeviceAdapter, GIB};

pub use config::{ControllerConfig, DestroyPolicy, DriverConfig, VpoolConfig};

pub use controlplane::{
    EnvironmentBootstrapper, RestController, RetryingCallExecutor, SessionManager,
    VolumeDetails, VolumeLifecycleManager, VolumeSummary,
};

pub use domain::ident::{BlockDeviceId, DatasetId, VolumeName};

pub use domain::ports::{
    BlockDeviceApi, BlockDeviceApiRef, BlockDeviceVolume, ControllerApi, ControllerApiRef,
    NameResolver, NameResolverRef, ProfileTier, ScsiBus, ScsiBusRef, ShortNameResolver,
};

pub use error::{ControllerFault, Error, Result};

pub use hostbus::{CommandScsiBus, DeviceResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
