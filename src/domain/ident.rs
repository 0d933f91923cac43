//! Typed identifiers
//!
//! The driver works in three coordinate systems: the caller's dataset id,
//! the controller-side volume name, and the caller-facing block device id.
//! Each gets an explicit type with an encode/decode pair so prefixes are
//! never manipulated by substring offset.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix scoping controller volumes to this driver.
const VOLUME_PREFIX: &str = "flocker-";

/// Prefix of the caller-facing block device id.
const BLOCKDEVICE_PREFIX: &str = "block-";

// =============================================================================
// Dataset Identifier
// =============================================================================

/// The caller's stable logical identifier for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    pub fn new_random() -> Self {
        DatasetId(Uuid::new_v4())
    }

    pub fn parse(text: &str) -> Result<Self> {
        Uuid::parse_str(text)
            .map(DatasetId)
            .map_err(|_| Error::UnknownVolume(text.to_string()))
    }

    /// Controller-side volume name for this dataset.
    pub fn volume_name(&self) -> VolumeName {
        VolumeName(format!("{VOLUME_PREFIX}{}", self.0))
    }

    /// Caller-facing block device id for this dataset.
    pub fn blockdevice_id(&self) -> BlockDeviceId {
        BlockDeviceId(format!("{BLOCKDEVICE_PREFIX}{}", self.0))
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Controller Volume Name
// =============================================================================

/// A controller-side volume name of the form `flocker-<dataset-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeName(String);

impl VolumeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw controller volume name belongs to this driver.
    pub fn is_driver_volume(raw: &str) -> bool {
        raw.starts_with(VOLUME_PREFIX)
    }

    /// Decode a raw controller volume name. Names without the driver prefix
    /// belong to other consumers of the project and yield `None`.
    pub fn from_raw(raw: &str) -> Option<Self> {
        raw.strip_prefix(VOLUME_PREFIX)
            .map(|_| VolumeName(raw.to_string()))
    }

    /// The logical name with the driver prefix removed.
    pub fn stripped(&self) -> &str {
        self.0
            .strip_prefix(VOLUME_PREFIX)
            .unwrap_or(self.0.as_str())
    }

    /// The dataset id encoded in this name, when well formed.
    pub fn dataset_id(&self) -> Option<DatasetId> {
        Uuid::parse_str(self.stripped()).ok().map(DatasetId)
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Block Device Identifier
// =============================================================================

/// The caller-facing volume handle of the form `block-<dataset-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockDeviceId(String);

impl BlockDeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the dataset id. Malformed handles are unknown volumes.
    pub fn dataset_id(&self) -> Result<DatasetId> {
        let tail = self
            .0
            .strip_prefix(BLOCKDEVICE_PREFIX)
            .ok_or_else(|| Error::UnknownVolume(self.0.clone()))?;
        Uuid::parse_str(tail)
            .map(DatasetId)
            .map_err(|_| Error::UnknownVolume(self.0.clone()))
    }
}

impl std::str::FromStr for BlockDeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = BlockDeviceId(s.to_string());
        id.dataset_id()?;
        Ok(id)
    }
}

impl fmt::Display for BlockDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_round_trip_through_volume_name() {
        let dataset = DatasetId::new_random();
        let name = dataset.volume_name();
        assert!(name.as_str().starts_with("flocker-"));
        assert_eq!(name.dataset_id(), Some(dataset));
        assert_eq!(name.stripped(), dataset.to_string());
    }

    #[test]
    fn test_round_trip_through_blockdevice_id() {
        let dataset = DatasetId::new_random();
        let id = dataset.blockdevice_id();
        assert!(id.as_str().starts_with("block-"));
        assert_eq!(id.dataset_id().unwrap(), dataset);
    }

    #[test]
    fn test_foreign_volume_names_are_skipped() {
        assert!(VolumeName::from_raw("flocker-abc").is_some());
        assert!(VolumeName::from_raw("ora-data-01").is_none());
        assert!(!VolumeName::is_driver_volume("ora-data-01"));
    }

    #[test]
    fn test_malformed_blockdevice_id_is_unknown() {
        let id: std::result::Result<BlockDeviceId, _> = "block-not-a-uuid".parse();
        assert_matches!(id, Err(Error::UnknownVolume(_)));

        let id: std::result::Result<BlockDeviceId, _> =
            "volume-6bb0b15e-8b67-43ee-9b7a-0f336b3d1b52".parse();
        assert_matches!(id, Err(Error::UnknownVolume(_)));
    }
}
