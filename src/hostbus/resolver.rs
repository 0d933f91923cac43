//! Device path resolution
//!
//! Correlates a controller-reported WWN with the local SCSI device tree.
//! The controller reports WWNs with a trailing 3-character suffix that the
//! device listing does not carry, so the suffix is trimmed before matching.

use crate::domain::ports::ScsiBusRef;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::debug;

/// Characters the controller appends to a WWN beyond what the host's
/// device listing shows.
const WWN_SUFFIX_LEN: usize = 3;

/// Resolves a remote volume's WWN to a local block-device path.
pub struct DeviceResolver {
    scsi: ScsiBusRef,
}

impl DeviceResolver {
    pub fn new(scsi: ScsiBusRef) -> Self {
        Self { scsi }
    }

    /// Rescan the bus and scan the device listing for the trimmed WWN.
    /// A full scan without a match means the volume has no local device.
    pub async fn resolve(&self, wwn: &str) -> Result<PathBuf> {
        let trimmed = trim_wwn(wwn);
        self.scsi.rescan().await?;
        let listing = self.scsi.list_devices().await?;
        match scan_listing(&listing, trimmed) {
            Some(path) => {
                debug!(wwn = trimmed, path = %path.display(), "resolved device path");
                Ok(path)
            }
            None => Err(Error::UnknownVolume(wwn.to_string())),
        }
    }
}

fn trim_wwn(wwn: &str) -> &str {
    if wwn.len() > WWN_SUFFIX_LEN {
        &wwn[..wwn.len() - WWN_SUFFIX_LEN]
    } else {
        wwn
    }
}

/// Scan `lsscsi --wwn` output for a line carrying a hexadecimal WWN that
/// matches, case-insensitively, and take its `/dev` token.
fn scan_listing(listing: &str, wwn: &str) -> Option<PathBuf> {
    let needle = wwn.to_lowercase();
    for line in listing.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("0x") || !lower.contains(&needle) {
            continue;
        }
        if let Some(device) = line.split_whitespace().find(|t| t.starts_with("/dev/")) {
            return Some(PathBuf::from(device));
        }
    }
    None
}
