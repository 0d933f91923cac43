//! Host SCSI bus module
//!
//! Reconciles the local SCSI device tree with controller-side volume
//! metadata: bus rescanning, device listing, and WWN-based path
//! resolution.

pub mod resolver;
pub mod scsi;

pub use resolver::*;
pub use scsi::*;
