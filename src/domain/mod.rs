//! Domain layer - typed identifiers and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod ident;
pub mod ports;

pub use ident::*;
pub use ports::*;
