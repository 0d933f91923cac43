//! Control plane module
//!
//! Everything that talks to the remote controller: session management,
//! retried call execution, the REST client, one-time environment
//! bootstrap, and the volume lifecycle operations.

pub mod bootstrap;
pub mod lifecycle;
pub mod rest;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use bootstrap::*;
pub use lifecycle::*;
pub use rest::*;
pub use retry::*;
pub use session::*;
