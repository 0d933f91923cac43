//! Error types for the block-device driver
//!
//! Provides structured error types for all driver components including
//! session handling, environment bootstrap, volume lifecycle, and local
//! SCSI device resolution.

use std::backtrace::Backtrace;
use std::time::Duration;
use thiserror::Error;

/// Fault classes carried by controller management API errors.
///
/// These mirror the error codes the controller reports so that the retry
/// layer and the bootstrap layer can classify failures without string
/// matching at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerFault {
    /// HTTP-level failure with the response status code.
    Http(u16),
    /// The object being created already exists.
    AlreadyExists,
    /// The referenced object does not exist.
    NotFound,
    /// A generic controller-side operation failure.
    Failure,
}

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    // =========================================================================
    // Controller Errors
    // =========================================================================
    #[error("Controller error ({fault:?}): {message}")]
    Controller {
        fault: ControllerFault,
        message: String,
    },

    /// A controller or unexpected error wrapped by the retry executor after
    /// classification ruled out a session-expiry retry.
    #[error("Remote operation failed: {message}")]
    RemoteOperation { message: String, trace: String },

    // =========================================================================
    // Volume State Errors
    // =========================================================================
    #[error("Unknown volume: {0}")]
    UnknownVolume(String),

    #[error("Volume already attached: {0}")]
    AlreadyAttachedVolume(String),

    #[error("Volume not attached: {0}")]
    UnattachedVolume(String),

    // =========================================================================
    // Host SCSI Errors
    // =========================================================================
    #[error("SCSI command {command} timed out after {timeout:?}")]
    ScsiTimeout { command: String, timeout: Duration },

    #[error("SCSI command {command} failed: {reason}")]
    ScsiCommand { command: String, reason: String },

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a controller fault error.
    pub fn controller(fault: ControllerFault, message: impl Into<String>) -> Self {
        Error::Controller {
            fault,
            message: message.into(),
        }
    }

    /// Wrap an error the retry executor will not retry, capturing a trace
    /// of where the wrap happened.
    pub fn remote(message: impl Into<String>) -> Self {
        Error::RemoteOperation {
            message: message.into(),
            trace: Backtrace::force_capture().to_string(),
        }
    }

    /// A session-expiry error is an HTTP 401 or any controller HTTP error
    /// whose text mentions the session cookie. These invalidate the session
    /// and are retried exactly once.
    pub fn is_session_expired(&self) -> bool {
        match self {
            Error::Controller {
                fault: ControllerFault::Http(status),
                message,
            } => *status == 401 || message.to_lowercase().contains("cookie"),
            _ => false,
        }
    }

    /// "Already exists" conditions are swallowed during environment setup.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Controller {
                fault: ControllerFault::AlreadyExists,
                ..
            }
        )
    }

    /// "Not found" from a delete means the volume is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Controller {
                fault: ControllerFault::NotFound,
                ..
            }
        )
    }

    /// Generic controller-side operation failure (as opposed to transport
    /// or object-state conditions).
    pub fn is_controller_failure(&self) -> bool {
        matches!(
            self,
            Error::Controller {
                fault: ControllerFault::Failure,
                ..
            }
        )
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;
