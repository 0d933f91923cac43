//! Session management
//!
//! The controller session is process-wide state: one authenticated flag
//! shared by every component that issues remote calls. The flag lives
//! behind a single async mutex so concurrent callers serialize on
//! re-authentication and the retry layer's invalidate-then-retry pattern
//! cannot race a login in flight.

use crate::config::ControllerConfig;
use crate::domain::ports::ControllerApiRef;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Owns the authenticated flag and refreshes the session at most once per
/// invalidation.
#[derive(Clone)]
pub struct SessionManager {
    api: ControllerApiRef,
    config: ControllerConfig,
    authenticated: Arc<Mutex<bool>>,
}

impl SessionManager {
    pub fn new(api: ControllerApiRef, config: ControllerConfig) -> Self {
        Self {
            api,
            config,
            authenticated: Arc::new(Mutex::new(false)),
        }
    }

    /// Guarantee a valid session on return. A no-op when the flag is
    /// already set; otherwise resolves credentials and logs in.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        let mut authenticated = self.authenticated.lock().await;
        if *authenticated {
            return Ok(());
        }

        let (username, password) = self.resolve_credentials()?;
        debug!(user = %username, "authenticating against controller");
        self.api.login(&username, &password).await?;
        *authenticated = true;
        info!("controller session established");
        Ok(())
    }

    /// Clear the session. The next call through [`ensure_authenticated`]
    /// re-authenticates.
    ///
    /// [`ensure_authenticated`]: SessionManager::ensure_authenticated
    pub async fn invalidate(&self) {
        let mut authenticated = self.authenticated.lock().await;
        *authenticated = false;
        debug!("controller session invalidated");
    }

    pub async fn is_authenticated(&self) -> bool {
        *self.authenticated.lock().await
    }

    /// Direct credentials from config, or the two-line security file when
    /// one is configured (first line username, second line password). The
    /// file stands in for the controller CLI's per-user credential store
    /// and must be readable only by the service user.
    fn resolve_credentials(&self) -> Result<(String, String)> {
        match &self.config.security_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let mut lines = text.lines();
                let username = lines
                    .next()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .ok_or_else(|| {
                        Error::Authentication(format!(
                            "security file {} is missing the username line",
                            path.display()
                        ))
                    })?;
                let password = lines
                    .next()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .ok_or_else(|| {
                        Error::Authentication(format!(
                            "security file {} is missing the password line",
                            path.display()
                        ))
                    })?;
                Ok((username.to_string(), password.to_string()))
            }
            None => Ok((self.config.username.clone(), self.config.password.clone())),
        }
    }
}
