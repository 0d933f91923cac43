//! Local SCSI tooling
//!
//! Shells out to the host's `rescan-scsi-bus` and `lsscsi` binaries. Both
//! are blocking external processes with no timeout of their own, so every
//! invocation is bounded here.

use crate::domain::ports::ScsiBus;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const RESCAN_COMMAND: &str = "rescan-scsi-bus";
const LIST_COMMAND: &str = "lsscsi";

/// [`ScsiBus`] implementation over the host's SCSI command-line tools.
pub struct CommandScsiBus {
    timeout: Duration,
}

impl CommandScsiBus {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        debug!(command = program, ?args, "running SCSI tool");
        let output = tokio::time::timeout(self.timeout, Command::new(program).args(args).output())
            .await
            .map_err(|_| Error::ScsiTimeout {
                command: program.to_string(),
                timeout: self.timeout,
            })??;

        if !output.status.success() {
            return Err(Error::ScsiCommand {
                command: program.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ScsiBus for CommandScsiBus {
    async fn rescan(&self) -> Result<()> {
        self.run(RESCAN_COMMAND, &["-r", "-c"]).await?;
        Ok(())
    }

    async fn list_devices(&self) -> Result<String> {
        let output = self.run(LIST_COMMAND, &["--wwn"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
