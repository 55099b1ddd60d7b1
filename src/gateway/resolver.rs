/*!
Command resolution: executable search path first, then the configured scripts directory.

No partial matching, no extension inference and no execute-permission check; a script
that exists but is not runnable surfaces later as a spawn error.
*/

use std::path::{Path, PathBuf};

use crate::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct CommandResolver {
    scripts_dir: PathBuf,
}

impl CommandResolver {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Resolve `command` to an executable path or fail with `CommandNotFound`.
    pub fn resolve(&self, command: &str) -> Result<PathBuf, GatewayError> {
        if let Ok(path) = which::which(command) {
            tracing::debug!(command, path = %path.display(), "resolved on PATH");
            return Ok(path);
        }
        let candidate = self.scripts_dir.join(command);
        if candidate.is_file() {
            tracing::debug!(command, path = %candidate.display(), "resolved in scripts dir");
            return Ok(candidate);
        }
        Err(GatewayError::CommandNotFound(command.to_string()))
    }
}
