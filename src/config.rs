/*!
Gateway configuration.

The execution engine only needs a scripts directory, a shared temp directory and a
timeout; the listener adds host/port and the optional static root. Paths are made
absolute once, at construction time, so resolved commands and advertised temp files
never depend on the process working directory.
*/

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_CONFIG_PATH: &str = "/config";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub scripts_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub timeout: Duration,
    pub static_dir: Option<PathBuf>,
}

impl GatewayConfig {
    /// Defaults for everything except the scripts directory.
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scripts_dir: absolutize(scripts_dir.into()),
            temp_dir: std::env::temp_dir(),
            timeout: DEFAULT_TIMEOUT,
            static_dir: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = absolutize(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(absolutize(dir.into()));
        self
    }

    /// Scripts directory derived from a config root (`<root>/scripts`).
    pub fn scripts_dir_for(config_path: &Path) -> PathBuf {
        config_path.join("scripts")
    }

    /// Check invariants and prepare the temp directory.
    pub fn validate(&self) -> io::Result<()> {
        if self.timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "execution timeout must be greater than zero",
            ));
        }
        std::fs::create_dir_all(&self.temp_dir).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("cannot create temp dir {}: {e}", self.temp_dir.display()),
            )
        })?;
        if let Some(dir) = &self.static_dir {
            if !dir.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("static dir {} is not a directory", dir.display()),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
