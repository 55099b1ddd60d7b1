use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use ecui_runner::config::{DEFAULT_CONFIG_PATH, DEFAULT_HOST, DEFAULT_PORT};
use ecui_runner::GatewayConfig;

/// Accept humantime durations (`30s`, `2m`) or bare seconds (`300`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

#[derive(Parser, Debug)]
#[command(
    name = "ecui-runner",
    version,
    about = "Run host commands or configured scripts over HTTP and stream their output"
)]
pub(crate) struct Cli {
    /// Address to bind
    #[arg(long, env = "ECUI_HOST", default_value = DEFAULT_HOST)]
    pub(crate) host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(long, env = "ECUI_PORT", default_value_t = DEFAULT_PORT)]
    pub(crate) port: u16,

    /// Config root; scripts are looked up in <config-path>/scripts
    #[arg(long = "config-path", env = "ECUI_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub(crate) config_path: PathBuf,

    /// Scripts directory (overrides <config-path>/scripts)
    #[arg(long = "scripts-dir", env = "ECUI_SCRIPTS_DIR")]
    pub(crate) scripts_dir: Option<PathBuf>,

    /// Shared directory for temp files handed to commands (default: OS temp dir)
    #[arg(long = "temp-dir", env = "ECUI_TEMP_DIR")]
    pub(crate) temp_dir: Option<PathBuf>,

    /// Execution timeout, e.g. 30s, 5m or plain seconds
    #[arg(long, env = "ECUI_EXEC_TIMEOUT", default_value = "5m", value_parser = parse_timeout)]
    pub(crate) timeout: Duration,

    /// Serve files from this directory for other GET requests
    #[arg(long = "static-dir", env = "ECUI_STATIC_DIR")]
    pub(crate) static_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v')]
    pub(crate) verbose: bool,
}

impl Cli {
    pub(crate) fn into_config(self) -> GatewayConfig {
        let scripts_dir = self
            .scripts_dir
            .unwrap_or_else(|| GatewayConfig::scripts_dir_for(&self.config_path));
        let mut cfg = GatewayConfig::new(scripts_dir)
            .host(self.host)
            .port(self.port)
            .timeout(self.timeout);
        if let Some(dir) = self.temp_dir {
            cfg = cfg.temp_dir(dir);
        }
        if let Some(dir) = self.static_dir {
            cfg = cfg.static_dir(dir);
        }
        cfg
    }
}
