use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use ecui_runner::{exit_code_for_io_error, start_gateway, telemetry_init};

mod cli;

fn run() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = cli::Cli::parse();
    telemetry_init(cli.verbose);
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("ignoring .env: {e}"),
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        built = env!("ECUI_BUILD_DATE"),
        build_target = env!("ECUI_BUILD_TARGET"),
        profile = env!("ECUI_BUILD_PROFILE"),
        rustc = env!("ECUI_BUILD_RUSTC"),
        "ecui-runner starting"
    );

    let config = cli.into_config();
    let bind = config.bind_addr();
    let handle = start_gateway(config).with_context(|| format!("cannot start gateway on {bind}"))?;
    tracing::info!("serving at {}", handle.url());
    handle.join();
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ecui-runner: {e:#}");
            let code = e
                .downcast_ref::<std::io::Error>()
                .map(exit_code_for_io_error)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
