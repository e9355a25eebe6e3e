#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `lever`: run trials on the lever rig, check devices, inspect wire frames.

mod cli;
mod error_fmt;
mod probe;
mod rt;
mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{CONFIG_CONTEXT, exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(&cli) {
        if cli.json {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    // Frames need no config on disk; everything else validates it first.
    let cfg = match (&cli.cmd, cli.config.exists()) {
        (Commands::Frame { .. }, false) => lever_config::Config::default(),
        _ => lever_config::load_file(&cli.config).wrap_err(CONFIG_CONTEXT)?,
    };

    init_tracing(cli, &cfg.logging)?;
    if !cli.json {
        // Pretty panic/error reports for humans; JSON mode keeps stdout parseable.
        let _ = color_eyre::install();
    }
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match &cli.cmd {
        Commands::Run(args) => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let report = session::run(&cfg, args, shutdown)?;
            if cli.json {
                println!("{}", session::summary_json(&report));
            } else {
                eprintln!("{}", session::summary_line(&report));
            }
        }
        Commands::SelfCheck => {
            let report = probe::self_check(&cfg)?;
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true, "checks": report }));
            } else {
                for line in &report {
                    println!("{line}");
                }
                println!("self-check ok");
            }
        }
        Commands::Frame { kind } => {
            for frame in probe::frame_hex(&cfg, kind)? {
                println!("{frame}");
            }
        }
    }
    Ok(())
}

fn rotation(policy: Option<&str>) -> tracing_appender::rolling::Rotation {
    use tracing_appender::rolling::Rotation;
    match policy {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Console layer (pretty or JSON) on stderr plus an optional JSON file layer.
/// `RUST_LOG` wins over `--log-level`, which wins over `logging.level`.
fn init_tracing(cli: &Cli, logging: &lever_config::Logging) -> eyre::Result<()> {
    let level = if cli.log_level == "info" {
        logging.level.as_deref().unwrap_or("info")
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::RollingFileAppender::new(
                rotation(logging.rotation.as_deref()),
                dir,
                name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("initialize logging")?;
    Ok(())
}
