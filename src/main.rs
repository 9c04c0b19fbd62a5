// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point serving a host directory to a guest over 9P2000.L.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `vmshare` binary: export a host directory on a Unix socket.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, LevelFilter};
use vmshare::transport::serve_socket;
use vmshare::{ShareConfig, ShareDoor};

/// vmshare command-line arguments. Flags override values from `--config`.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "9P2000.L host share server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host directory exported as the guest's root.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Directory for shadow metadata files.
    #[arg(long)]
    metadata_dir: Option<PathBuf>,

    /// Unix socket to listen on.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// I/O unit advertised to the guest.
    #[arg(long)]
    iounit: Option<u32>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn resolve_config(cli: Cli) -> Result<ShareConfig> {
    let mut config = match &cli.config {
        Some(path) => Some(ShareConfig::load(path)?),
        None => None,
    };
    if let Some(root) = cli.root {
        let metadata_dir = match (&cli.metadata_dir, &config) {
            (Some(dir), _) => dir.clone(),
            (None, Some(existing)) => existing.metadata_dir.clone(),
            (None, None) => return Err(anyhow!("--metadata-dir is required with --root")),
        };
        let base = config.take();
        let mut fresh = ShareConfig::new(root, metadata_dir);
        if let Some(base) = base {
            fresh.socket = base.socket;
            fresh.iounit = base.iounit;
        }
        config = Some(fresh);
    }
    let mut config =
        config.ok_or_else(|| anyhow!("either --config or --root/--metadata-dir is required"))?;
    if let Some(dir) = cli.metadata_dir {
        config.metadata_dir = dir;
    }
    if let Some(socket) = cli.socket {
        config.socket = Some(socket);
    }
    if let Some(iounit) = cli.iounit {
        config.iounit = iounit;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = resolve_config(cli)?;
    let socket = config
        .socket
        .clone()
        .ok_or_else(|| anyhow!("no socket configured; pass --socket or set `socket`"))?;
    let door = ShareDoor::new(config.server_options())
        .with_context(|| format!("exporting {}", config.root.display()))?;
    info!("vmshare ready, iounit {}", config.iounit);
    serve_socket(&door, &socket)
}
