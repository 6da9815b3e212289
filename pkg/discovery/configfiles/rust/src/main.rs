// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dd_config_discovery::config::load_config;
use dd_config_discovery::{ContainerHandle, FinderRegistry, ProcfsContainer, StaticContainer};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "config-discovery")]
#[command(
    about = "Finds service configuration files in a filesystem snapshot and bundles them",
    long_about = None
)]
struct Args {
    /// Root of the snapshot to scan. Defaults to the container root of
    /// --pid, or / otherwise.
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inspect the running container holding this host process
    #[arg(short, long, conflicts_with = "image_config")]
    pid: Option<i32>,

    /// Image configuration (docker inspect JSON) whose entrypoint and command
    /// are inspected for custom configuration paths
    #[arg(long)]
    image_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config)?;
    let log_level = config.log_level();
    simple_logger::init_with_level(log_level)?;
    info!("Log level set to: {:?}", log_level);

    let container: Option<Arc<dyn ContainerHandle>> = match (args.pid, &args.image_config) {
        (Some(pid), _) => Some(Arc::new(ProcfsContainer::new(pid))),
        (None, Some(path)) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read image config {}", path.display()))?;
            let root = args.root.clone().unwrap_or_else(|| PathBuf::from("/"));
            let container = StaticContainer::from_image_config(root, &json)
                .with_context(|| format!("Failed to parse image config {}", path.display()))?;
            Some(Arc::new(container))
        }
        (None, None) => None,
    };

    let root = match (&args.root, &container) {
        (Some(root), _) => root.clone(),
        (None, Some(container)) => container.root().to_path_buf(),
        (None, None) => PathBuf::from("/"),
    };
    if !root.is_dir() {
        bail!("Snapshot root {} is not a directory", root.display());
    }

    let registry =
        FinderRegistry::from_config(&config).context("Failed to load service descriptors")?;
    info!(
        "Scanning {} for: {}",
        root.display(),
        registry.service_tags().collect::<Vec<_>>().join(", ")
    );

    let report = registry
        .discover_all(&root, container)
        .await
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("Failed to write report")?;

    Ok(())
}
