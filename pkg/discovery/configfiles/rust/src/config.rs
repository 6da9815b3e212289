// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

use crate::descriptor::ServiceDescriptor;
use crate::finder::FinderOptions;
use crate::fs::DEFAULT_MAX_FILE_SIZE;
use crate::workspace::Workspaces;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/config-discovery.yaml";

const ENV_LOG_LEVEL: &str = "DD_CONFIG_DISCOVERY_LOG_LEVEL";
const ENV_WORKSPACE_DIR: &str = "DD_CONFIG_DISCOVERY_WORKSPACE_DIR";
const ENV_MAX_WORKERS: &str = "DD_CONFIG_DISCOVERY_MAX_WORKERS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub log_level: String,
    /// Base directory for workspaces. Defaults to the system temp dir.
    pub workspace_dir: Option<PathBuf>,
    /// Upper bound on finders running at once. Defaults to the available
    /// parallelism.
    pub max_workers: Option<usize>,
    pub inspect_timeout_secs: u64,
    pub max_file_size: u64,
    pub max_search_depth: usize,
    pub disabled_services: Vec<String>,
    /// Extra service descriptors; one with a built-in's name replaces it.
    pub services: Vec<ServiceDescriptor>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            workspace_dir: None,
            max_workers: None,
            inspect_timeout_secs: 10,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_search_depth: 32,
            disabled_services: Vec::new(),
            services: Vec::new(),
        }
    }
}

/// Loads the YAML config file if it exists. A missing file yields the
/// defaults; environment overrides apply in both cases.
pub fn load_config(config_path: Option<PathBuf>) -> Result<DiscoveryConfig> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if path.exists() {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        warn!(
            "Config file not found at {}. Using defaults.",
            path.display()
        );
        DiscoveryConfig::default()
    };

    config.apply_env_overrides();
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<DiscoveryConfig, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(DiscoveryConfig::default());
    }
    serde_yaml::from_str(contents)
}

impl DiscoveryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.log_level = level;
        }

        if let Ok(dir) = env::var(ENV_WORKSPACE_DIR)
            && !dir.is_empty()
        {
            self.workspace_dir = Some(PathBuf::from(dir));
        }

        if let Ok(workers) = env::var(ENV_MAX_WORKERS) {
            match workers.parse::<usize>() {
                Ok(workers) => self.max_workers = Some(workers),
                Err(e) => warn!("Ignoring {ENV_MAX_WORKERS}={workers:?}: {e}"),
            }
        }
    }

    /// Unknown level names fall back to `info`.
    pub fn log_level(&self) -> log::Level {
        simple_logger::parse_level(&self.log_level)
            .and_then(|filter| filter.to_level())
            .unwrap_or(log::Level::Info)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
            .filter(|workers| *workers > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }

    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    pub fn finder_options(&self) -> FinderOptions {
        let workspaces = match &self.workspace_dir {
            Some(dir) => Workspaces::new(dir),
            None => Workspaces::default(),
        };

        FinderOptions {
            workspaces,
            max_file_size: Some(self.max_file_size),
            max_search_depth: self.max_search_depth,
        }
    }
}
