// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: &str = "1.0";

/// Describes one discovered service instance. Field names are part of the
/// contract with the upload side and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub service_name: String,
    pub config_file_list: Vec<ConfigFile>,
    pub complimentary_file_list: Vec<ConfigFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub file_name: String,
    pub default_file_name: String,
    pub sub_path: String,
    pub config_file_type: String,
}

impl ConfigFile {
    /// Builds a descriptor for a file stored at `bundle_path` (relative to the
    /// workspace root).
    pub fn at(bundle_path: &Path, default_file_name: &str, config_file_type: &str) -> Self {
        let file_name = bundle_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sub_path = match bundle_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().into_owned()
            }
            _ => ".".to_string(),
        };

        Self {
            file_name,
            default_file_name: default_file_name.to_string(),
            sub_path,
            config_file_type: config_file_type.to_string(),
        }
    }

    /// Path of the file relative to the workspace root.
    pub fn bundle_path(&self) -> PathBuf {
        Path::new(&self.sub_path).join(&self.file_name)
    }
}

impl Manifest {
    pub fn new(service_name: &str) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            service_name: service_name.to_string(),
            config_file_list: Vec::new(),
            complimentary_file_list: Vec::new(),
        }
    }

    /// All descriptors, primary files first.
    pub fn files(&self) -> impl Iterator<Item = &ConfigFile> {
        self.config_file_list
            .iter()
            .chain(self.complimentary_file_list.iter())
    }
}

/// A finished bundle: the manifest and the workspace holding its files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredInstance {
    pub manifest: Manifest,
    pub workspace: PathBuf,
}
