// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::PathBuf;

use serde::Serialize;

use crate::errors::Error;
use crate::manifest::DiscoveredInstance;

/// Something that was left out of discovery, kept for operator visibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub reason: String,
}

impl Skipped {
    pub fn new(service: &str, path: Option<PathBuf>, error: &Error) -> Self {
        Self {
            service: service.to_string(),
            path,
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    pub instances: Vec<DiscoveredInstance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<Skipped>,
}

impl DiscoveryReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn extend(&mut self, other: DiscoveryReport) {
        self.instances.extend(other.instances);
        self.skipped.extend(other.skipped);
    }

    /// Instances of one service type.
    pub fn for_service<'a>(
        &'a self,
        service: &'a str,
    ) -> impl Iterator<Item = &'a DiscoveredInstance> + 'a {
        self.instances
            .iter()
            .filter(move |instance| instance.manifest.service_name == service)
    }
}
