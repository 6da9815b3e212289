// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;

use crate::container::ProcessInfo;
use crate::descriptor::ServiceDescriptor;
use crate::errors::Error;
use crate::fs::{DEFAULT_MAX_FILE_SIZE, SnapshotFs, relative_path, snapshot_path};
use crate::includes::{IncludeResolver, IncludeRule};
use crate::manifest::{ConfigFile, DiscoveredInstance, Manifest};
use crate::report::{DiscoveryReport, Skipped};
use crate::resolve::resolve;
use crate::workspace::{WORKSPACE_PREFIX, Workspaces};

/// Pseudo filesystems that never hold configuration when the snapshot is a
/// live host root.
const SKIPPED_TOP_LEVEL_DIRS: [&str; 3] = ["/proc", "/sys", "/dev"];

/// Limits and collaborators shared by every finder of a run.
#[derive(Debug, Clone)]
pub struct FinderOptions {
    pub workspaces: Workspaces,
    pub max_file_size: Option<u64>,
    pub max_search_depth: usize,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            workspaces: Workspaces::default(),
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            max_search_depth: 32,
        }
    }
}

/// One supported service type.
///
/// Implementors only have to say where primary files may be and how to
/// bundle one; the three discovery strategies are built on top of that.
/// `claimed` holds the resolved paths this finder already bundled from the
/// same snapshot, so that a file found by several strategies yields a single
/// instance.
pub trait Finder: Send + Sync {
    fn service_tag(&self) -> &str;

    /// First well-known location present in the snapshot.
    fn locate_standard(&self, fs: &SnapshotFs) -> Option<PathBuf>;

    /// Every file in the snapshot carrying one of the canonical names.
    fn locate_in_tree(&self, fs: &SnapshotFs, options: &FinderOptions) -> Vec<PathBuf>;

    /// Configuration paths given on process command lines.
    fn locate_in_processes(&self, processes: &[ProcessInfo]) -> Vec<PathBuf>;

    /// Copies the primary file at snapshot path `primary` (data at `real`)
    /// and everything it includes into a new workspace.
    fn bundle(
        &self,
        fs: &SnapshotFs,
        primary: &Path,
        real: &Path,
        options: &FinderOptions,
    ) -> Result<(DiscoveredInstance, Vec<Skipped>), Error>;

    fn probe_standard_location(
        &self,
        fs: &SnapshotFs,
        options: &FinderOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> DiscoveryReport {
        let candidates: Vec<PathBuf> = self.locate_standard(fs).into_iter().collect();
        self.bundle_candidates(fs, &candidates, options, claimed)
    }

    fn search_filesystem(
        &self,
        fs: &SnapshotFs,
        options: &FinderOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> DiscoveryReport {
        let candidates = self.locate_in_tree(fs, options);
        self.bundle_candidates(fs, &candidates, options, claimed)
    }

    /// `fs` is the container's filesystem view and `processes` its process
    /// listing.
    fn inspect_running_container(
        &self,
        fs: &SnapshotFs,
        processes: &[ProcessInfo],
        options: &FinderOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> DiscoveryReport {
        let candidates = self.locate_in_processes(processes);
        self.bundle_candidates(fs, &candidates, options, claimed)
    }

    /// Bundles each candidate whose resolved file was not claimed yet. Every
    /// bundle gets its own workspace and visited set.
    fn bundle_candidates(
        &self,
        fs: &SnapshotFs,
        candidates: &[PathBuf],
        options: &FinderOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> DiscoveryReport {
        let service = self.service_tag();
        let mut report = DiscoveryReport::default();

        for candidate in candidates {
            let resolved = snapshot_path(candidate)
                .ok_or_else(|| Error::Escape {
                    path: candidate.clone(),
                })
                .and_then(|primary| resolve(fs, &primary).map(|real| (primary, real)));

            let (primary, real) = match resolved {
                Ok(resolved) => resolved,
                Err(err) => {
                    debug!("{service}: ignoring {}: {err}", candidate.display());
                    report
                        .skipped
                        .push(Skipped::new(service, Some(candidate.clone()), &err));
                    continue;
                }
            };

            if !claimed.insert(real.clone()) {
                debug!("{service}: {} already bundled", real.display());
                continue;
            }

            match self.bundle(fs, &primary, &real, options) {
                Ok((instance, skipped)) => {
                    info!(
                        "{service}: bundled {} into {}",
                        primary.display(),
                        instance.workspace.display()
                    );
                    report.instances.push(instance);
                    report.skipped.extend(skipped);
                }
                Err(err) => {
                    warn!("{service}: could not bundle {}: {err}", primary.display());
                    report.skipped.push(Skipped::new(service, Some(primary), &err));
                }
            }
        }

        report
    }
}

/// A finder driven entirely by a `ServiceDescriptor`.
#[derive(Debug)]
pub struct DescriptorFinder {
    descriptor: ServiceDescriptor,
    process_pattern: Option<Regex>,
    includes: IncludeRule,
}

impl DescriptorFinder {
    /// Compiles the descriptor's patterns, rejecting descriptors that could
    /// never match anything sensible.
    pub fn new(descriptor: ServiceDescriptor) -> Result<Self, Error> {
        if descriptor.service_name.trim().is_empty() {
            return Err(descriptor.invalid("empty service_name"));
        }
        if descriptor.default_file_name.trim().is_empty() {
            return Err(descriptor.invalid("empty default_file_name"));
        }

        let process_pattern = descriptor
            .process_pattern
            .as_deref()
            .map(|pattern| {
                let re = Regex::new(pattern).map_err(|e| descriptor.invalid(e.to_string()))?;
                if re.captures_len() < 2 {
                    return Err(descriptor.invalid(format!(
                        "process pattern {pattern:?} has no capture group"
                    )));
                }
                Ok(re)
            })
            .transpose()?;

        let includes = IncludeRule::new(
            &descriptor.include_patterns,
            descriptor.include_relative_to,
            descriptor.comment_prefix.clone(),
        )
        .map_err(|reason| descriptor.invalid(reason))?;

        Ok(Self {
            descriptor,
            process_pattern,
            includes,
        })
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    fn is_canonical_name(&self, name: &str) -> bool {
        self.descriptor.file_names.iter().any(|n| n == name)
            || (self.descriptor.file_names.is_empty() && name == self.descriptor.default_file_name)
    }
}

impl Finder for DescriptorFinder {
    fn service_tag(&self) -> &str {
        &self.descriptor.service_name
    }

    fn locate_standard(&self, fs: &SnapshotFs) -> Option<PathBuf> {
        self.descriptor
            .standard_locations
            .iter()
            .map(PathBuf::from)
            .find(|location| fs.lexists(location))
    }

    fn locate_in_tree(&self, fs: &SnapshotFs, options: &FinderOptions) -> Vec<PathBuf> {
        let service = self.service_tag();
        let workspace_base = options.workspaces.base();

        let mut found: Vec<PathBuf> = fs
            .walker("/", options.max_search_depth)
            .into_iter()
            .filter_entry(|entry| {
                if entry.path().parent() == Some(workspace_base)
                    && entry
                        .file_name()
                        .to_string_lossy()
                        .starts_with(WORKSPACE_PREFIX)
                {
                    return false;
                }
                match fs.make_relative(entry.path()) {
                    Some(path) => !SKIPPED_TOP_LEVEL_DIRS
                        .iter()
                        .any(|skipped| path == Path::new(skipped)),
                    None => false,
                }
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("{service}: walk error: {e}");
                    None
                }
            })
            .filter(|entry| {
                let file_type = entry.file_type();
                (file_type.is_file() || file_type.is_symlink())
                    && self.is_canonical_name(&entry.file_name().to_string_lossy())
            })
            .filter_map(|entry| fs.make_relative(entry.path()))
            .collect();

        found.sort();
        found
    }

    fn locate_in_processes(&self, processes: &[ProcessInfo]) -> Vec<PathBuf> {
        let Some(pattern) = &self.process_pattern else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for process in processes {
            let cmdline = process.cmdline.joined();
            for captures in pattern.captures_iter(&cmdline) {
                let Some(arg) = captures.get(1) else {
                    continue;
                };
                let arg = Path::new(arg.as_str().trim_matches(['"', '\'']));
                let path = if arg.is_absolute() {
                    arg.to_path_buf()
                } else {
                    process
                        .cwd
                        .as_deref()
                        .unwrap_or_else(|| Path::new("/"))
                        .join(arg)
                };
                debug!("{}: process {cmdline:?} uses {}", self.service_tag(), path.display());
                if !found.contains(&path) {
                    found.push(path);
                }
            }
        }

        found
    }

    fn bundle(
        &self,
        fs: &SnapshotFs,
        primary: &Path,
        real: &Path,
        options: &FinderOptions,
    ) -> Result<(DiscoveredInstance, Vec<Skipped>), Error> {
        let service = self.service_tag();
        let config_file_type = self.descriptor.config_file_type();

        let mut workspace = options.workspaces.create(service)?;
        let bundle_path = relative_path(primary).to_path_buf();
        if let Err(err) = workspace.copy_into(fs, real, &bundle_path, options.max_file_size) {
            workspace.discard();
            return Err(err);
        }

        let mut manifest = Manifest::new(service);
        manifest.config_file_list.push(ConfigFile::at(
            &bundle_path,
            &self.descriptor.default_file_name,
            config_file_type,
        ));

        let mut visited = HashSet::from([real.to_path_buf()]);
        let skipped = IncludeResolver::new(fs, &self.includes, service, config_file_type)
            .max_file_size(options.max_file_size)
            .max_depth(options.max_search_depth)
            .resolve(primary, real, &mut workspace, &mut manifest, &mut visited);

        let instance = DiscoveredInstance {
            manifest,
            workspace: workspace.close(),
        };
        Ok((instance, skipped))
    }
}
