// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;

use crate::config::DiscoveryConfig;
use crate::container::{ContainerHandle, ProcessInfo};
use crate::descriptor::{self, ServiceDescriptor};
use crate::errors::Error;
use crate::finder::{DescriptorFinder, Finder, FinderOptions};
use crate::fs::SnapshotFs;
use crate::report::{DiscoveryReport, Skipped};

const DEFAULT_INSPECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A container's filesystem view together with its process listing.
struct Inspection {
    fs: Arc<SnapshotFs>,
    processes: Arc<Vec<ProcessInfo>>,
}

/// Holds the known finders and runs them against a snapshot.
pub struct FinderRegistry {
    finders: Vec<Arc<dyn Finder>>,
    options: FinderOptions,
    max_workers: usize,
    inspect_timeout: Duration,
    rejected: Vec<Skipped>,
}

impl FinderRegistry {
    pub fn new(options: FinderOptions) -> Self {
        Self {
            finders: Vec::new(),
            options,
            max_workers: 1,
            inspect_timeout: DEFAULT_INSPECT_TIMEOUT,
            rejected: Vec::new(),
        }
    }

    /// Registry with one finder per descriptor. Invalid descriptors are
    /// logged, skipped and reported with every discovery run.
    pub fn from_descriptors(descriptors: Vec<ServiceDescriptor>, options: FinderOptions) -> Self {
        let mut registry = Self::new(options);
        for descriptor in descriptors {
            let service = descriptor.service_name.clone();
            match DescriptorFinder::new(descriptor) {
                Ok(finder) => registry.register(Arc::new(finder)),
                Err(err) => {
                    warn!("Ignoring service {service:?}: {err}");
                    registry.rejected.push(Skipped::new(&service, None, &err));
                }
            }
        }
        registry
    }

    /// Built-in services merged with the configured ones, minus the disabled
    /// ones.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, Error> {
        let descriptors: Vec<ServiceDescriptor> =
            descriptor::merge(descriptor::builtin()?, config.services.clone())
                .into_iter()
                .filter(|d| {
                    let disabled = config.disabled_services.contains(&d.service_name);
                    if disabled {
                        info!("Service {} is disabled", d.service_name);
                    }
                    !disabled
                })
                .collect();

        Ok(Self::from_descriptors(descriptors, config.finder_options())
            .max_workers(config.max_workers())
            .inspect_timeout(config.inspect_timeout()))
    }

    pub fn register(&mut self, finder: Arc<dyn Finder>) {
        debug!("Registered finder {}", finder.service_tag());
        self.finders.push(finder);
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn inspect_timeout(mut self, timeout: Duration) -> Self {
        self.inspect_timeout = timeout;
        self
    }

    pub fn service_tags(&self) -> impl Iterator<Item = &str> {
        self.finders.iter().map(|finder| finder.service_tag())
    }

    /// Runs every finder against the snapshot at `root` and, when given,
    /// against the processes of `container`.
    ///
    /// Finders run concurrently, at most `max_workers` at a time. Results are
    /// reported in registration order. A failing finder never affects the
    /// others; only a snapshot root that cannot be opened is an error.
    pub async fn discover_all(
        &self,
        root: &Path,
        container: Option<Arc<dyn ContainerHandle>>,
    ) -> Result<DiscoveryReport, Error> {
        let fs = Arc::new(SnapshotFs::new(root).map_err(|e| Error::io(root, e))?);
        let mut report = DiscoveryReport {
            instances: Vec::new(),
            skipped: self.rejected.clone(),
        };

        let inspection = match container {
            Some(container) => self.inspect(&fs, container, &mut report).await,
            None => None,
        };
        let inspection = inspection.map(Arc::new);

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles: Vec<(String, JoinHandle<DiscoveryReport>)> = Vec::new();

        for finder in &self.finders {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let finder = finder.clone();
            let fs = fs.clone();
            let inspection = inspection.clone();
            let options = self.options.clone();
            let tag = finder.service_tag().to_string();

            let handle = tokio::task::spawn_blocking(move || {
                let report = run_finder(finder.as_ref(), &fs, inspection.as_deref(), &options);
                drop(permit);
                report
            });
            handles.push((tag, handle));
        }

        for (tag, handle) in handles {
            match handle.await {
                Ok(finder_report) => report.extend(finder_report),
                Err(e) => {
                    warn!("{tag}: finder failed: {e}");
                    report.skipped.push(Skipped {
                        service: tag,
                        path: None,
                        reason: format!("finder failed: {e}"),
                    });
                }
            }
        }

        info!(
            "Discovered {} instance(s), skipped {} item(s)",
            report.instances.len(),
            report.skipped_count()
        );
        Ok(report)
    }

    /// Lists the container's processes once, under the inspection timeout.
    /// Any failure leaves inspection out of the run.
    async fn inspect(
        &self,
        fs: &Arc<SnapshotFs>,
        container: Arc<dyn ContainerHandle>,
        report: &mut DiscoveryReport,
    ) -> Option<Inspection> {
        let id = container.id().to_string();
        let root = container.root().to_path_buf();

        // Detached thread, not spawn_blocking: runtime shutdown waits for
        // blocking tasks, and a stuck /proc read must not hold it up.
        let (tx, rx) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name("config-discovery-inspect".to_string())
            .spawn(move || {
                // The receiver is gone once the timeout fired.
                let _ = tx.send(container.processes());
            });
        if let Err(e) = spawned {
            let err = Error::io(&root, e);
            warn!("Cannot start process listing of container {id}: {err}");
            report.skipped.push(Skipped::new(&id, Some(root), &err));
            return None;
        }

        let processes = match tokio::time::timeout(self.inspect_timeout, rx).await {
            Ok(Ok(Ok(processes))) => processes,
            Ok(Ok(Err(err))) => {
                warn!("Could not list processes of container {id}: {err}");
                report.skipped.push(Skipped::new(&id, Some(root), &err));
                return None;
            }
            Ok(Err(_)) => {
                warn!("Process listing of container {id} failed");
                report.skipped.push(Skipped {
                    service: id,
                    path: Some(root),
                    reason: "process listing failed".to_string(),
                });
                return None;
            }
            Err(_) => {
                let err = Error::Timeout(self.inspect_timeout);
                warn!("Container {id}: {err}");
                report.skipped.push(Skipped::new(&id, Some(root), &err));
                return None;
            }
        };
        debug!("Container {id} runs {} process(es)", processes.len());

        let container_fs = if root == fs.root_path() {
            fs.clone()
        } else {
            match SnapshotFs::new(&root) {
                Ok(container_fs) => Arc::new(container_fs),
                Err(e) => {
                    let err = Error::io(&root, e);
                    warn!("Cannot open filesystem of container {id}: {err}");
                    report.skipped.push(Skipped::new(&id, Some(root), &err));
                    return None;
                }
            }
        };

        Some(Inspection {
            fs: container_fs,
            processes: Arc::new(processes),
        })
    }
}

/// Probe, then search, then process inspection. A primary file found by an
/// earlier strategy is not bundled again by a later one.
fn run_finder(
    finder: &dyn Finder,
    fs: &Arc<SnapshotFs>,
    inspection: Option<&Inspection>,
    options: &FinderOptions,
) -> DiscoveryReport {
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    let mut report = finder.probe_standard_location(fs, options, &mut claimed);
    report.extend(finder.search_filesystem(fs, options, &mut claimed));

    if let Some(inspection) = inspection {
        let mut separate = HashSet::new();
        let claimed = if Arc::ptr_eq(&inspection.fs, fs) {
            &mut claimed
        } else {
            &mut separate
        };
        report.extend(finder.inspect_running_container(
            &inspection.fs,
            &inspection.processes,
            options,
            claimed,
        ));
    }

    report
}
