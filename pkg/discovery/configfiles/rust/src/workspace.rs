// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::errors::Error;
use crate::fs::SnapshotFs;

/// Name prefix of every workspace directory.
pub const WORKSPACE_PREFIX: &str = "config-discovery-";

/// Creates workspaces, the private directories that hold the copy of one
/// discovered instance's files.
///
/// Workspaces are handed over to the caller once discovery completes and are
/// never deleted by this crate.
#[derive(Debug, Clone)]
pub struct Workspaces {
    base: PathBuf,
}

impl Default for Workspaces {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Workspaces {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Allocates a fresh, empty directory for one instance of `service`.
    pub fn create(&self, service: &str) -> Result<Workspace, Error> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{WORKSPACE_PREFIX}{service}-"))
            .tempdir_in(&self.base)
            .map_err(|source| Error::Resource { source })?;

        let path = dir.keep();
        debug!("created workspace {}", path.display());

        Ok(Workspace {
            path,
            occupied: HashSet::new(),
        })
    }
}

/// An open workspace. Becomes read-only from our side when converted into its
/// path with `close()`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    occupied: HashSet<PathBuf>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether something was already copied at this bundle-relative path.
    pub fn is_occupied(&self, bundle_path: &Path) -> bool {
        self.occupied.contains(bundle_path)
    }

    /// Copies the snapshot file `source` byte-for-byte to `bundle_path`
    /// inside the workspace, creating intermediate directories.
    ///
    /// The source is size-verified first, so oversized files and anything
    /// that isn't a regular file are rejected with `Error::Io`. A source that
    /// vanished since it was discovered yields `Error::NotFound`.
    pub fn copy_into(
        &mut self,
        snapshot: &SnapshotFs,
        source: &Path,
        bundle_path: &Path,
        max_size: Option<u64>,
    ) -> Result<(), Error> {
        if !is_plain_relative(bundle_path) {
            return Err(Error::Io {
                path: bundle_path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "bundle path must be relative and normalized",
                ),
            });
        }
        if self.is_occupied(bundle_path) {
            return Err(Error::Io {
                path: bundle_path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "bundle path already used",
                ),
            });
        }

        let file = snapshot.open(source).map_err(|e| Error::io(source, e))?;
        let mut reader = file.verify(max_size).map_err(|e| Error::io(source, e))?;

        let destination = self.path.join(bundle_path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut out = File::create(&destination).map_err(|e| Error::io(&destination, e))?;
        io::copy(&mut reader, &mut out).map_err(|e| Error::io(&destination, e))?;

        self.occupied.insert(bundle_path.to_path_buf());
        Ok(())
    }

    /// Closes the workspace for writes and hands its path over.
    pub fn close(self) -> PathBuf {
        self.path
    }

    /// Abandons the workspace, removing whatever was copied so far. Used when
    /// an instance could not be bundled at all.
    pub fn discard(self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            debug!("could not remove workspace {}: {e}", self.path.display());
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
