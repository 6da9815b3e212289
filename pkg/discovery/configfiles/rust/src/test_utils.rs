// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Helpers for building throwaway snapshots in temporary directories.
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use crate::fs::SnapshotFs;
use crate::workspace::Workspaces;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct SnapshotBuilder {
    temp_dir: TempDir,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.temp_dir.path().join(path.trim_start_matches('/'))
    }

    pub fn file(self, path: &str, contents: &str) -> Self {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&host, contents).unwrap();
        self
    }

    pub fn dir(self, path: &str) -> Self {
        std::fs::create_dir_all(self.host_path(path)).unwrap();
        self
    }

    /// Creates `path` as a symbolic link whose contents are exactly `target`.
    pub fn symlink(self, path: &str, target: &str) -> Self {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(target, &host).unwrap();
        self
    }

    pub fn build(self) -> TestSnapshot {
        let fs = SnapshotFs::new(self.temp_dir.path()).unwrap();
        TestSnapshot {
            temp_dir: self.temp_dir,
            workspace_dir: TempDir::new().unwrap(),
            fs,
        }
    }
}

pub struct TestSnapshot {
    temp_dir: TempDir,
    workspace_dir: TempDir,
    fs: SnapshotFs,
}

impl TestSnapshot {
    pub fn fs(&self) -> &SnapshotFs {
        &self.fs
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Workspaces are created in a directory owned by the test so that they
    /// get cleaned up with it.
    pub fn workspaces(&self) -> Workspaces {
        Workspaces::new(self.workspace_dir.path())
    }

    pub fn workspace_dir(&self) -> &Path {
        self.workspace_dir.path()
    }
}
