// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Component, Path, PathBuf};

use crate::errors::Error;
use crate::fs::{SnapshotFs, snapshot_path};

/// Resolves a snapshot path to the file that actually holds the data.
///
/// If `candidate` is a symbolic link, exactly one level of indirection is
/// followed: relative targets are resolved against the directory containing
/// the link, absolute targets against the snapshot root (not the host root).
/// Non-links resolve to themselves. Directory components of the path are
/// resolved the same way first, see `resolve_dir`.
///
/// Returns `Error::NotFound` if the candidate or its target does not exist
/// (common with partially extracted snapshots) and `Error::Escape` if the
/// target would climb above the snapshot root.
pub fn resolve(fs: &SnapshotFs, candidate: &Path) -> Result<PathBuf, Error> {
    let candidate = snapshot_path(candidate).ok_or_else(|| Error::Escape {
        path: candidate.to_path_buf(),
    })?;

    let candidate = match (candidate.parent(), candidate.file_name()) {
        (Some(parent), Some(name)) => resolve_dir(fs, parent)?.join(name),
        _ => candidate,
    };
    let resolved = follow(fs, candidate)?;

    if !fs.exists(&resolved) {
        return Err(Error::NotFound { path: resolved });
    }

    Ok(resolved)
}

/// Resolves every component of the snapshot directory `dir`, following one
/// level of symbolic link per component, and returns a path on which no
/// component is a link to be interpreted by the host.
///
/// Links with absolute targets on the way are re-rooted at the snapshot, so
/// walking the result from the host never leaves the snapshot.
pub fn resolve_dir(fs: &SnapshotFs, dir: &Path) -> Result<PathBuf, Error> {
    let dir = snapshot_path(dir).ok_or_else(|| Error::Escape {
        path: dir.to_path_buf(),
    })?;

    let mut real = PathBuf::from("/");
    for component in dir.components() {
        if let Component::Normal(name) = component {
            real = follow(fs, real.join(name))?;
        }
    }

    Ok(real)
}

/// One hop: the link target of `candidate` if it is a symbolic link, the
/// candidate itself otherwise.
fn follow(fs: &SnapshotFs, candidate: PathBuf) -> Result<PathBuf, Error> {
    let metadata = fs
        .symlink_metadata(&candidate)
        .map_err(|e| Error::io(&candidate, e))?;
    if !metadata.is_symlink() {
        return Ok(candidate);
    }

    let target = fs
        .read_link_contents(&candidate)
        .map_err(|e| Error::io(&candidate, e))?;

    let joined = if target.is_absolute() {
        target
    } else {
        candidate
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .join(target)
    };

    snapshot_path(&joined).ok_or(Error::Escape { path: candidate })
}
