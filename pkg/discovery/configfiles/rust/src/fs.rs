// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use cap_std::fs::Dir;
use normalize_path::NormalizePath;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// SnapshotFs gives read access to a filesystem snapshot (a host directory, an
/// extracted image or a container root) using snapshot paths: absolute paths
/// such as `/etc/nginx/nginx.conf` are interpreted relative to the snapshot
/// root instead of the host root.
///
/// All accesses go through a cap_std::fs::Dir, so neither `..` nor symbolic
/// links can be used to reach files outside of the snapshot.
pub struct SnapshotFs {
    dir: Dir,
    root_path: PathBuf,
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MiB

/// Strips the leading slash (if any) so that the path can be passed to
/// cap_std functions, which only accept relative paths.
fn fix_path<P: AsRef<Path>>(path: &P) -> &Path {
    let path = path.as_ref();
    path.strip_prefix("/").unwrap_or(path)
}

/// Returns the normalized snapshot path for `path`, which may be relative to
/// the snapshot root or absolute. Returns None if `..` components would climb
/// above the snapshot root.
pub fn snapshot_path<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let mut depth: usize = 0;
    for component in fix_path(&path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.checked_sub(1)?,
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    Some(Path::new("/").join(fix_path(&path)).normalize())
}

/// Returns the path relative to the snapshot root, suitable for mirroring a
/// snapshot path inside a workspace.
pub fn relative_path(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}

/// UnverifiedFile is a wrapper around cap_std::fs::File that prevents reading
/// the file contents until size verification has been performed via the
/// verify() method.
pub struct UnverifiedFile(cap_std::fs::File);

impl UnverifiedFile {
    /// Verifies the file and returns a reader limited to the verified size.
    /// Device files, FIFOs and files larger than `max_size` are rejected.
    pub fn verify(&self, max_size: Option<u64>) -> io::Result<impl Read + '_> {
        size_verified_reader(&self.0, max_size)
    }
}

impl SnapshotFs {
    /// Opens the snapshot rooted at the specified host path.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root_path = root.as_ref().to_path_buf();
        let dir = Dir::open_ambient_dir(root.as_ref(), cap_std::ambient_authority())?;
        Ok(Self { dir, root_path })
    }

    /// Host path of the snapshot root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Opens a file for reading, returning an UnverifiedFile.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> io::Result<UnverifiedFile> {
        let fixed = fix_path(&path);
        let file = self.dir.open(fixed)?;
        Ok(UnverifiedFile(file))
    }

    /// Reads a whole file as text after size verification. Invalid UTF-8 is
    /// replaced rather than rejected since configuration files are not always
    /// clean.
    pub fn read_to_string<P: AsRef<Path>>(
        &self,
        path: P,
        max_size: Option<u64>,
    ) -> io::Result<String> {
        let file = self.open(path)?;
        let mut reader = file.verify(max_size)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Gets metadata for a file or directory, following symbolic links.
    pub fn metadata<P: AsRef<Path>>(&self, path: P) -> io::Result<cap_std::fs::Metadata> {
        let fixed = fix_path(&path);
        self.dir.metadata(fixed)
    }

    /// Gets symlink metadata (doesn't follow symlinks)
    pub fn symlink_metadata<P: AsRef<Path>>(&self, path: P) -> io::Result<cap_std::fs::Metadata> {
        let fixed = fix_path(&path);
        self.dir.symlink_metadata(fixed)
    }

    /// Reads a symbolic link
    ///
    /// We don't expose read_link because it returns an error if the link target
    /// is an absolute path.
    pub fn read_link_contents<P: AsRef<Path>>(&self, path: P) -> io::Result<PathBuf> {
        let fixed = fix_path(&path);
        self.dir.read_link_contents(fixed)
    }

    /// Reads a directory
    pub fn read_dir<P: AsRef<Path>>(&self, path: P) -> io::Result<cap_std::fs::ReadDir> {
        let fixed = fix_path(&path);
        self.dir.read_dir(fixed)
    }

    /// Returns `true` if the path points at an existing entity.
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        let fixed = fix_path(&path);
        self.dir.exists(fixed)
    }

    /// Returns `true` if the path exists without following a final symlink,
    /// so that dangling links still count as present.
    pub fn lexists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.symlink_metadata(path).is_ok()
    }

    /// Returns a pre-configured WalkDir for the given start path. Symbolic
    /// links are never followed while walking.
    ///
    /// Use `make_relative()` to convert the host paths from walkdir entries
    /// back to snapshot paths.
    pub fn walker<P: AsRef<Path>>(&self, start_path: P, max_depth: usize) -> WalkDir {
        let full_path = self.root_path.join(fix_path(&start_path));
        WalkDir::new(full_path)
            .max_depth(max_depth)
            .follow_links(false)
            .follow_root_links(false)
    }

    /// Converts a host path from `walker()` to a snapshot path. Returns None
    /// if the path is not within the snapshot root.
    pub fn make_relative(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.root_path).ok()?;
        Some(Path::new("/").join(relative))
    }
}

/// Returns a reader for the file after ensuring that the file is a regular file
/// and that the size that can be read from the reader will not exceed a
/// pre-defined safety limit to control memory usage.
pub fn size_verified_reader(
    file: &cap_std::fs::File,
    max_size: Option<u64>,
) -> io::Result<impl Read + '_> {
    let metadata = file.metadata()?;

    let max_size = max_size.unwrap_or(DEFAULT_MAX_FILE_SIZE);

    // Don't try to read device files, etc.
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }

    let size = metadata.len();
    if size > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("file too large ({} bytes)", size),
        ));
    }

    // Additional limit the reader to avoid surprises if the file size changes
    // while reading it (TOCTOU protection)
    Ok(file.take(size.min(max_size)))
}
