// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Path, PathBuf};

use crate::errors::Error;
use crate::fs::SnapshotFs;
use crate::resolve::resolve_dir;

const WILDCARDS: [char; 4] = ['?', '*', '[', '{'];

/// Whether an include reference needs glob expansion.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(WILDCARDS)
}

/// Extract the longest path prefix without wildcards
pub fn longest_path_prefix(pattern: &str) -> &str {
    if let Some((prefix, _)) = pattern.split_once(WILDCARDS) {
        return prefix
            .rsplit_once('/')
            .map(|(prefix, _)| prefix)
            .unwrap_or("");
    };

    pattern
}

/// Match a path against a shell-style pattern
/// Uses glob-match which supports **, *, ?, [ab], {a,b} patterns
pub fn matches(pattern: &str, path: &str) -> bool {
    glob_match::glob_match(pattern, path)
}

/// Check if a path could potentially match a pattern
/// This is used to skip entire directory trees during traversal
/// Returns true if the path matches OR if it's a prefix that could lead to matches
pub fn match_start(pattern: &str, path: &str) -> bool {
    if matches(pattern, path) {
        return true;
    }

    let prefix = longest_path_prefix(pattern);

    // If the pattern has no prefix (e.g., "*.conf"), we need to explore everything
    if prefix.is_empty() {
        return true;
    }

    path.starts_with(prefix) || prefix.starts_with(path)
}

/// Expands a glob over snapshot paths (e.g. `/etc/nginx/sites/*.conf`) into
/// the sorted list of matching non-directory entries.
///
/// Links on the glob's literal directory prefix are resolved before walking,
/// and matches are reported under the prefix as written. A missing prefix
/// matches nothing.
pub fn expand(fs: &SnapshotFs, pattern: &Path, max_depth: usize) -> Result<Vec<PathBuf>, Error> {
    let pattern = pattern.to_string_lossy();
    let prefix = Path::new("/").join(longest_path_prefix(&pattern));
    let real_prefix = match resolve_dir(fs, &prefix) {
        Ok(real_prefix) => real_prefix,
        Err(err) if err.is_not_found() => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    // Maps a walked host path back to the snapshot path as referenced.
    let referenced = |host_path: &Path| -> Option<PathBuf> {
        let real = fs.make_relative(host_path)?;
        let rest = real.strip_prefix(&real_prefix).ok()?;
        Some(prefix.join(rest))
    };

    let mut found: Vec<PathBuf> = fs
        .walker(&real_prefix, max_depth)
        .into_iter()
        .filter_entry(|e| {
            referenced(e.path())
                .is_some_and(|path| match_start(&pattern, &path.to_string_lossy()))
        })
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| referenced(entry.path()))
        .filter(|path| matches(&pattern, &path.to_string_lossy()))
        .collect();

    found.sort();
    Ok(found)
}
