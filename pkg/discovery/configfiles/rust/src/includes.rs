// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};

use crate::descriptor::RelativeTo;
use crate::errors::Error;
use crate::fs::{SnapshotFs, relative_path, snapshot_path};
use crate::manifest::{ConfigFile, Manifest};
use crate::pattern;
use crate::report::Skipped;
use crate::resolve::resolve;
use crate::workspace::Workspace;

/// How a service's configuration language references other files.
#[derive(Debug, Clone)]
pub struct IncludeRule {
    patterns: Vec<Regex>,
    relative_to: RelativeTo,
    comment_prefix: Option<String>,
}

impl IncludeRule {
    /// Compiles the include patterns. Each must have at least one capture
    /// group; the first one is the referenced path.
    pub fn new(
        patterns: &[String],
        relative_to: RelativeTo,
        comment_prefix: Option<String>,
    ) -> Result<Self, String> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let re = RegexBuilder::new(p)
                    .multi_line(true)
                    .build()
                    .map_err(|e| e.to_string())?;
                if re.captures_len() < 2 {
                    return Err(format!("include pattern {p:?} has no capture group"));
                }
                Ok(re)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            relative_to,
            comment_prefix: comment_prefix.filter(|prefix| !prefix.is_empty()),
        })
    }

    /// Extracts the referenced path strings from `content`, in the order they
    /// appear in the text.
    pub fn references(&self, content: &str) -> Vec<String> {
        let content = match &self.comment_prefix {
            Some(prefix) => content
                .lines()
                .filter(|line| !line.trim_start().starts_with(prefix.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            None => content.to_string(),
        };

        let mut found: Vec<(usize, String)> = Vec::new();
        for re in &self.patterns {
            for captures in re.captures_iter(&content) {
                let Some(group) = captures.get(1) else {
                    continue;
                };
                let reference = group.as_str().trim();
                if !reference.is_empty() {
                    found.push((group.start(), reference.to_string()));
                }
            }
        }

        found.sort_by_key(|(start, _)| *start);
        found.into_iter().map(|(_, reference)| reference).collect()
    }
}

/// A file pulled into the bundle: where it was referenced from (the path the
/// service itself would open) and where the data actually lives.
struct Entry {
    path: PathBuf,
    real: PathBuf,
}

/// Pulls every file transitively referenced from a primary configuration file
/// into a workspace and registers it in the manifest.
///
/// Traversal is breadth-first over an explicit queue. The visited set holds
/// resolved paths, so a file reachable through several references (or
/// through a cycle) is copied once.
pub struct IncludeResolver<'a> {
    fs: &'a SnapshotFs,
    rule: &'a IncludeRule,
    service: &'a str,
    config_file_type: &'a str,
    max_file_size: Option<u64>,
    max_depth: usize,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(
        fs: &'a SnapshotFs,
        rule: &'a IncludeRule,
        service: &'a str,
        config_file_type: &'a str,
    ) -> Self {
        Self {
            fs,
            rule,
            service,
            config_file_type,
            max_file_size: None,
            max_depth: 32,
        }
    }

    pub fn max_file_size(mut self, max_file_size: Option<u64>) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Maximum directory depth walked when expanding glob references.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolves includes starting from the primary file at snapshot path
    /// `primary`, whose data lives at `primary_real`. The caller is expected to
    /// have copied the primary file already and recorded `primary_real` in
    /// `visited`.
    ///
    /// Missing, unreadable or escaping references are skipped and returned;
    /// they never abort resolution.
    pub fn resolve(
        &self,
        primary: &Path,
        primary_real: &Path,
        workspace: &mut Workspace,
        manifest: &mut Manifest,
        visited: &mut HashSet<PathBuf>,
    ) -> Vec<Skipped> {
        let mut skipped = Vec::new();
        let primary_dir = primary.parent().unwrap_or_else(|| Path::new("/"));

        let mut queue = VecDeque::from([Entry {
            path: primary.to_path_buf(),
            real: primary_real.to_path_buf(),
        }]);

        while let Some(current) = queue.pop_front() {
            let content = match self.fs.read_to_string(&current.real, self.max_file_size) {
                Ok(content) => content,
                Err(e) => {
                    let err = Error::io(&current.real, e);
                    debug!("{}: cannot read {}: {err}", self.service, current.real.display());
                    skipped.push(Skipped::new(self.service, Some(current.real), &err));
                    continue;
                }
            };

            let base = match self.rule.relative_to {
                RelativeTo::IncludingFile => current.path.parent().unwrap_or(primary_dir),
                RelativeTo::PrimaryFile => primary_dir,
            };

            for reference in self.rule.references(&content) {
                let candidates = match self.candidates(&reference, base) {
                    Ok(candidates) => candidates,
                    Err(err) => {
                        warn!("{}: ignoring include {reference:?}: {err}", self.service);
                        let path = PathBuf::from(&reference);
                        skipped.push(Skipped::new(self.service, Some(path), &err));
                        continue;
                    }
                };

                if candidates.is_empty() {
                    debug!("{}: include {reference:?} matched nothing", self.service);
                }

                for candidate in candidates {
                    for entry in self.collect(&candidate, &mut skipped) {
                        if !visited.insert(entry.real.clone()) {
                            continue;
                        }

                        match self.register(&entry, workspace, manifest) {
                            Ok(()) => queue.push_back(entry),
                            Err(err) => {
                                let path = entry.path.display();
                                if err.is_not_found() {
                                    debug!("{}: skipping {path}: {err}", self.service);
                                } else {
                                    warn!("{}: skipping {path}: {err}", self.service);
                                }
                                skipped.push(Skipped::new(self.service, Some(entry.path), &err));
                            }
                        }
                    }
                }
            }
        }

        skipped
    }

    /// Turns a reference string into concrete snapshot paths: relative
    /// references are anchored at `base`, absolute ones at the snapshot root,
    /// and wildcards are expanded against the snapshot.
    fn candidates(&self, reference: &str, base: &Path) -> Result<Vec<PathBuf>, Error> {
        let joined = if Path::new(reference).is_absolute() {
            PathBuf::from(reference)
        } else {
            base.join(reference)
        };

        let path = snapshot_path(&joined).ok_or(Error::Escape { path: joined })?;

        if pattern::has_wildcards(reference) {
            pattern::expand(self.fs, &path, self.max_depth)
        } else {
            Ok(vec![path])
        }
    }

    /// Resolves a candidate through its symlink. A candidate resolving to a
    /// directory stands for the files directly inside it.
    fn collect(&self, candidate: &Path, skipped: &mut Vec<Skipped>) -> Vec<Entry> {
        let real = match resolve(self.fs, candidate) {
            Ok(real) => real,
            Err(err) => {
                debug!("{}: skipping {}: {err}", self.service, candidate.display());
                skipped.push(Skipped::new(self.service, Some(candidate.to_path_buf()), &err));
                return Vec::new();
            }
        };

        let is_dir = self.fs.metadata(&real).is_ok_and(|m| m.is_dir());
        if !is_dir {
            return vec![Entry {
                path: candidate.to_path_buf(),
                real,
            }];
        }

        let mut names: Vec<String> = match self.fs.read_dir(&real) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_ok_and(|t| !t.is_dir()))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                let err = Error::io(&real, e);
                skipped.push(Skipped::new(self.service, Some(real), &err));
                return Vec::new();
            }
        };
        names.sort();

        names
            .into_iter()
            .filter_map(|name| {
                let path = candidate.join(&name);
                match resolve(self.fs, &path) {
                    Ok(real) => Some(Entry { path, real }),
                    Err(err) => {
                        skipped.push(Skipped::new(self.service, Some(path), &err));
                        None
                    }
                }
            })
            .collect()
    }

    /// Copies an entry into the workspace, mirroring the path it was referenced
    /// by, and appends its descriptor to the manifest.
    fn register(
        &self,
        entry: &Entry,
        workspace: &mut Workspace,
        manifest: &mut Manifest,
    ) -> Result<(), Error> {
        let mut bundle_path = relative_path(&entry.path).to_path_buf();
        if workspace.is_occupied(&bundle_path) {
            // Another file was already stored under this name; fall back to
            // where the data actually lives, which is unique per visited entry.
            bundle_path = relative_path(&entry.real).to_path_buf();
        }

        workspace.copy_into(self.fs, &entry.real, &bundle_path, self.max_file_size)?;

        let default_name = bundle_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("{}: including {}", self.service, entry.path.display());
        manifest
            .complimentary_file_list
            .push(ConfigFile::at(&bundle_path, &default_name, self.config_file_type));

        Ok(())
    }
}
