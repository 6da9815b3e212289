// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

//! Locates configuration files of known services inside a filesystem
//! snapshot and bundles each discovered instance, together with every file it
//! includes, into its own workspace.

pub mod config;
pub mod container;
pub mod descriptor;
mod errors;
pub mod finder;
pub mod fs;
mod includes;
pub mod manifest;
mod pattern;
pub mod procfs;
pub mod registry;
mod report;
pub mod resolve;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the public API
pub use container::{ContainerHandle, ProcessInfo, ProcfsContainer, StaticContainer};
pub use descriptor::{RelativeTo, ServiceDescriptor};
pub use errors::Error;
pub use finder::{DescriptorFinder, Finder, FinderOptions};
pub use fs::SnapshotFs;
pub use includes::{IncludeResolver, IncludeRule};
pub use manifest::{ConfigFile, DiscoveredInstance, MANIFEST_VERSION, Manifest};
pub use registry::FinderRegistry;
pub use report::{DiscoveryReport, Skipped};
pub use workspace::{Workspace, Workspaces};
