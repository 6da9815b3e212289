// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::errors::Error;
use crate::procfs::{self, Cmdline};

/// A process seen inside a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub cmdline: Cmdline,
    /// Working directory as seen from inside the container, used to anchor
    /// relative configuration paths.
    pub cwd: Option<PathBuf>,
}

impl ProcessInfo {
    pub fn new(cmdline: Cmdline) -> Self {
        Self { cmdline, cwd: None }
    }
}

/// A running (or runnable) container: a process listing plus the host path
/// of its root filesystem.
pub trait ContainerHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Host path of the container's root filesystem.
    fn root(&self) -> &Path;

    /// May block; callers run it under a timeout.
    fn processes(&self) -> Result<Vec<ProcessInfo>, Error>;
}

/// A container described by a fixed set of processes, typically the
/// entrypoint of an extracted image.
#[derive(Debug, Clone)]
pub struct StaticContainer {
    id: String,
    root: PathBuf,
    processes: Vec<ProcessInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Config", default)]
    config: Option<ContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Entrypoint", default)]
    entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd", default)]
    cmd: Option<Vec<String>>,
    #[serde(rename = "WorkingDir", default)]
    working_dir: Option<String>,
}

impl StaticContainer {
    pub fn new(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        processes: Vec<ProcessInfo>,
    ) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            processes,
        }
    }

    /// Builds a container from `docker inspect`-style JSON (either a single
    /// object or a one-element array). The process is `Entrypoint` followed
    /// by `Cmd`.
    pub fn from_image_config(
        root: impl Into<PathBuf>,
        json: &str,
    ) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let value = match value {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        let image: ImageConfig = serde_json::from_value(value)?;
        let config = image.config.unwrap_or_default();

        let args: Vec<String> = config
            .entrypoint
            .into_iter()
            .flatten()
            .chain(config.cmd.into_iter().flatten())
            .collect();

        let processes = if args.is_empty() {
            Vec::new()
        } else {
            vec![ProcessInfo {
                cmdline: Cmdline::from(args),
                cwd: config
                    .working_dir
                    .filter(|dir| !dir.is_empty())
                    .map(PathBuf::from),
            }]
        };

        Ok(Self::new(
            image.id.unwrap_or_else(|| "image".to_string()),
            root,
            processes,
        ))
    }
}

impl ContainerHandle for StaticContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>, Error> {
        Ok(self.processes.clone())
    }
}

/// The container holding a given host process, seen through procfs: every
/// process sharing its PID namespace, and `/proc/<pid>/root` as the
/// filesystem.
#[derive(Debug, Clone)]
pub struct ProcfsContainer {
    id: String,
    pid: i32,
    proc_root: PathBuf,
    root: PathBuf,
}

impl ProcfsContainer {
    pub fn new(pid: i32) -> Self {
        Self::with_proc_root(procfs::root_path(), pid)
    }

    pub fn with_proc_root(proc_root: &Path, pid: i32) -> Self {
        Self {
            id: format!("pid-{pid}"),
            pid,
            proc_root: proc_root.to_path_buf(),
            root: proc_root.join(pid.to_string()).join("root"),
        }
    }
}

impl ContainerHandle for ProcfsContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>, Error> {
        let ns = procfs::pid_ns_ino(&self.proc_root, self.pid)
            .map_err(|e| Error::io(self.proc_root.join(self.pid.to_string()), e))?;
        let pids = procfs::pids(&self.proc_root).map_err(|e| Error::io(&self.proc_root, e))?;

        let mut processes = Vec::new();
        for pid in pids {
            // Processes exit all the time; anything unreadable is ignored.
            match procfs::pid_ns_ino(&self.proc_root, pid) {
                Ok(ino) if ino == ns => {}
                _ => continue,
            }
            let cmdline = match Cmdline::read(&self.proc_root, pid) {
                Ok(cmdline) if !cmdline.is_empty() => cmdline,
                Ok(_) => continue,
                Err(e) => {
                    debug!("{}: cannot read cmdline of {pid}: {e}", self.id);
                    continue;
                }
            };
            processes.push(ProcessInfo {
                cmdline,
                cwd: procfs::cwd(&self.proc_root, pid).ok(),
            });
        }

        Ok(processes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cmdline;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_image_config_entrypoint_and_cmd() {
        let json = r#"[{
            "Id": "sha256:abc",
            "Config": {
                "Entrypoint": ["/docker-entrypoint.sh"],
                "Cmd": ["nginx", "-c", "/opt/nginx/custom.conf"],
                "WorkingDir": "/srv"
            }
        }]"#;

        let container = StaticContainer::from_image_config("/snapshot", json).unwrap();
        assert_eq!(container.id(), "sha256:abc");
        assert_eq!(container.root(), Path::new("/snapshot"));

        let processes = container.processes().unwrap();
        assert_eq!(processes.len(), 1);
        let process = processes.first().unwrap();
        assert_eq!(
            process.cmdline.joined(),
            "/docker-entrypoint.sh nginx -c /opt/nginx/custom.conf"
        );
        assert_eq!(process.cwd, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_image_config_without_command() {
        let container =
            StaticContainer::from_image_config("/snapshot", r#"{"Config": {"Cmd": null}}"#)
                .unwrap();
        assert!(container.processes().unwrap().is_empty());

        assert!(StaticContainer::from_image_config("/snapshot", "not json").is_err());
    }

    #[test]
    fn test_static_container() {
        let container = StaticContainer::new(
            "test",
            "/snapshot",
            vec![ProcessInfo::new(cmdline!["redis-server", "/etc/redis/redis.conf"])],
        );
        assert_eq!(container.processes().unwrap().len(), 1);
    }

    #[test]
    fn test_procfs_container_missing_pid() {
        let proc = TempDir::new().unwrap();
        let container = ProcfsContainer::with_proc_root(proc.path(), 1234);
        assert_eq!(container.root(), proc.path().join("1234/root"));

        let err = container.processes().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_procfs_container_same_namespace() {
        // Every pid directory of the fake proc root has the same ns/pid file,
        // so all of them belong to the container.
        let proc = TempDir::new().unwrap();
        fs::create_dir_all(proc.path().join("shared-ns")).unwrap();
        fs::write(proc.path().join("shared-ns/pid"), "").unwrap();

        let ns = proc.path().join("shared-ns");
        for (pid, cmdline) in [
            ("10", "nginx: master process nginx -c conf/nginx.conf"),
            ("11", ""),
            ("12", "sleep\0infinity\0"),
        ] {
            let dir = proc.path().join(pid);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("cmdline"), cmdline).unwrap();
            std::os::unix::fs::symlink(&ns, dir.join("ns")).unwrap();
        }
        std::os::unix::fs::symlink("/etc/nginx", proc.path().join("10/cwd")).unwrap();

        let container = ProcfsContainer::with_proc_root(proc.path(), 10);
        let processes = container.processes().unwrap();

        assert_eq!(processes.len(), 2);
        let nginx = processes.first().unwrap();
        assert_eq!(
            nginx.cmdline.joined(),
            "nginx: master process nginx -c conf/nginx.conf"
        );
        assert_eq!(nginx.cwd, Some(PathBuf::from("/etc/nginx")));
        assert_eq!(processes.get(1).unwrap().cwd, None);
    }
}
