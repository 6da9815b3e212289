// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::env;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

pub type Ino = u64;

/// The procfs mount to read processes from: `HOST_PROC` when set (the host's
/// `/proc` mounted into the container this tool runs in), `/proc` otherwise.
pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| match env::var_os("HOST_PROC") {
        Some(path) => path.into(),
        None => "/proc".into(),
    })
}

/// A process command line, as found in `/proc/<pid>/cmdline` or assembled
/// from an image's entrypoint and command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmdline {
    cmdline: String,
    separator: char,
}

impl Cmdline {
    pub fn new(mut cmdline: String) -> Self {
        // A process that rewrote its command line can leave trailing null
        // bytes behind.
        let trim_len = cmdline.trim_end_matches('\0').len();
        cmdline.truncate(trim_len);

        // Rewritten command lines (nginx: master process ..., postgres: ...)
        // are often packed into one space-separated string.
        let mut args = cmdline.split_terminator('\0');
        let separator = if let (Some(first), None) = (args.next(), args.next())
            && first.contains(' ')
        {
            ' '
        } else {
            '\0'
        };

        Cmdline { cmdline, separator }
    }

    pub fn read(proc_root: &Path, pid: i32) -> io::Result<Self> {
        let path = proc_root.join(pid.to_string()).join("cmdline");
        let bytes = fs::read(path)?;
        Ok(Self::new(String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn args(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.cmdline.split_terminator(self.separator)
    }

    /// The arguments joined with single spaces, which is what process
    /// patterns are matched against.
    pub fn joined(&self) -> String {
        self.args().collect::<Vec<_>>().join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.cmdline.is_empty()
    }
}

impl From<&str> for Cmdline {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<&[&str]> for Cmdline {
    fn from(value: &[&str]) -> Self {
        Self::new(value.join("\0"))
    }
}

impl From<Vec<String>> for Cmdline {
    fn from(value: Vec<String>) -> Self {
        Self::new(value.join("\0"))
    }
}

/// Creates a `Cmdline` from a list of arguments, joined with null bytes the
/// way the kernel exposes them.
///
/// ```skip
/// let nginx = cmdline!["nginx", "-c", "/etc/nginx/custom.conf"];
/// assert_eq!(nginx.joined(), "nginx -c /etc/nginx/custom.conf");
/// ```
#[macro_export]
macro_rules! cmdline {
    () => {
        $crate::procfs::Cmdline::new(String::new())
    };
    ($($arg:expr),* $(,)?) => { $crate::procfs::Cmdline::from(&[$($arg),*][..]) };
}

/// Lists the numeric entries of a proc root, in ascending order.
pub fn pids(proc_root: &Path) -> io::Result<Vec<i32>> {
    let mut pids: Vec<i32> = fs::read_dir(proc_root)?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

pub fn pid_ns_ino(proc_root: &Path, pid: i32) -> io::Result<Ino> {
    let path = proc_root.join(pid.to_string()).join("ns/pid");
    Ok(fs::metadata(path)?.ino())
}

pub fn cwd(proc_root: &Path, pid: i32) -> io::Result<PathBuf> {
    fs::read_link(proc_root.join(pid.to_string()).join("cwd"))
}
