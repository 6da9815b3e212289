// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{} does not exist in the snapshot", path.display())]
    NotFound { path: PathBuf },

    #[error("{} resolves outside of the snapshot root", path.display())]
    Escape { path: PathBuf },

    #[error("could not allocate workspace: {source}")]
    Resource {
        #[source]
        source: io::Error,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("container inspection timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid service descriptor {service}: {reason}")]
    Descriptor { service: String, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// Expected absences: the probed or referenced file is simply not there,
    /// or it points somewhere we refuse to follow.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Escape { .. } | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let err = Error::io(
            "etc/nginx/nginx.conf",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(err.is_not_found());

        let err = Error::io(
            "etc/nginx/nginx.conf",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("etc/nginx/nginx.conf"));
    }

    #[test]
    fn test_timeout_counts_as_absent() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_not_found());
        assert!(
            !Error::Resource {
                source: io::Error::other("no space left")
            }
            .is_not_found()
        );
    }
}
