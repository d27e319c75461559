//! Error types for KVM operations.

use std::os::unix::io::RawFd;

use thiserror::Error;
use vmm_sys_util::errno;

/// Result type alias for KVM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the handle, mapping, and ioctl wrappers.
///
/// Nothing in this crate retries a failed call. The OS error is captured
/// right after the failing syscall, together with the operation name and the
/// descriptor it was issued against.
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor that must be open was the invalid sentinel.
    #[error("invalid argument to {operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: &'static str,
    },

    /// A syscall or ioctl against an existing resource failed.
    #[error("{operation} failed on fd {fd}: {source}")]
    System {
        operation: &'static str,
        fd: RawFd,
        #[source]
        source: errno::Error,
    },

    /// Creating or duplicating an OS resource failed.
    #[error("failed to create {resource} from fd {fd}: {source}")]
    Resource {
        resource: &'static str,
        fd: RawFd,
        #[source]
        source: errno::Error,
    },

    /// Opening a device node failed.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: errno::Error,
    },

    /// `/dev/kvm` reported an API version this crate does not speak.
    #[error("unsupported KVM API version {0}")]
    UnsupportedApiVersion(i32),

    /// A required KVM extension is missing.
    #[error("KVM extension {0} is not available")]
    MissingExtension(u32),
}

impl Error {
    /// Builds a `System` error from the calling thread's current errno.
    pub(crate) fn last_system(operation: &'static str, fd: RawFd) -> Error {
        Error::System {
            operation,
            fd,
            source: errno::Error::last(),
        }
    }

    /// Builds a `Resource` error from the calling thread's current errno.
    pub(crate) fn last_resource(resource: &'static str, fd: RawFd) -> Error {
        Error::Resource {
            resource,
            fd,
            source: errno::Error::last(),
        }
    }

    /// Returns the OS error number behind a `System`, `Resource` or `Open`
    /// error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::System { source, .. }
            | Error::Resource { source, .. }
            | Error::Open { source, .. } => Some(source.errno()),
            _ => None,
        }
    }
}
