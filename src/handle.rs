//! Owned OS descriptors.

use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use libc::{close, fcntl, F_DUPFD_CLOEXEC};

use crate::error::{Error, Result};

/// Sole owner of one file descriptor, or of nothing.
///
/// A `Handle` closes its descriptor when dropped. It can hold the invalid
/// sentinel, in which case it is inert: dropping it closes nothing.
/// Handing ownership elsewhere goes through [`Handle::release`] or
/// [`IntoRawFd`], both of which leave no descriptor behind to double-close.
#[derive(Debug)]
pub struct Handle {
    fd: RawFd,
}

impl Handle {
    /// The value an empty handle holds.
    pub const INVALID: RawFd = -1;

    /// An empty handle that owns nothing.
    pub const fn invalid() -> Handle {
        Handle { fd: Handle::INVALID }
    }

    /// Reports whether this handle currently owns a descriptor.
    pub fn is_valid(&self) -> bool {
        self.fd != Handle::INVALID
    }

    /// Returns the raw descriptor without giving up ownership.
    pub fn get(&self) -> RawFd {
        self.fd
    }

    /// Opens a second, independent descriptor for the same resource.
    ///
    /// The copy is close-on-exec and owned by the returned `Handle`.
    pub fn duplicate(&self) -> Result<Handle> {
        // SAFETY: fcntl does not touch memory; the result is checked below.
        let fd = unsafe { fcntl(self.fd, F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(Error::last_resource("duplicate descriptor", self.fd));
        }
        Ok(Handle { fd })
    }

    /// Gives up ownership of the descriptor without closing it.
    ///
    /// The handle is left empty.
    pub fn release(&mut self) -> RawFd {
        mem::replace(&mut self.fd, Handle::INVALID)
    }

    /// Closes the currently owned descriptor, then adopts `other`'s.
    ///
    /// The old descriptor is fully closed before the new one becomes visible
    /// through this handle.
    pub fn replace_with(&mut self, mut other: Handle) {
        self.close();
        self.fd = other.release();
    }

    fn close(&mut self) {
        let fd = self.release();
        if fd != Handle::INVALID {
            // SAFETY: we owned `fd` and nothing else refers to it any more.
            // Errors from close leave nothing to recover, the fd is gone.
            unsafe { close(fd) };
        }
    }
}

impl Default for Handle {
    fn default() -> Handle {
        Handle::invalid()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl IntoRawFd for Handle {
    fn into_raw_fd(mut self) -> RawFd {
        self.release()
    }
}

impl FromRawFd for Handle {
    /// Adopts `fd`. The caller must own it and must not close it afterwards.
    unsafe fn from_raw_fd(fd: RawFd) -> Handle {
        Handle { fd }
    }
}
