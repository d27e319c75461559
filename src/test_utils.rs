//! Helpers shared by the unit tests.

use std::ffi::CString;
use std::os::unix::io::FromRawFd;

use libc::{ftruncate, memfd_create, off_t, MFD_CLOEXEC};

use crate::handle::Handle;

/// Creates an anonymous memory file of `len` bytes.
pub fn memfd(name: &str, len: usize) -> Handle {
    let c_name = CString::new(name).expect("memfd name contains a nul byte");
    // SAFETY: `c_name` is a valid C string for the duration of the call.
    let fd = unsafe { memfd_create(c_name.as_ptr(), MFD_CLOEXEC) };
    assert!(fd >= 0, "memfd_create failed: {}", std::io::Error::last_os_error());
    // SAFETY: memfd_create returned a fresh descriptor we now own.
    let handle = unsafe { Handle::from_raw_fd(fd) };
    // SAFETY: plain syscall on a descriptor we own.
    let result = unsafe { ftruncate(handle.get(), len as off_t) };
    assert_eq!(result, 0, "ftruncate failed: {}", std::io::Error::last_os_error());
    handle
}
