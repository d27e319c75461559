//! Mapping of the per-vCPU `kvm_run` structure.

use std::mem;
use std::os::unix::io::RawFd;
use std::ptr::{self, null_mut};

use libc::{c_void, mmap, munmap, MAP_FAILED, MAP_SHARED, PROT_READ, PROT_WRITE};

use crate::error::{Error, Result};
use crate::handle::Handle;

/// Owns a shared, read/write memory mapping of a descriptor.
///
/// The mapping is either fully valid (non-null base and non-zero length) or
/// empty. It is a separate OS resource from the descriptor it was created
/// from, so the descriptor may be closed while the mapping lives on.
/// Dropping a valid region unmaps it.
#[derive(Debug)]
pub struct MappedRunRegion {
    addr: *mut u8,
    len: usize,
}

// SAFETY: the region exclusively owns its mapping; moving it to another
// thread moves that ownership. It is deliberately not `Sync`: the kernel and
// a single driving thread are the only parties meant to touch it.
unsafe impl Send for MappedRunRegion {}

impl MappedRunRegion {
    /// An empty region that maps nothing.
    pub const fn empty() -> MappedRunRegion {
        MappedRunRegion {
            addr: null_mut(),
            len: 0,
        }
    }

    /// Maps `len` bytes of `fd`, starting at offset 0, shared with the
    /// resource behind it.
    ///
    /// Fails with `InvalidArgument` for the invalid sentinel and with `System`
    /// when `mmap` itself fails, which includes `len == 0`.
    pub fn create_from_handle(fd: RawFd, len: usize) -> Result<MappedRunRegion> {
        if fd == Handle::INVALID {
            return Err(Error::InvalidArgument {
                operation: "map run region",
                reason: "descriptor is the invalid sentinel",
            });
        }

        // SAFETY: a fresh mapping chosen by the kernel cannot alias any Rust
        // object; the result is checked before use.
        let addr = unsafe {
            mmap(
                null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == MAP_FAILED {
            return Err(Error::last_system("mmap run region", fd));
        }

        Ok(MappedRunRegion {
            addr: addr as *mut u8,
            len,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.addr.is_null()
    }

    /// Base of the mapping. Dereferencing it is undefined when the region
    /// is not valid.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn unmap(&mut self) {
        let addr = mem::replace(&mut self.addr, ptr::null_mut());
        let len = mem::replace(&mut self.len, 0);
        if !addr.is_null() {
            // SAFETY: `addr`/`len` describe a mapping this region created and
            // still owned. Failure would mean they were corrupted.
            unsafe { munmap(addr as *mut c_void, len) };
        }
    }
}

impl Default for MappedRunRegion {
    fn default() -> MappedRunRegion {
        MappedRunRegion::empty()
    }
}

impl Drop for MappedRunRegion {
    fn drop(&mut self) {
        self.unmap();
    }
}
