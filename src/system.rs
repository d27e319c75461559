//! The KVM system device: the handle on `/dev/kvm` that answers capability
//! queries and creates virtual machines.

use libc::{open, O_CLOEXEC, O_RDWR};
use std::ffi::CString;
use std::os::raw::c_ulong;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use tracing::debug;
use vmm_sys_util::errno;
use vmm_sys_util::ioctl::{ioctl, ioctl_with_val};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::include::kvm::{
    KVM_API_VERSION, KVM_CAP_MAX_VCPUS, KVM_CAP_NR_MEMSLOTS, KVM_CAP_NR_VCPUS, KVM_CHECK_EXTENSION,
    KVM_CREATE_VM, KVM_GET_API_VERSION, KVM_GET_VCPU_MMAP_SIZE,
};
use crate::vm::VirtualMachine;

/// Where the KVM system device lives.
pub const KVM_DEVICE_PATH: &str = "/dev/kvm";

/// The Kvm module handles KVM system operations. It creates and owns the
/// initial filehandle on `/dev/kvm`.
///
/// ```no_run
/// use kvm_machine::system::*;
/// let kvm = Kvm::new().expect("failed to open /dev/kvm");
/// let vm = kvm.create_vm().expect("failed to create VM");
/// ```
#[derive(Debug)]
pub struct Kvm {
    kvm: Handle,
}

impl Kvm {
    /// Opens a filehandle to `/dev/kvm`.
    pub fn new() -> Result<Kvm> {
        Kvm::open(KVM_DEVICE_PATH)
    }

    /// Opens a filehandle to the KVM device node at `path`.
    pub fn open(path: &str) -> Result<Kvm> {
        let c_path = CString::new(path).map_err(|_| Error::InvalidArgument {
            operation: "open KVM device",
            reason: "path contains a nul byte",
        })?;
        // SAFETY: `c_path` is a valid C string; the result is checked.
        let raw_fd = unsafe { open(c_path.as_ptr(), O_RDWR | O_CLOEXEC) };
        if raw_fd < 0 {
            return Err(Error::Open {
                path: path.to_owned(),
                source: errno::Error::last(),
            });
        }

        // Return value is safe because raw file descriptor result is checked
        // and ownership of the Handle is consumed by the Kvm struct.
        let kvm = unsafe { Handle::from_raw_fd(raw_fd) };
        debug!(path, fd = raw_fd, "opened KVM device");
        Ok(Kvm { kvm })
    }

    /// Returns the KVM API version. Every kernel since 2.6.22 reports 12.
    pub fn api_version(&self) -> Result<i32> {
        // SAFETY: the ioctl takes no argument.
        let result = unsafe { ioctl(&self.kvm, KVM_GET_API_VERSION()) };
        if result < 0 {
            return Err(Error::last_system("KVM_GET_API_VERSION", self.kvm.get()));
        }
        Ok(result)
    }

    /// Fails unless the device speaks the API version this crate is built for.
    pub fn check_api_version(&self) -> Result<()> {
        let version = self.api_version()?;
        if version != KVM_API_VERSION {
            return Err(Error::UnsupportedApiVersion(version));
        }
        Ok(())
    }

    /// Queries an extension. Zero means unsupported; positive values are
    /// extension specific.
    pub fn check_extension(&self, cap: u32) -> Result<i32> {
        // SAFETY: the argument is passed by value; the result is checked.
        let result = unsafe { ioctl_with_val(&self.kvm, KVM_CHECK_EXTENSION(), cap as c_ulong) };
        if result < 0 {
            return Err(Error::last_system("KVM_CHECK_EXTENSION", self.kvm.get()));
        }
        Ok(result)
    }

    /// Recommended number of vCPUs per VM.
    pub fn recommended_vcpus(&self) -> Result<usize> {
        // The kernel documents 4 as the answer when the extension is missing.
        match self.check_extension(KVM_CAP_NR_VCPUS)? {
            0 => Ok(4),
            n => Ok(n as usize),
        }
    }

    /// Upper bound on vCPUs per VM.
    pub fn max_vcpus(&self) -> Result<usize> {
        match self.check_extension(KVM_CAP_MAX_VCPUS)? {
            0 => self.recommended_vcpus(),
            n => Ok(n as usize),
        }
    }

    /// Number of memory slots a VM supports.
    pub fn max_memory_slots(&self) -> Result<usize> {
        Ok(self.check_extension(KVM_CAP_NR_MEMSLOTS)? as usize)
    }

    /// Size of the `kvm_run` mapping on every vCPU descriptor.
    pub fn vcpu_mmap_size(&self) -> Result<usize> {
        // SAFETY: the ioctl takes no argument.
        let result = unsafe { ioctl(&self.kvm, KVM_GET_VCPU_MMAP_SIZE()) };
        if result < 0 {
            return Err(Error::last_system("KVM_GET_VCPU_MMAP_SIZE", self.kvm.get()));
        }
        mmap_size(result, self.kvm.get())
    }

    /// Creates a new virtual machine, and returns a `VirtualMachine` that
    /// owns its filehandle.
    pub fn create_vm(&self) -> Result<VirtualMachine> {
        let run_size = self.vcpu_mmap_size()?;
        // SAFETY: machine type 0 is the default; the result is checked.
        let raw_fd = unsafe { ioctl_with_val(&self.kvm, KVM_CREATE_VM(), 0) };
        if raw_fd < 0 {
            return Err(Error::last_resource("VM", self.kvm.get()));
        }
        // SAFETY: the kernel returned a fresh descriptor that nothing else owns.
        let vm = unsafe { Handle::from_raw_fd(raw_fd) };
        debug!(fd = raw_fd, run_size, "created VM");
        Ok(VirtualMachine::new(vm, run_size))
    }
}

// A zero size succeeds at the ioctl level without setting errno, but nothing
// can be mapped from it.
fn mmap_size(result: i32, fd: RawFd) -> Result<usize> {
    if result == 0 {
        return Err(Error::System {
            operation: "KVM_GET_VCPU_MMAP_SIZE",
            fd,
            source: errno::Error::new(libc::EINVAL),
        });
    }
    Ok(result as usize)
}

impl AsRawFd for Kvm {
    fn as_raw_fd(&self) -> RawFd {
        self.kvm.get()
    }
}
