//! KVM virtual machine operations.

use std::collections::BTreeMap;
use std::os::raw::c_ulong;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use tracing::debug;
use vmm_sys_util::ioctl::{ioctl_with_ref, ioctl_with_val};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::include::kvm::{
    kvm_userspace_memory_region, KVM_CREATE_VCPU, KVM_SET_USER_MEMORY_REGION,
};
use crate::run::MappedRunRegion;
use crate::vcpu::VirtualCpu;

/// One installed slot of guest physical memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub slot: u32,
    pub guest_phys_addr: u64,
    pub size: u64,
    pub host_addr: u64,
}

/// The VirtualMachine module handles KVM virtual machine operations.
/// It owns the filehandle for these operations, and keeps the table of
/// memory slots it has installed.
#[derive(Debug)]
pub struct VirtualMachine {
    vm: Handle,
    run_size: usize,
    regions: BTreeMap<u32, MemoryRegion>,
}

impl VirtualMachine {
    /// Adopts an open VM descriptor. `run_size` is the length of the
    /// `kvm_run` mapping each vCPU gets, as reported by
    /// `KVM_GET_VCPU_MMAP_SIZE`.
    pub fn new(vm: Handle, run_size: usize) -> VirtualMachine {
        VirtualMachine {
            vm,
            run_size,
            regions: BTreeMap::new(),
        }
    }

    /// Maps `size` bytes of host memory at `host_addr` into the guest at
    /// `guest_phys_addr`, in memory slot `slot`.
    ///
    /// Installing into a slot that is already in use replaces it. Overlapping
    /// guest ranges in different slots are rejected by the kernel, not here.
    ///
    /// # Safety
    ///
    /// `[host_addr, host_addr + size)` must be a valid mapping in this
    /// process, and must stay mapped for as long as the guest can reach it
    /// through this slot. The guest writes to it behind Rust's back.
    pub unsafe fn install_memory_region(
        &mut self,
        slot: u32,
        guest_phys_addr: u64,
        size: u64,
        host_addr: u64,
    ) -> Result<()> {
        // Struct is allocated (and owned) by Rust
        let region = kvm_userspace_memory_region {
            slot,
            flags: 0,
            guest_phys_addr,
            memory_size: size,
            userspace_addr: host_addr,
        };
        let result = ioctl_with_ref(&self.vm, KVM_SET_USER_MEMORY_REGION(), &region);
        if result != 0 {
            return Err(Error::last_system("KVM_SET_USER_MEMORY_REGION", self.vm.get()));
        }

        debug!(slot, guest_phys_addr, size, host_addr, "installed memory region");
        self.regions.insert(
            slot,
            MemoryRegion {
                slot,
                guest_phys_addr,
                size,
                host_addr,
            },
        );
        Ok(())
    }

    /// Removes a previously installed slot. The kernel deletes a slot when it
    /// is set to size zero.
    pub fn remove_memory_region(&mut self, slot: u32) -> Result<()> {
        let region = kvm_userspace_memory_region {
            slot,
            ..Default::default()
        };
        // SAFETY: a zero-sized region hands the kernel no host memory.
        let result = unsafe { ioctl_with_ref(&self.vm, KVM_SET_USER_MEMORY_REGION(), &region) };
        if result != 0 {
            return Err(Error::last_system("KVM_SET_USER_MEMORY_REGION", self.vm.get()));
        }

        debug!(slot, "removed memory region");
        self.regions.remove(&slot);
        Ok(())
    }

    pub fn memory_region(&self, slot: u32) -> Option<&MemoryRegion> {
        self.regions.get(&slot)
    }

    /// Installed regions, in slot order.
    pub fn memory_regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.values()
    }

    /// Length of the run mapping given to each new vCPU.
    pub fn run_size(&self) -> usize {
        self.run_size
    }

    /// Opens vCPU `index` and maps its run structure.
    pub fn create_vcpu(&self, index: u32) -> Result<VirtualCpu> {
        // SAFETY: KVM_CREATE_VCPU takes its argument by value; the result is
        // checked before use.
        let raw_fd = unsafe { ioctl_with_val(&self.vm, KVM_CREATE_VCPU(), index as c_ulong) };
        if raw_fd < 0 {
            return Err(Error::last_resource("vcpu", self.vm.get()));
        }
        // SAFETY: the kernel returned a fresh descriptor that nothing else owns.
        let vcpu = unsafe { Handle::from_raw_fd(raw_fd) };
        let run = MappedRunRegion::create_from_handle(vcpu.get(), self.run_size)?;

        debug!(index, fd = raw_fd, run_size = self.run_size, "created vcpu");
        Ok(VirtualCpu::new(index, vcpu, run))
    }
}

impl AsRawFd for VirtualMachine {
    fn as_raw_fd(&self) -> RawFd {
        self.vm.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memfd;

    // A memfd accepts none of the VM ioctls, which is all these tests need.
    fn fake_vm() -> VirtualMachine {
        VirtualMachine::new(memfd("fake_vm", 4096), 4096)
    }

    #[test]
    fn test_starts_empty() {
        let vm = fake_vm();
        assert_eq!(vm.memory_regions().count(), 0);
        assert!(vm.memory_region(0).is_none());
        assert_eq!(vm.run_size(), 4096);
    }

    #[test]
    fn test_failed_install_leaves_table_alone() {
        let mut vm = fake_vm();
        let mut backing = vec![0u8; 4096];
        let err = unsafe {
            vm.install_memory_region(0, 0x1000, backing.len() as u64, backing.as_mut_ptr() as u64)
        }
        .unwrap_err();
        match err {
            Error::System { operation, .. } => assert_eq!(operation, "KVM_SET_USER_MEMORY_REGION"),
            other => panic!("expected system error, got {:?}", other),
        }
        assert!(vm.memory_region(0).is_none());
    }

    #[test]
    fn test_failed_vcpu_creation() {
        let vm = fake_vm();
        match vm.create_vcpu(0) {
            Err(Error::Resource { resource, fd, .. }) => {
                assert_eq!(resource, "vcpu");
                assert_eq!(fd, vm.as_raw_fd());
            }
            other => panic!("expected resource error, got {:?}", other),
        }
    }
}
