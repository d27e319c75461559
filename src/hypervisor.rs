//! The hypervisor capability a [`Machine`](crate::machine::Machine) is built on.

use tracing::debug;

use crate::error::{Error, Result};
use crate::include::kvm::KVM_CAP_USER_MEMORY;
use crate::system::Kvm;
use crate::vcpu::VirtualCpu;
use crate::vm::{MemoryRegion, VirtualMachine};

/// What a machine needs from a hypervisor backend: somewhere to install
/// guest memory and a way to create vCPUs.
///
/// The backend owns the VM-level state. A `Machine` keeps it behind a lock,
/// so implementations do not need any internal synchronization.
pub trait Hypervisor {
    /// Installs (or replaces) one slot of guest memory.
    ///
    /// # Safety
    ///
    /// The host range in `region` must stay mapped for as long as the guest
    /// can reach it.
    unsafe fn install_memory_region(&mut self, region: MemoryRegion) -> Result<()>;

    /// Creates the vCPU for logical core `index`.
    fn create_vcpu(&mut self, index: u32) -> Result<VirtualCpu>;
}

/// The production backend: one VM on `/dev/kvm`.
#[derive(Debug)]
pub struct KvmHypervisor {
    system: Kvm,
    vm: VirtualMachine,
}

impl KvmHypervisor {
    /// Opens `/dev/kvm` and creates a VM on it.
    pub fn new() -> Result<KvmHypervisor> {
        KvmHypervisor::with_system(Kvm::new()?)
    }

    /// Creates a VM on an already opened KVM system handle.
    pub fn with_system(system: Kvm) -> Result<KvmHypervisor> {
        system.check_api_version()?;
        if system.check_extension(KVM_CAP_USER_MEMORY)? == 0 {
            return Err(Error::MissingExtension(KVM_CAP_USER_MEMORY));
        }
        let vm = system.create_vm()?;
        debug!("KVM hypervisor ready");
        Ok(KvmHypervisor { system, vm })
    }

    pub fn system(&self) -> &Kvm {
        &self.system
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VirtualMachine {
        &mut self.vm
    }
}

impl Hypervisor for KvmHypervisor {
    unsafe fn install_memory_region(&mut self, region: MemoryRegion) -> Result<()> {
        self.vm.install_memory_region(
            region.slot,
            region.guest_phys_addr,
            region.size,
            region.host_addr,
        )
    }

    fn create_vcpu(&mut self, index: u32) -> Result<VirtualCpu> {
        self.vm.create_vcpu(index)
    }
}
