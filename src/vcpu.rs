//! KVM virtual CPU operations.

use std::os::unix::io::{AsRawFd, RawFd};

use tracing::trace;
use vmm_sys_util::ioctl::ioctl;

use crate::error::{Error, Result};
use crate::exit::MachineExit;
use crate::handle::Handle;
use crate::include::kvm::KVM_RUN;
use crate::regs::{self, kvm_regs, kvm_sregs};
use crate::run::MappedRunRegion;

/// The VirtualCpu module handles operations on one vCPU. It owns the vCPU
/// filehandle and the mapping of its `kvm_run` structure.
///
/// A `VirtualCpu` can be moved to another thread but not shared between
/// threads: one thread drives one core.
#[derive(Debug)]
pub struct VirtualCpu {
    index: u32,
    vcpu: Handle,
    run: MappedRunRegion,
}

impl VirtualCpu {
    /// Adopts an open vCPU descriptor and the mapping of its run structure.
    pub fn new(index: u32, vcpu: Handle, run: MappedRunRegion) -> VirtualCpu {
        VirtualCpu { index, vcpu, run }
    }

    /// The logical core number this vCPU was created with.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn get_registers(&self) -> Result<kvm_regs> {
        regs::get_registers(self.vcpu.get())
    }

    pub fn set_registers(&self, regs: &kvm_regs) -> Result<()> {
        regs::set_registers(self.vcpu.get(), regs)
    }

    pub fn get_segment_registers(&self) -> Result<kvm_sregs> {
        regs::get_segment_registers(self.vcpu.get())
    }

    pub fn set_segment_registers(&self, sregs: &kvm_sregs) -> Result<()> {
        regs::set_segment_registers(self.vcpu.get(), sregs)
    }

    /// Runs the vCPU until it exits, and returns the exit reason.
    ///
    /// Blocks the calling thread for as long as the guest runs; there is no
    /// timeout. The returned exit borrows the run region, so it has to be
    /// dropped before the next call.
    pub fn step(&mut self) -> Result<MachineExit<'_>> {
        // SAFETY: KVM_RUN takes no argument and only touches the run
        // structure, which stays mapped for as long as `self` lives.
        let result = unsafe { ioctl(&self.vcpu, KVM_RUN()) };
        if result != 0 {
            return Err(Error::last_system("KVM_RUN", self.vcpu.get()));
        }

        let exit = MachineExit::decode(&mut self.run);
        trace!(vcpu = self.index, reason = ?exit.reason(), "vcpu exit");
        Ok(exit)
    }
}

impl AsRawFd for VirtualCpu {
    fn as_raw_fd(&self) -> RawFd {
        self.vcpu.get()
    }
}
