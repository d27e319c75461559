//! vCPU register accessors.
//!
//! Each call is a single `KVM_GET_*`/`KVM_SET_*` ioctl on a vCPU descriptor.
//! Nothing is cached: the snapshot returned is a copy, and a set call takes
//! effect on the next run of that vCPU.

use std::os::unix::io::RawFd;

use vmm_sys_util::ioctl::{ioctl_with_mut_ref, ioctl_with_ref};

use crate::error::{Error, Result};
use crate::include::kvm::{KVM_GET_REGS, KVM_GET_SREGS, KVM_SET_REGS, KVM_SET_SREGS};

pub use crate::include::kvm::{kvm_dtable, kvm_regs, kvm_segment, kvm_sregs};

/// Reads the general purpose registers, instruction pointer and flags.
pub fn get_registers(fd: RawFd) -> Result<kvm_regs> {
    // Struct is allocated (and owned) by Rust, but modified by the kernel
    let mut regs = kvm_regs::default();
    // SAFETY: the kernel writes at most size_of::<kvm_regs>() bytes into
    // `regs`, and the return value is checked.
    let result = unsafe { ioctl_with_mut_ref(&fd, KVM_GET_REGS(), &mut regs) };
    if result != 0 {
        return Err(Error::last_system("KVM_GET_REGS", fd));
    }
    Ok(regs)
}

/// Writes the general purpose registers, instruction pointer and flags.
pub fn set_registers(fd: RawFd, regs: &kvm_regs) -> Result<()> {
    // SAFETY: the kernel only reads `regs`.
    let result = unsafe { ioctl_with_ref(&fd, KVM_SET_REGS(), regs) };
    if result != 0 {
        return Err(Error::last_system("KVM_SET_REGS", fd));
    }
    Ok(())
}

/// Reads the segment, descriptor table and control registers.
pub fn get_segment_registers(fd: RawFd) -> Result<kvm_sregs> {
    let mut sregs = kvm_sregs::default();
    // SAFETY: the kernel writes at most size_of::<kvm_sregs>() bytes into
    // `sregs`, and the return value is checked.
    let result = unsafe { ioctl_with_mut_ref(&fd, KVM_GET_SREGS(), &mut sregs) };
    if result != 0 {
        return Err(Error::last_system("KVM_GET_SREGS", fd));
    }
    Ok(sregs)
}

/// Writes the segment, descriptor table and control registers.
pub fn set_segment_registers(fd: RawFd, sregs: &kvm_sregs) -> Result<()> {
    // SAFETY: the kernel only reads `sregs`.
    let result = unsafe { ioctl_with_ref(&fd, KVM_SET_SREGS(), sregs) };
    if result != 0 {
        return Err(Error::last_system("KVM_SET_SREGS", fd));
    }
    Ok(())
}
