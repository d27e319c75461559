//! # Rust library interface to KVM
//!
//! `kvm-machine` is a userspace interface to the hardware virtualization
//! features of the Linux kernel provided by KVM. It is a thin layer that owns
//! the kernel objects a hypervisor is made of (the system handle, VM and vCPU
//! descriptors, and the `kvm_run` structure each vCPU shares with the kernel
//! through mmap) and decodes each vCPU exit into a typed value. It does not
//! emulate devices or instructions: exits are classified and handed back to
//! the caller.
//!
//! The constants and structs required for the KVM API are defined in Rust,
//! under `include`, rather than generated from the C headers. Request codes
//! are built with the `vmm-sys-util` ioctl macros.
//!
//! Ownership follows the kernel objects:
//!
//! * [`Handle`] owns one descriptor.
//! * [`MappedRunRegion`] owns the `kvm_run` mapping of one vCPU.
//! * [`VirtualCpu`] owns a vCPU descriptor and its mapping, and runs it.
//! * [`VirtualMachine`] owns the VM descriptor and its memory slot table.
//! * [`Machine`] keeps a [`Hypervisor`] backend behind a lock, plus one
//!   `VirtualCpu` per logical core.

#[macro_use]
extern crate vmm_sys_util;

pub mod error;
pub mod exit;
pub mod handle;
pub mod hypervisor;
mod include;
pub mod machine;
pub mod regs;
pub mod run;
pub mod sync;
pub mod system;
pub mod vcpu;
pub mod vm;

#[cfg(test)]
mod test_utils;

pub use crate::error::{Error, Result};
pub use crate::exit::{ExitReason, MachineExit};
pub use crate::handle::Handle;
pub use crate::hypervisor::{Hypervisor, KvmHypervisor};
pub use crate::machine::Machine;
pub use crate::run::MappedRunRegion;
pub use crate::sync::{GuardedValue, SharedGuardedValue};
pub use crate::system::Kvm;
pub use crate::vcpu::VirtualCpu;
pub use crate::vm::{MemoryRegion, VirtualMachine};
