//! Constants and structs for interfacing with the KVM ioctl interface.
//!
//! These are defined in Rust, but mimic the C constants and structs
//! defined in `linux/kvm.h` and `asm/kvm.h` for x86_64.

#![allow(dead_code)]

use std::os::raw::c_int;

// Identifies ioctl ops for KVM
pub const KVMIO: u32 = 0xAE;

// The only stable API version the kernel has ever reported.
pub const KVM_API_VERSION: c_int = 12;

// ioctls used against the system fd (/dev/kvm)
ioctl_io_nr!(KVM_GET_API_VERSION, KVMIO, 0x00);
ioctl_io_nr!(KVM_CREATE_VM, KVMIO, 0x01);
ioctl_io_nr!(KVM_CHECK_EXTENSION, KVMIO, 0x03);
ioctl_io_nr!(KVM_GET_VCPU_MMAP_SIZE, KVMIO, 0x04);

// ioctls used against a vm fd
ioctl_io_nr!(KVM_CREATE_VCPU, KVMIO, 0x41);
ioctl_iow_nr!(KVM_SET_USER_MEMORY_REGION, KVMIO, 0x46, kvm_userspace_memory_region);

// ioctls used against a vcpu fd
ioctl_io_nr!(KVM_RUN, KVMIO, 0x80);
ioctl_ior_nr!(KVM_GET_REGS, KVMIO, 0x81, kvm_regs);
ioctl_iow_nr!(KVM_SET_REGS, KVMIO, 0x82, kvm_regs);
ioctl_ior_nr!(KVM_GET_SREGS, KVMIO, 0x83, kvm_sregs);
ioctl_iow_nr!(KVM_SET_SREGS, KVMIO, 0x84, kvm_sregs);

// Extensions queried through KVM_CHECK_EXTENSION
pub const KVM_CAP_USER_MEMORY: u32 = 3;
pub const KVM_CAP_NR_VCPUS: u32 = 9;
pub const KVM_CAP_NR_MEMSLOTS: u32 = 10;
pub const KVM_CAP_MAX_VCPUS: u32 = 66;

// Exit reasons reported in kvm_run.exit_reason
pub const KVM_EXIT_IO: u32 = 2;
pub const KVM_EXIT_HLT: u32 = 5;
pub const KVM_EXIT_INTERNAL_ERROR: u32 = 17;

// kvm_run.io.direction
pub const KVM_EXIT_IO_IN: u8 = 0;
pub const KVM_EXIT_IO_OUT: u8 = 1;

// Capacity of kvm_run.internal.data
pub const KVM_INTERNAL_ERROR_MAX_DATA: usize = 16;

// For KVM_SET_USER_MEMORY_REGION
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct kvm_userspace_memory_region {
    pub slot: u32,
    pub flags: u32,
    pub guest_phys_addr: u64,
    pub memory_size: u64,    // bytes
    pub userspace_addr: u64, // start of the userspace allocated memory
}

// For KVM_GET_REGS and KVM_SET_REGS
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct kvm_regs {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct kvm_segment {
    pub base: u64,
    pub limit: u32,
    pub selector: u16,
    pub type_: u8,
    pub present: u8,
    pub dpl: u8,
    pub db: u8,
    pub s: u8,
    pub l: u8,
    pub g: u8,
    pub avl: u8,
    pub unusable: u8,
    pub padding: u8,
}

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct kvm_dtable {
    pub base: u64,
    pub limit: u16,
    pub padding: [u16; 3],
}

// Number of interrupt bitmap words for 256 vectors
const KVM_NR_INTERRUPTS: usize = 256;

// For KVM_GET_SREGS and KVM_SET_SREGS
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct kvm_sregs {
    pub cs: kvm_segment,
    pub ds: kvm_segment,
    pub es: kvm_segment,
    pub fs: kvm_segment,
    pub gs: kvm_segment,
    pub ss: kvm_segment,
    pub tr: kvm_segment,
    pub ldt: kvm_segment,
    pub gdt: kvm_dtable,
    pub idt: kvm_dtable,
    pub cr0: u64,
    pub cr2: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub cr8: u64,
    pub efer: u64,
    pub apic_base: u64,
    pub interrupt_bitmap: [u64; (KVM_NR_INTERRUPTS + 63) / 64],
}

// KVM_EXIT_IO
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default)]
pub struct kvm_run_io {
    pub direction: u8,
    pub size: u8, // bytes
    pub port: u16,
    pub count: u32,
    pub data_offset: u64, // relative to kvm_run start
}

// KVM_EXIT_INTERNAL_ERROR
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Default)]
pub struct kvm_run_internal {
    pub suberror: u32,
    pub ndata: u32,
    pub data: [u64; KVM_INTERNAL_ERROR_MAX_DATA],
}

// The anonymous exit union inside kvm_run. Only the members this crate
// decodes are named, the padding fixes the size the kernel reserves.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone)]
pub union kvm_run_exit {
    pub io: kvm_run_io,
    pub internal: kvm_run_internal,
    pub padding: [u8; 256],
}

// The leading part of the structure the kernel shares through mmap on a
// vcpu fd. The kernel structure continues with the synced register area,
// which is never touched here, so the mapping is always larger than this.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone)]
pub struct kvm_run {
    // in
    pub request_interrupt_window: u8,
    pub immediate_exit: u8,
    pub padding1: [u8; 6],

    // out
    pub exit_reason: u32,
    pub ready_for_interrupt_injection: u8,
    pub if_flag: u8,
    pub flags: u16,

    // in (pre_kvm_run), out (post_kvm_run)
    pub cr8: u64,
    pub apic_base: u64,

    pub exit: kvm_run_exit,
}
