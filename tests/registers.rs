extern crate kvm_machine;

use kvm_machine::regs::{kvm_regs, kvm_segment};
use kvm_machine::*;

fn setup_vcpu() -> Option<(VirtualMachine, VirtualCpu)> {
    let kvm = match Kvm::new() {
        Ok(kvm) => kvm,
        Err(e) => {
            eprintln!("skipping, KVM not available: {}", e);
            return None;
        }
    };
    let vm = kvm.create_vm().expect("failed to create VM");
    let vcpu = vm.create_vcpu(0).expect("failed to create vcpu");
    Some((vm, vcpu))
}

#[test]
fn test_general_purpose_registers() {
    let (_vm, vcpu) = match setup_vcpu() {
        Some(pair) => pair,
        None => return,
    };

    let regs = kvm_regs {
        rax: 1100,
        rcx: 1200,
        rdx: 1300,
        rdi: 1400,
        rsi: 1500,
        rsp: 1600,
        rbx: 1700,
        rbp: 1800,
        r8: 1008,
        r9: 1009,
        r10: 1010,
        r11: 1011,
        r12: 1012,
        r13: 1013,
        r14: 1014,
        r15: 1015,
        rip: 0xfff0,
        rflags: 0x2,
    };
    vcpu.set_registers(&regs).expect("failed to set registers");
    let read = vcpu.get_registers().expect("failed to get registers");
    assert_eq!(read, regs);
}

#[test]
fn test_single_register_update() {
    let (_vm, vcpu) = match setup_vcpu() {
        Some(pair) => pair,
        None => return,
    };

    let mut regs = vcpu.get_registers().expect("failed to get registers");
    regs.rax = 0x12345678;
    vcpu.set_registers(&regs).expect("failed to set registers");

    let read = vcpu.get_registers().expect("failed to get registers");
    assert_eq!(read.rax, 0x12345678);
    assert_eq!(read.rip, regs.rip);
}

#[test]
fn test_segment_registers() {
    let (_vm, vcpu) = match setup_vcpu() {
        Some(pair) => pair,
        None => return,
    };

    let mut sregs = vcpu.get_segment_registers().expect("failed to get segment registers");
    sregs.cs.base = 0x1000;
    sregs.cs.selector = 0x100;
    vcpu.set_segment_registers(&sregs).expect("failed to set segment registers");

    let read = vcpu.get_segment_registers().expect("failed to get segment registers");
    assert_eq!(read.cs.base, 0x1000);
    assert_eq!(read.cs.selector, 0x100);
}

#[test]
fn test_data_segment_registers() {
    let (_vm, vcpu) = match setup_vcpu() {
        Some(pair) => pair,
        None => return,
    };

    let mut sregs = vcpu.get_segment_registers().expect("failed to get segment registers");
    let segment = kvm_segment {
        base: 0x2000,
        selector: 0x200,
        ..sregs.ds
    };
    sregs.ds = segment;
    sregs.es = segment;
    vcpu.set_segment_registers(&sregs).expect("failed to set segment registers");

    let read = vcpu.get_segment_registers().expect("failed to get segment registers");
    assert_eq!(read.ds.base, 0x2000);
    assert_eq!(read.ds.selector, 0x200);
    assert_eq!(read.es.base, 0x2000);
    assert_eq!(read.es.selector, 0x200);
}
