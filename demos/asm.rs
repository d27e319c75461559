// A minimal example running x86 assembly language.

// This example is based on https://lwn.net/Articles/658511/.

extern crate kvm_machine;

use kvm_machine::*;

use std::ptr::null_mut;
use std::slice;

use tracing_subscriber::EnvFilter;

const BSP: usize = 0;
const MEM_SIZE: usize = 0x1000 * 16;
const GUEST_ADDR: usize = 0x1000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let asm_code: &[u8] = &[
        0xba, 0xf8, 0x03, /* mov $0x3f8, %dx */
        0x00, 0xd8,       /* add %bl, %al */
        0x04, b'0',       /* add $'0', %al */
        0xee,             /* out %al, %dx */
        0xb0, 0x0a,       /* mov $'\n', %al */
        0xee,             /* out %al, %dx */
        0xf4,             /* hlt */
    ];

    let host_addr: *mut u8 = unsafe {
        libc::mmap(
            null_mut(),
            MEM_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_ANONYMOUS | libc::MAP_SHARED | libc::MAP_NORESERVE,
            -1,
            0,
        ) as *mut u8
    };
    assert_ne!(host_addr as *mut libc::c_void, libc::MAP_FAILED, "failed to map guest memory");

    let hypervisor = KvmHypervisor::new().expect("failed to create KVM hypervisor");
    println!("Opened {} and created a VM", system::KVM_DEVICE_PATH);

    let mut machine = Machine::new(hypervisor, 1).expect("failed to create machine");
    println!("Created {} vCPU", machine.cores());

    let region = MemoryRegion {
        slot: 0,
        guest_phys_addr: 0,
        size: MEM_SIZE as u64,
        host_addr: host_addr as u64,
    };
    unsafe {
        machine.lock().install_memory_region(region).expect("failed to set guest memory");
    }

    // Write the x86 assembly code in the guest memory.
    unsafe {
        let slice = slice::from_raw_parts_mut(host_addr.add(GUEST_ADDR), asm_code.len());
        slice.copy_from_slice(asm_code);
    }

    let vcpu = machine.vcpu_mut(BSP).expect("missing boot vCPU");

    // Setup registers
    let mut sregs = vcpu.get_segment_registers().expect("failed to get segment registers");
    sregs.cs.base = 0;
    sregs.cs.selector = 0;
    vcpu.set_segment_registers(&sregs).expect("failed to set CS register");

    let regs = regs::kvm_regs {
        rip: GUEST_ADDR as u64,
        rax: 2,
        rbx: 3,
        rflags: 0x2,
        ..Default::default()
    };
    vcpu.set_registers(&regs).expect("failed to set registers");

    let rip = vcpu.get_registers().expect("failed to get registers").rip;
    println!("RIP reg is {:#x}", rip);

    loop {
        match vcpu.step().expect("failed to run vCPU") {
            MachineExit::IoOut { port, data, .. } => {
                println!("exit for IoOut, port={:#x}, data={:?}", port, data);
            }
            MachineExit::Halt => {
                println!("exit for Halt");
                break;
            }
            MachineExit::InternalError { suberror, data } => {
                println!("exit for InternalError, suberror={}, data={:?}", suberror, data);
                break;
            }
            exit => println!("Unhandled exit {:?}", exit),
        }
    }

    drop(machine);
    unsafe { libc::munmap(host_addr as *mut libc::c_void, MEM_SIZE) };
    println!("Destroyed the VM");
}
