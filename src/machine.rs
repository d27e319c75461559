//! A virtual machine together with its cores.

use tracing::debug;

use crate::error::Result;
use crate::hypervisor::Hypervisor;
use crate::sync::{Guard, GuardedValue};
use crate::vcpu::VirtualCpu;

/// A hypervisor backend behind a lock, plus a fixed set of vCPUs.
///
/// The backend (and through it the VM, its handle and memory slots) may be
/// used from any thread via [`Machine::lock`]. The vCPUs carry no lock of
/// their own: each is meant to be driven by exactly one thread. Use
/// [`Machine::split`] to hand cores to worker threads while keeping the
/// backend reachable.
///
/// ```no_run
/// use kvm_machine::hypervisor::KvmHypervisor;
/// use kvm_machine::machine::Machine;
///
/// let mut machine = Machine::new(KvmHypervisor::new()?, 2)?;
/// let (hypervisor, vcpus) = machine.split();
/// std::thread::scope(|s| {
///     for vcpu in vcpus.iter_mut() {
///         s.spawn(move || {
///             let exit = vcpu.step();
///             let _backend = hypervisor.lock();
///             exit.map(|exit| exit.reason())
///         });
///     }
/// });
/// # Ok::<(), kvm_machine::Error>(())
/// ```
#[derive(Debug)]
pub struct Machine<H> {
    hypervisor: GuardedValue<H>,
    vcpus: Vec<VirtualCpu>,
}

impl<H: Hypervisor> Machine<H> {
    /// Builds a machine with `cores` vCPUs, numbered `0..cores`.
    ///
    /// The set of vCPUs is fixed from here on.
    pub fn new(mut hypervisor: H, cores: u32) -> Result<Machine<H>> {
        let vcpus = (0..cores)
            .map(|index| hypervisor.create_vcpu(index))
            .collect::<Result<Vec<_>>>()?;
        debug!(cores, "machine created");
        Ok(Machine {
            hypervisor: GuardedValue::new(hypervisor),
            vcpus,
        })
    }
}

impl<H> Machine<H> {
    /// Blocks until the backend is free and returns exclusive access to it.
    pub fn lock(&self) -> Guard<'_, H> {
        self.hypervisor.lock()
    }

    /// Number of logical cores.
    pub fn cores(&self) -> usize {
        self.vcpus.len()
    }

    pub fn vcpu(&self, index: usize) -> Option<&VirtualCpu> {
        self.vcpus.get(index)
    }

    pub fn vcpu_mut(&mut self, index: usize) -> Option<&mut VirtualCpu> {
        self.vcpus.get_mut(index)
    }

    pub fn vcpus(&self) -> &[VirtualCpu] {
        &self.vcpus
    }

    /// Borrows the locked backend and the vCPUs separately, so that each
    /// vCPU can be moved onto its own thread.
    pub fn split(&mut self) -> (&GuardedValue<H>, &mut [VirtualCpu]) {
        (&self.hypervisor, &mut self.vcpus)
    }

    pub fn into_parts(self) -> (H, Vec<VirtualCpu>) {
        (self.hypervisor.into_inner(), self.vcpus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::run::MappedRunRegion;
    use crate::test_utils::memfd;
    use crate::vm::MemoryRegion;
    use std::thread;

    const PAGE: usize = 4096;

    // Stands in for KVM: records installed regions and hands out vCPUs
    // backed by memfds.
    #[derive(Debug, Default)]
    struct SimulatedHypervisor {
        regions: Vec<MemoryRegion>,
        created: Vec<u32>,
        fail_at: Option<u32>,
    }

    impl Hypervisor for SimulatedHypervisor {
        unsafe fn install_memory_region(&mut self, region: MemoryRegion) -> Result<()> {
            self.regions.retain(|r| r.slot != region.slot);
            self.regions.push(region);
            Ok(())
        }

        fn create_vcpu(&mut self, index: u32) -> Result<VirtualCpu> {
            if self.fail_at == Some(index) {
                return Err(Error::InvalidArgument {
                    operation: "create vcpu",
                    reason: "simulated failure",
                });
            }
            self.created.push(index);
            let fd = memfd("simulated_vcpu", PAGE);
            let run = MappedRunRegion::create_from_handle(fd.get(), PAGE)?;
            Ok(VirtualCpu::new(index, fd, run))
        }
    }

    fn region(slot: u32, guest_phys_addr: u64) -> MemoryRegion {
        MemoryRegion {
            slot,
            guest_phys_addr,
            size: PAGE as u64,
            host_addr: 0,
        }
    }

    #[test]
    fn test_cores_created_in_order() {
        let machine = Machine::new(SimulatedHypervisor::default(), 4)
            .expect("failed to build machine");
        assert_eq!(machine.cores(), 4);
        for (i, vcpu) in machine.vcpus().iter().enumerate() {
            assert_eq!(vcpu.index(), i as u32);
        }
        assert_eq!(machine.lock().created, vec![0, 1, 2, 3]);
        assert!(machine.vcpu(4).is_none());
    }

    #[test]
    fn test_creation_failure() {
        let hypervisor = SimulatedHypervisor {
            fail_at: Some(2),
            ..Default::default()
        };
        match Machine::new(hypervisor, 4) {
            Err(Error::InvalidArgument { .. }) => (),
            other => panic!("expected failure, got {:?}", other.map(|m| m.cores())),
        }
    }

    #[test]
    fn test_region_slot_replaced() {
        let machine = Machine::new(SimulatedHypervisor::default(), 1)
            .expect("failed to build machine");
        unsafe {
            machine.lock().install_memory_region(region(0, 0)).expect("install failed");
            machine.lock().install_memory_region(region(1, 0x10000)).expect("install failed");
            machine.lock().install_memory_region(region(0, 0x20000)).expect("install failed");
        }

        let hypervisor = machine.lock();
        assert_eq!(hypervisor.regions.len(), 2);
        assert!(hypervisor.regions.contains(&region(0, 0x20000)));
        assert!(hypervisor.regions.contains(&region(1, 0x10000)));
    }

    #[test]
    fn test_concurrent_backend_access() {
        const CORES: u32 = 4;

        let mut machine = Machine::new(SimulatedHypervisor::default(), CORES)
            .expect("failed to build machine");
        let (hypervisor, vcpus) = machine.split();
        thread::scope(|s| {
            for vcpu in vcpus.iter_mut() {
                s.spawn(move || {
                    let slot = vcpu.index();
                    // Each core installs its own slot while others do the same.
                    unsafe {
                        hypervisor
                            .lock()
                            .install_memory_region(region(slot, slot as u64 * 0x10000))
                            .expect("install failed");
                    }
                    // A memfd is not a vCPU, so running fails; what matters
                    // is that each thread drives only its own core.
                    assert!(vcpu.step().is_err());
                });
            }
        });

        let (hypervisor, vcpus) = machine.into_parts();
        assert_eq!(hypervisor.regions.len(), CORES as usize);
        assert_eq!(vcpus.len(), CORES as usize);
    }

    #[test]
    fn test_vcpu_mut() {
        let mut machine = Machine::new(SimulatedHypervisor::default(), 2)
            .expect("failed to build machine");
        let vcpu = machine.vcpu_mut(1).expect("missing vcpu");
        assert_eq!(vcpu.index(), 1);
        assert!(vcpu.get_registers().is_err());
        assert!(machine.vcpu_mut(2).is_none());
    }
}
