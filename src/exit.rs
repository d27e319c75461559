//! Classification of vCPU exits.
//!
//! After `KVM_RUN` returns, the reason the vCPU stopped and the payload that
//! goes with it sit in the mapped `kvm_run` structure. [`MachineExit::decode`]
//! reads them out into a closed set of variants. Decoding never fails: any
//! reason outside that set, or any payload that does not fit inside the
//! mapping, becomes [`MachineExit::Unsupported`].

use std::mem::size_of;
use std::ptr::{self, addr_of};
use std::slice;

use tracing::warn;

use crate::include::kvm::{
    kvm_run, KVM_EXIT_HLT, KVM_EXIT_INTERNAL_ERROR, KVM_EXIT_IO, KVM_EXIT_IO_IN, KVM_EXIT_IO_OUT,
    KVM_INTERNAL_ERROR_MAX_DATA,
};
use crate::run::MappedRunRegion;

/// Fieldless view of a [`MachineExit`], handy for comparisons and logging.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExitReason {
    Unsupported,
    Halt,
    IoIn,
    IoOut,
    InternalError,
}

/// Reasons for vCPU exits.
///
/// The I/O variants borrow the data area the kernel placed inside the run
/// region, so a `MachineExit` cannot outlive the region it was decoded from,
/// and the region cannot be run again while one is alive.
#[derive(Debug, Default)]
pub enum MachineExit<'a> {
    /// An exit this crate does not classify. Also the state before anything
    /// has been decoded.
    #[default]
    Unsupported,
    /// The guest executed `hlt`.
    Halt,
    /// The guest executed an `in` instruction.
    ///
    /// `data` should be filled in before the vCPU runs again; the kernel
    /// copies it into the guest on the next `KVM_RUN`.
    IoIn {
        port: u16,
        /// Bytes per element: 1, 2 or 4.
        size: u8,
        count: u32,
        data: &'a mut [u8],
    },
    /// The guest executed an `out` instruction with the given data.
    IoOut {
        port: u16,
        size: u8,
        count: u32,
        data: &'a [u8],
    },
    /// KVM could not handle an exit internally.
    InternalError {
        suberror: u32,
        /// At most `ndata` words, never more than the kernel array holds.
        data: &'a [u64],
    },
}

impl<'a> MachineExit<'a> {
    /// Decodes the last exit recorded in `region`.
    ///
    /// `region` must map a `kvm_run` structure (or something laid out like
    /// one); an empty or too short region decodes to `Unsupported`.
    pub fn decode(region: &'a mut MappedRunRegion) -> MachineExit<'a> {
        if !region.is_valid() || region.len() < size_of::<kvm_run>() {
            return MachineExit::Unsupported;
        }
        let base = region.as_ptr();
        let len = region.len();
        let run = base as *const kvm_run;

        // Header fields are read by value so that no reference into the
        // header is held while a data view into the same mapping exists.
        // SAFETY: the region is valid, page aligned, and at least as long as
        // `kvm_run`.
        let exit_reason = unsafe { ptr::read(addr_of!((*run).exit_reason)) };

        match exit_reason {
            KVM_EXIT_HLT => MachineExit::Halt,
            KVM_EXIT_IO => {
                // SAFETY: the exit reason tells us which union member is live.
                let io = unsafe { ptr::read(addr_of!((*run).exit.io)) };
                let data_len = io.size as usize * io.count as usize;
                let start = io.data_offset as usize;
                let in_bounds = start.checked_add(data_len).map_or(false, |end| end <= len);
                if !in_bounds {
                    warn!(
                        port = io.port,
                        offset = io.data_offset,
                        data_len,
                        region_len = len,
                        "I/O exit data lies outside the run region"
                    );
                    return MachineExit::Unsupported;
                }

                // SAFETY: [start, start + data_len) lies inside the mapping,
                // and the exclusive borrow on `region` is the only other way
                // to reach it for 'a.
                let data = unsafe { slice::from_raw_parts_mut(base.add(start), data_len) };
                match io.direction {
                    KVM_EXIT_IO_IN => MachineExit::IoIn {
                        port: io.port,
                        size: io.size,
                        count: io.count,
                        data,
                    },
                    KVM_EXIT_IO_OUT => MachineExit::IoOut {
                        port: io.port,
                        size: io.size,
                        count: io.count,
                        data,
                    },
                    _ => MachineExit::Unsupported,
                }
            }
            KVM_EXIT_INTERNAL_ERROR => {
                // SAFETY: the exit reason tells us which union member is live.
                let (suberror, reported) = unsafe {
                    (
                        ptr::read(addr_of!((*run).exit.internal.suberror)),
                        ptr::read(addr_of!((*run).exit.internal.ndata)),
                    )
                };
                let ndata = (reported as usize).min(KVM_INTERNAL_ERROR_MAX_DATA);
                if reported as usize > KVM_INTERNAL_ERROR_MAX_DATA {
                    warn!(
                        suberror,
                        ndata = reported,
                        "internal error reports more data than the run region holds"
                    );
                }
                // SAFETY: `ndata` words fit in the kernel array, which lies
                // inside the mapping borrowed for 'a.
                let data = unsafe {
                    slice::from_raw_parts(addr_of!((*run).exit.internal.data) as *const u64, ndata)
                };
                MachineExit::InternalError { suberror, data }
            }
            _ => MachineExit::Unsupported,
        }
    }

    pub fn reason(&self) -> ExitReason {
        match self {
            MachineExit::Unsupported => ExitReason::Unsupported,
            MachineExit::Halt => ExitReason::Halt,
            MachineExit::IoIn { .. } => ExitReason::IoIn,
            MachineExit::IoOut { .. } => ExitReason::IoOut,
            MachineExit::InternalError { .. } => ExitReason::InternalError,
        }
    }
}
