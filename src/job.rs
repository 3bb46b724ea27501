//! Canonical job description ([`JobSpec`]) and the runtime job instance
//! ([`Job`]) the registry and hot path operate on.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::frame::Filter;
use crate::modchain::ModChain;
use crate::substrate::InterfaceHandle;

bitflags! {
    /// Flags recognized on a [`JobSpec`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JobFlags: u16 {
        /// Preserve the source timestamp instead of clearing it.
        const SRC_TSTAMP = 0b01;
        /// Allow the frame to be echoed back to the source interface if the
        /// substrate would otherwise do so.
        const ECHO = 0b10;
    }
}

/// Immutable, by-value description of a gateway job. Two `JobSpec`s are
/// equal iff every field is equal after canonicalization — which, per the
/// note on [`ModChain`], this representation gives for free via `derive`.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    pub flags: JobFlags,
    pub filter: Filter,
    pub src_idx: u32,
    pub dst_idx: u32,
    pub mod_chain: ModChain,
}

impl JobSpec {
    /// The `(src_idx=0, dst_idx=0)` sentinel meaning "all jobs" on a `DEL`
    /// request, rejected outright on an `ADD` request.
    pub fn is_remove_all_sentinel(&self) -> bool {
        self.src_idx == 0 && self.dst_idx == 0
    }
}

/// A live job bound to resolved interface handles, with single-writer
/// statistics counters the enumeration path reads with relaxed loads; a
/// torn read of a 32-bit counter mid-increment is an acceptable, documented
/// possibility rather than a bug.
#[derive(Debug)]
pub struct Job {
    /// Identity used to correlate this job with its filter registration on
    /// the substrate (`Substrate::register_filter`/`unregister_filter`),
    /// standing in for the source's raw `gwj` pointer passed as `job_ref`.
    pub id: u64,
    pub spec: JobSpec,
    pub src: InterfaceHandle,
    pub dst: InterfaceHandle,
    handled: AtomicU32,
    dropped: AtomicU32,
}

impl PartialEq for Job {
    /// Jobs are compared by identity (`id`), matching the correlation key
    /// used to bind a job to its substrate filter registration.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Job {
    pub fn new(id: u64, spec: JobSpec, src: InterfaceHandle, dst: InterfaceHandle) -> Self {
        Job { id, spec, src, dst, handled: AtomicU32::new(0), dropped: AtomicU32::new(0) }
    }

    /// Only the hot path for this job calls this; single-writer relaxed
    /// increment.
    pub(crate) fn inc_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handled(&self) -> u32 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether this job touches the given interface, on either side.
    pub fn touches(&self, idx: u32) -> bool {
        self.src.0 == idx || self.dst.0 == idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modchain::ModChain;

    fn empty_spec(src: u32, dst: u32) -> JobSpec {
        JobSpec {
            flags: JobFlags::empty(),
            filter: Filter::MATCH_ALL,
            src_idx: src,
            dst_idx: dst,
            mod_chain: ModChain::build(vec![], None, None).unwrap(),
        }
    }

    #[test]
    fn remove_all_sentinel() {
        assert!(empty_spec(0, 0).is_remove_all_sentinel());
        assert!(!empty_spec(1, 0).is_remove_all_sentinel());
    }

    #[test]
    fn counters_start_at_zero_and_increment() {
        let job = Job::new(1, empty_spec(1, 2), InterfaceHandle(1), InterfaceHandle(2));
        assert_eq!(job.handled(), 0);
        assert_eq!(job.dropped(), 0);
        job.inc_handled();
        job.inc_handled();
        job.inc_dropped();
        assert_eq!(job.handled(), 2);
        assert_eq!(job.dropped(), 1);
    }

    #[test]
    fn touches_either_interface() {
        let job = Job::new(1, empty_spec(1, 2), InterfaceHandle(1), InterfaceHandle(2));
        assert!(job.touches(1));
        assert!(job.touches(2));
        assert!(!job.touches(3));
    }
}
