//! The process-wide concurrent collection of jobs.
//!
//! A kernel module keeping this kind of table on an RCU-protected hlist
//! would have writers hold a spinlock and splice nodes in/out, readers walk
//! it under `rcu_read_lock()`, and a removed node's memory freed only after
//! a grace period expires. This reimplements that idea as a versioned set:
//! the live job list is an `Arc<Vec<Arc<Job>>>` published through an
//! [`arc_swap::ArcSwap`]. Readers call [`Registry::snapshot_live`], which
//! loads one `Arc` and holds it for as long as the hot-path call needs it;
//! a writer that removes a job builds a new `Vec` and swaps it in, but the
//! old `Vec` (and the `Arc<Job>` it held) stays alive until every reader
//! that loaded it has dropped its reference — the same deferred-reclamation
//! property RCU gives, with no explicit grace-period bookkeeping needed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::GwError;
use crate::frame::Frame;
use crate::job::{Job, JobSpec};
use crate::substrate::{InterfaceHandle, Substrate};

type JobList = Arc<Vec<Arc<Job>>>;

/// Concurrent multiset of live jobs with the invariant that for every job
/// in it, a filter is currently registered on `src` that will deliver
/// matching frames to that job.
pub struct Registry {
    live: ArcSwap<Vec<Arc<Job>>>,
    /// Serializes writers; also held while (un)registering filters on the
    /// substrate so the substrate's filter table and the published
    /// snapshot change atomically with respect to other writers.
    write_lock: Mutex<()>,
    next_job_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            live: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Lock-free snapshot of the current live set, for the hot path or
    /// enumeration. Held only for the duration of one call.
    pub fn snapshot_live(&self) -> JobList {
        self.live.load_full()
    }

    /// Installs a job for `spec`, bound to `src`/`dst`, after successfully
    /// registering its filter on `src`. Duplicates are permitted: multiple
    /// identical jobs may coexist.
    pub fn add(
        &self,
        substrate: &dyn Substrate,
        spec: JobSpec,
        src: InterfaceHandle,
        dst: InterfaceHandle,
    ) -> Result<Arc<Job>, GwError> {
        let _guard = self.write_lock.lock();
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let job = Arc::new(Job::new(id, spec, src, dst));

        substrate
            .register_filter(src, job.spec.filter.id, job.spec.filter.mask, job.id)
            .map_err(|_| GwError::NoMem)?;

        let mut next = (**self.live.load()).clone();
        next.push(Arc::clone(&job));
        self.live.store(Arc::new(next));
        Ok(job)
    }

    /// Removes the first job (in insertion order) whose spec is byte-equal
    /// to `spec`.
    pub fn remove_first(&self, substrate: &dyn Substrate, spec: &JobSpec) -> Result<(), GwError> {
        let _guard = self.write_lock.lock();
        let current = self.live.load();
        let Some(pos) = current.iter().position(|j| &j.spec == spec) else {
            return Err(GwError::NotFound);
        };
        let removed = &current[pos];
        substrate.unregister_filter(removed.src, removed.id);

        let mut next = Vec::with_capacity(current.len() - 1);
        next.extend(current.iter().enumerate().filter(|&(i, _)| i != pos).map(|(_, j)| Arc::clone(j)));
        self.live.store(Arc::new(next));
        Ok(())
    }

    /// Drains every job, unregistering each one's filter.
    pub fn remove_all(&self, substrate: &dyn Substrate) {
        let _guard = self.write_lock.lock();
        let current = self.live.load();
        for job in current.iter() {
            substrate.unregister_filter(job.src, job.id);
        }
        self.live.store(Arc::new(Vec::new()));
    }

    /// Removes every job whose `src` or `dst` is `idx`, reacting to an
    /// interface disappearing.
    pub fn remove_by_interface(&self, substrate: &dyn Substrate, idx: u32) {
        let _guard = self.write_lock.lock();
        let current = self.live.load();
        let mut next = Vec::with_capacity(current.len());
        for job in current.iter() {
            if job.touches(idx) {
                substrate.unregister_filter(job.src, job.id);
            } else {
                next.push(Arc::clone(job));
            }
        }
        self.live.store(Arc::new(next));
    }

    /// Enumerates jobs in batches without holding the write lock across the
    /// whole table. `cursor` is the index to resume from; the returned
    /// cursor is `None` once the snapshot taken at call time is exhausted.
    /// A job present for the full duration of a caller's paged enumeration
    /// is reported exactly once; jobs added or removed mid-enumeration may
    /// or may not appear.
    pub fn snapshot(&self, cursor: usize, batch_size: usize) -> (Vec<Arc<Job>>, Option<usize>) {
        let current = self.live.load_full();
        if cursor >= current.len() {
            return (Vec::new(), None);
        }
        let end = (cursor + batch_size).min(current.len());
        let batch: Vec<Arc<Job>> = current[cursor..end].iter().map(Arc::clone).collect();
        let next_cursor = if end < current.len() { Some(end) } else { None };
        (batch, next_cursor)
    }

    /// Looks up the frame's matching jobs for the hot path. Returns a
    /// snapshot so the caller can iterate without the registry's write
    /// lock ever being involved.
    pub fn matching<'a, 'b, 'c>(
        &'b self,
        snapshot: &'a [Arc<Job>],
        frame: &'c Frame,
    ) -> impl Iterator<Item = &'a Arc<Job>> + use<'a, 'b, 'c> {
        snapshot.iter().filter(move |j| j.spec.filter.matches(frame))
    }

    pub fn len(&self) -> usize {
        self.live.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
