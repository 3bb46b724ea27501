//! The per-frame receive callback, entered once per matched frame with
//! `(frame_buffer, job)`.
//!
//! Seven steps: loop suppression, a liveness check on the destination,
//! buffer acquisition (clone for an empty mod chain, deep copy otherwise),
//! marking, mutation, timestamp handling, and send. Every exit path is
//! accounted for by exactly one counter increment or none at all — a
//! suppressed loop frame is not counted either way, since it returns before
//! either counter is touched.

use crate::frame::{Frame, GatewayOrigin};
use crate::job::Job;
use crate::substrate::Substrate;

/// Applies `job` to `incoming`, forwarding a result on `job.dst` if the
/// frame isn't suppressed or dropped. Never allocates beyond the single
/// buffer acquisition in step 3, never blocks, and tolerates concurrent
/// re-entry for the same `job` on other cores (counters are per-job
/// atomics).
pub fn receive(job: &Job, substrate: &dyn Substrate, incoming: &Frame) {
    // 1. Loop suppression: a frame this gateway already stamped is never
    // re-processed, and is not counted either way.
    if incoming.origin.is_some() {
        trace!("job {}: suppressing already-routed frame", job.id);
        return;
    }

    // 2. Destination liveness.
    if !substrate.interface_is_up(job.dst) {
        job.inc_dropped();
        return;
    }

    // 3. Buffer acquisition: zero-copy clone when nothing will mutate the
    // frame, otherwise a deep, non-aliasing copy.
    let acquire = if job.spec.mod_chain.is_empty() {
        substrate.clone_shared(incoming)
    } else {
        substrate.deep_copy(incoming)
    };
    let mut frame: Frame = match acquire {
        Ok(f) => f,
        Err(_) => {
            job.inc_dropped();
            return;
        }
    };

    // 4. Mark as routed by this gateway.
    frame.origin = Some(GatewayOrigin);

    // 5. Mutate.
    job.spec.mod_chain.apply(&mut frame);

    // 6. Timestamp: cleared unless the job asked to preserve it.
    if !job.spec.flags.contains(crate::job::JobFlags::SRC_TSTAMP) {
        frame.timestamp_ns = 0;
    }

    // 7. Send.
    let echo = job.spec.flags.contains(crate::job::JobFlags::ECHO);
    match substrate.send(job.dst, &frame, echo) {
        Ok(()) => job.inc_handled(),
        Err(_) => job.inc_dropped(),
    }
}
