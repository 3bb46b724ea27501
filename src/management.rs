//! Wiring the wire codec to the registry and substrate for the three
//! management operations a host's transport exposes: `ADD`, `DEL`, `LIST`.
//!
//! This module owns no state of its own; it is thin orchestration between
//! the wire parser and the job table, the same shape a kernel module's
//! create/remove/dump handlers would take between attribute parsing and a
//! job hlist.

use crate::codec::{self, DelRequest};
use crate::error::GwError;
use crate::job::Job;
use crate::registry::Registry;
use crate::substrate::{InterfaceHandle, InterfaceKind, Substrate};
use std::sync::Arc;

fn resolve_can_interface(substrate: &dyn Substrate, idx: u32) -> Result<InterfaceHandle, GwError> {
    let handle = InterfaceHandle(idx);
    match substrate.interface_type(handle) {
        Some(InterfaceKind::Can) => Ok(handle),
        _ => Err(GwError::NoDev),
    }
}

/// Parses an `ADD` request and installs the resulting job, after resolving
/// both interfaces to CAN-typed handles the substrate currently knows about.
/// An interface index that doesn't resolve, or resolves to the wrong
/// link-layer type, is rejected as "no such device".
pub fn handle_add(registry: &Registry, substrate: &dyn Substrate, bytes: &[u8]) -> Result<Arc<Job>, GwError> {
    let parsed = codec::parse_add_request(bytes)?;
    let src = resolve_can_interface(substrate, parsed.spec.src_idx)?;
    let dst = resolve_can_interface(substrate, parsed.spec.dst_idx)?;
    registry.add(substrate, parsed.spec, src, dst)
}

/// Parses a `DEL` request and applies it: the `(0, 0)` sentinel removes
/// every job, anything else removes the first byte-equal job.
pub fn handle_del(registry: &Registry, substrate: &dyn Substrate, bytes: &[u8]) -> Result<(), GwError> {
    match codec::parse_del_request(bytes)? {
        DelRequest::All => {
            registry.remove_all(substrate);
            Ok(())
        }
        DelRequest::Match(spec) => registry.remove_first(substrate, &spec),
    }
}

/// Serializes one paginated `LIST` batch. A fetched batch that doesn't
/// fully fit in `max_bytes` is truncated at the entry boundary, and the
/// returned cursor resumes at the first entry left out rather than at
/// `Registry::snapshot`'s own batch boundary, so no job is ever skipped.
/// `MsgTooLarge` is returned only when a single entry can't fit in
/// `max_bytes` on its own.
pub fn handle_list(
    registry: &Registry,
    cursor: usize,
    batch_size: usize,
    max_bytes: usize,
) -> Result<(Vec<u8>, Option<usize>), GwError> {
    let (jobs, next_cursor) = registry.snapshot(cursor, batch_size);
    let mut out = Vec::new();
    let mut written = 0;
    for job in &jobs {
        let entry = codec::serialize_job(job);
        if entry.len() > max_bytes {
            return Err(GwError::MsgTooLarge);
        }
        if out.len() + entry.len() > max_bytes {
            // Truncated partway through this batch: resume at the first
            // entry that didn't fit, not at the batch's own boundary.
            return Ok((out, Some(cursor + written)));
        }
        out.extend_from_slice(&entry);
        written += 1;
    }
    Ok((out, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FAMILY_CAN, GWTYPE_CAN_CAN};
    use crate::substrate::fake::FakeSubstrate;

    fn write_attr(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
        buf.push(tag);
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(payload);
    }

    fn add_bytes(src: u32, dst: u32) -> Vec<u8> {
        let mut out = vec![FAMILY_CAN, GWTYPE_CAN_CAN, 0, 0];
        write_attr(&mut out, 8, &src.to_be_bytes());
        write_attr(&mut out, 9, &dst.to_be_bytes());
        out
    }

    #[test]
    fn add_resolves_can_interfaces_and_installs_job() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn add_rejects_non_can_interface() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Other);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        assert_eq!(handle_add(&reg, &sub, &add_bytes(1, 2)), Err(GwError::NoDev));
    }

    #[test]
    fn add_rejects_unresolvable_interface() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        let reg = Registry::new();
        assert_eq!(handle_add(&reg, &sub, &add_bytes(1, 2)), Err(GwError::NoDev));
    }

    #[test]
    fn del_sentinel_removes_all() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        handle_del(&reg, &sub, &add_bytes(0, 0)).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn list_paginates_and_reports_cursor() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        let (batch, cursor) = handle_list(&reg, 0, 1, 4096).unwrap();
        assert!(!batch.is_empty());
        assert_eq!(cursor, Some(1));
    }

    #[test]
    fn list_truncated_mid_batch_resumes_at_the_dropped_entry() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();

        // Both jobs serialize to 18 bytes each (header + SRC_IF + DST_IF,
        // no filter/mod chain/counters to add anything non-default); a
        // budget of 18 fits the first entry but not the second, within a
        // single fetched batch of both jobs.
        let one_entry = codec::serialize_job(&reg.snapshot(0, 1).0[0]).len();
        let (batch, cursor) = handle_list(&reg, 0, 2, one_entry).unwrap();
        assert_eq!(batch.len(), one_entry);
        assert_eq!(cursor, Some(1));

        let (second_batch, second_cursor) = handle_list(&reg, cursor.unwrap(), 2, one_entry).unwrap();
        assert_eq!(second_batch.len(), one_entry);
        assert_eq!(second_cursor, None);
    }

    #[test]
    fn list_entry_too_large_for_budget_is_msg_too_large() {
        let sub = FakeSubstrate::new();
        sub.set_interface(1, true, InterfaceKind::Can);
        sub.set_interface(2, true, InterfaceKind::Can);
        let reg = Registry::new();
        handle_add(&reg, &sub, &add_bytes(1, 2)).unwrap();
        assert_eq!(handle_list(&reg, 0, 10, 1), Err(GwError::MsgTooLarge));
    }
}
