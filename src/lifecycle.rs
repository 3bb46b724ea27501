//! Reaction to interface lifecycle events.
//!
//! A kernel module doing the equivalent of this would register a
//! `notifier_block` on the network device notifier chain and evict every job
//! touching a device on `NETDEV_UNREGISTER`. The event source itself (udev,
//! a netlink notifier socket, a test driver) is a host concern; this module
//! only knows what to do once told an interface is gone.

use crate::registry::Registry;
use crate::substrate::{InterfaceKind, Substrate};

/// An interface lifecycle event as delivered to [`LifecycleHook::handle`].
/// Only `Gone` triggers eviction; every other event is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceEvent {
    Gone { idx: u32 },
    Other,
}

/// Evicts every job touching an interface once that interface disappears.
/// Holds no state of its own beyond the registry and substrate it was
/// built with; a host wires this into its own event source.
pub struct LifecycleHook<'a> {
    registry: &'a Registry,
    substrate: &'a dyn Substrate,
}

impl<'a> LifecycleHook<'a> {
    pub fn new(registry: &'a Registry, substrate: &'a dyn Substrate) -> Self {
        LifecycleHook { registry, substrate }
    }

    /// Handles one lifecycle event. A `Gone` event is skipped only if the
    /// substrate can still resolve the interface and reports it as not
    /// CAN-typed; an interface the substrate no longer knows about at all
    /// (the common case, since the interface is usually already gone by
    /// the time the event is processed) is evicted unconditionally, since a
    /// job can only ever have been created against a CAN interface in the
    /// first place.
    pub fn handle(&self, event: InterfaceEvent) {
        let InterfaceEvent::Gone { idx } = event else {
            return;
        };
        if let Some(kind) = self.substrate.interface_type(crate::substrate::InterfaceHandle(idx)) {
            if kind != InterfaceKind::Can {
                return;
            }
        }
        trace!("interface {} gone, evicting its jobs", idx);
        self.registry.remove_by_interface(self.substrate, idx);
    }
}
