//! The frame I/O substrate, described only by the interface the core needs.
//! A host binary implements [`Substrate`] over whatever real network/bus
//! stack it has (netdevice notifiers, raw sockets, a simulator, ...);
//! `cangw` never assumes a concrete transport.

use crate::frame::Frame;

/// An interface index, as carried on the wire by `SRC_IF`/`DST_IF` and
/// compared by [`crate::registry::Registry::remove_by_interface`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceHandle(pub u32);

/// Link-layer type of an interface, as consumed by job creation (rejected
/// as "no such device" on a mismatch) and by
/// [`crate::lifecycle::LifecycleHook`] (which only reacts to interfaces of
/// the relevant type).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    Can,
    Other,
}

/// Outcome of handing a frame to the substrate for transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// The substrate could not deliver the frame (link down, no buffers,
    /// etc). Counted as a drop by the hot path.
    Failed,
}

/// Outcome of acquiring a frame buffer to forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfMemory;

/// The external interface the core calls into: filter (de)registration on
/// the receive side, buffer acquisition, transmission, and interface
/// queries. Implementations must be `Send + Sync`: the hot path may be
/// entered concurrently on multiple cores.
pub trait Substrate: Send + Sync {
    /// Registers interest in frames matching `(id, mask)` arriving on
    /// `iface`; `job_id` identifies which job this registration belongs to
    /// so a later `unregister_filter` call can find it again.
    fn register_filter(&self, iface: InterfaceHandle, id: u32, mask: u32, job_id: u64) -> Result<(), OutOfMemory>;

    fn unregister_filter(&self, iface: InterfaceHandle, job_id: u64);

    /// Acquires a shared-reference clone of `frame` (zero-copy where
    /// possible) for jobs with an empty mod chain. Fails fast, never
    /// blocks: the hot path has no suspension points.
    fn clone_shared(&self, frame: &Frame) -> Result<Frame, OutOfMemory>;

    /// Acquires a deep, non-aliasing copy of `frame` for jobs that will
    /// mutate it.
    fn deep_copy(&self, frame: &Frame) -> Result<Frame, OutOfMemory>;

    /// Hands `frame` to the substrate for transmission on `iface`. `echo`
    /// requests the substrate echo the frame back to the source if it
    /// would otherwise do so (the `ECHO` job flag).
    fn send(&self, iface: InterfaceHandle, frame: &Frame, echo: bool) -> Result<(), SendError>;

    fn interface_is_up(&self, iface: InterfaceHandle) -> bool;

    fn interface_type(&self, iface: InterfaceHandle) -> Option<InterfaceKind>;
}

/// An in-memory `Substrate` for tests and doc examples, gated behind
/// `test-helpers` the way `fuel-vm` gates its own test scaffolding.
#[cfg(any(test, feature = "test-helpers"))]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    struct IfaceState {
        up: bool,
        kind: Option<InterfaceKind>,
    }

    /// Records every frame handed to `send` together with the interface it
    /// was sent on, and lets a test flip an interface's up/down state or
    /// link-layer type on the fly.
    pub struct FakeSubstrate {
        ifaces: Mutex<HashMap<u32, IfaceState>>,
        sent: Mutex<Vec<(InterfaceHandle, Frame)>>,
        fail_send: Mutex<bool>,
        fail_alloc: Mutex<bool>,
        registrations: Mutex<HashMap<u64, InterfaceHandle>>,
    }

    impl FakeSubstrate {
        pub fn new() -> Self {
            FakeSubstrate {
                ifaces: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                fail_send: Mutex::new(false),
                fail_alloc: Mutex::new(false),
                registrations: Mutex::new(HashMap::new()),
            }
        }

        pub fn set_interface(&self, idx: u32, up: bool, kind: InterfaceKind) {
            self.ifaces.lock().unwrap().insert(idx, IfaceState { up, kind: Some(kind) });
        }

        pub fn remove_interface(&self, idx: u32) {
            self.ifaces.lock().unwrap().remove(&idx);
        }

        pub fn set_fail_send(&self, fail: bool) {
            *self.fail_send.lock().unwrap() = fail;
        }

        pub fn set_fail_alloc(&self, fail: bool) {
            *self.fail_alloc.lock().unwrap() = fail;
        }

        pub fn sent_frames(&self) -> Vec<(InterfaceHandle, Frame)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn registered_jobs(&self) -> usize {
            self.registrations.lock().unwrap().len()
        }
    }

    impl Default for FakeSubstrate {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Substrate for FakeSubstrate {
        fn register_filter(&self, iface: InterfaceHandle, _id: u32, _mask: u32, job_id: u64) -> Result<(), OutOfMemory> {
            self.registrations.lock().unwrap().insert(job_id, iface);
            Ok(())
        }

        fn unregister_filter(&self, _iface: InterfaceHandle, job_id: u64) {
            self.registrations.lock().unwrap().remove(&job_id);
        }

        fn clone_shared(&self, frame: &Frame) -> Result<Frame, OutOfMemory> {
            if *self.fail_alloc.lock().unwrap() {
                return Err(OutOfMemory);
            }
            Ok(*frame)
        }

        fn deep_copy(&self, frame: &Frame) -> Result<Frame, OutOfMemory> {
            self.clone_shared(frame)
        }

        fn send(&self, iface: InterfaceHandle, frame: &Frame, _echo: bool) -> Result<(), SendError> {
            if *self.fail_send.lock().unwrap() {
                return Err(SendError::Failed);
            }
            self.sent.lock().unwrap().push((iface, *frame));
            Ok(())
        }

        fn interface_is_up(&self, iface: InterfaceHandle) -> bool {
            self.ifaces.lock().unwrap().get(&iface.0).map(|s| s.up).unwrap_or(false)
        }

        fn interface_type(&self, iface: InterfaceHandle) -> Option<InterfaceKind> {
            self.ifaces.lock().unwrap().get(&iface.0).and_then(|s| s.kind)
        }
    }
}
