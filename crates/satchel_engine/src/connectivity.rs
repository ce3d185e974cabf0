//! Connectivity as an explicit capability.
//!
//! The engine never reads ambient global state to decide whether it is
//! online; callers pass a probe in, which keeps tests deterministic.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the remote store is believed reachable.
///
/// The probe is advisory: a stale `true` just means the next dispatch
/// fails transiently and the intents stay queued.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if connectivity is believed available.
    fn is_online(&self) -> bool;
}

impl<P: ConnectivityProbe + ?Sized> ConnectivityProbe for std::sync::Arc<P> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// A probe that always reports online.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A probe whose state can be flipped at runtime.
///
/// Bind it to the platform's connectivity signal in production; flip it
/// by hand in tests.
#[derive(Debug, Default)]
pub struct SwitchableProbe {
    online: AtomicBool,
}

impl SwitchableProbe {
    /// Creates a probe with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Updates the reported state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for SwitchableProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
