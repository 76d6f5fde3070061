//! Signal relay and the `trap` table.
//!
//! A signal handler cannot safely do anything beyond setting a flag, so
//! the real work — pushing a trap body onto the input stack, unwinding an
//! interactive read — happens at safe points in the evaluator's main loop.
//! Grounded on the pending-signal relay pattern from the `dss` shell
//! example: a byte-sized "what fired" flag plus a boolean fast path for
//! `SIGINT`, both set by `signal_hook::flag::register`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;

/// Sentinel meaning "no signal pending" in [`SignalRelay::pending`].
const NONE: u8 = 0;

/// Shared signal-delivery state: flags a real Unix signal handler can set
/// without allocating or calling anything non-async-signal-safe.
pub struct SignalRelay {
    /// The last caught signal's number, or [`NONE`]. Cleared by
    /// [`SignalRelay::take_pending`].
    pending: Arc<AtomicU8>,
    /// Fast-path flag for `SIGINT`, checked at more places (read loops,
    /// `waitfor`) than the general `pending` dispatch.
    intr: Arc<AtomicBool>,
    registered: Vec<Signal>,
}

impl SignalRelay {
    /// Build a relay with nothing registered yet.
    #[must_use]
    pub fn new() -> Self {
        SignalRelay {
            pending: Arc::new(AtomicU8::new(NONE)),
            intr: Arc::new(AtomicBool::new(false)),
            registered: Vec::new(),
        }
    }

    /// Register the relay to catch `sig`. Idempotent. Fails only if the
    /// underlying `sigaction` call fails (e.g. attempting to catch
    /// `SIGKILL`).
    ///
    /// # Errors
    ///
    /// Returns the underlying `signal_hook` registration error.
    pub fn catch(&mut self, sig: Signal) -> Result<(), std::io::Error> {
        if self.registered.contains(&sig) {
            return Ok(());
        }
        let pending = Arc::clone(&self.pending);
        let signum = sig as i32;
        // SAFETY: the registered closure only performs async-signal-safe
        // atomic stores, per signal_hook::flag's documented contract.
        unsafe {
            signal_hook::low_level::register(signum, move || {
                pending.store(signum as u8, Ordering::SeqCst);
            })?;
        }
        if sig == Signal::SIGINT {
            signal_hook::flag::register(signum, Arc::clone(&self.intr))?;
        }
        self.registered.push(sig);
        Ok(())
    }

    /// Reset `sig` to its default disposition (`trap - N`).
    ///
    /// # Errors
    ///
    /// Returns the underlying `sigaction` error.
    pub fn default_action(&mut self, sig: Signal) -> Result<(), nix::Error> {
        use nix::sys::signal::{sigaction, SigAction, SigHandler, SaFlags, SigSet};
        unsafe {
            sigaction(sig, &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty()))?;
        }
        self.registered.retain(|s| *s != sig);
        Ok(())
    }

    /// Ignore `sig` entirely (used for `SIGINT`/`SIGQUIT` in a
    /// non-interactive shell unless trapped, matching the original).
    ///
    /// # Errors
    ///
    /// Returns the underlying `sigaction` error.
    pub fn ignore(&mut self, sig: Signal) -> Result<(), nix::Error> {
        use nix::sys::signal::{sigaction, SigAction, SigHandler, SaFlags, SigSet};
        unsafe {
            sigaction(sig, &SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()))?;
        }
        Ok(())
    }

    /// Take and clear the pending signal, if any.
    pub fn take_pending(&self) -> Option<Signal> {
        let raw = self.pending.swap(NONE, Ordering::SeqCst);
        if raw == NONE {
            None
        } else {
            Signal::try_from(i32::from(raw)).ok()
        }
    }

    /// `true` if `SIGINT` has fired since the last [`SignalRelay::clear_intr`].
    #[must_use]
    pub fn intr(&self) -> bool {
        self.intr.load(Ordering::SeqCst)
    }

    /// Clear the `SIGINT` fast-path flag (consumed once acted on).
    pub fn clear_intr(&self) {
        self.intr.store(false, Ordering::SeqCst);
    }
}

impl Default for SignalRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// What a trapped signal (or pseudo-signal `EXIT`, numbered 0) should do.
#[derive(Debug, Clone)]
pub enum TrapAction {
    /// Run this command string when the signal fires.
    Run(String),
    /// `trap - N` — restore the default action.
    Default,
    /// `trap '' N` — ignore the signal entirely.
    Ignore,
}

/// The `trap` table: signal number (0 for `EXIT`) to action. A fresh shell
/// has no entries, meaning "default disposition" for every signal.
#[derive(Debug, Clone, Default)]
pub struct TrapTable {
    actions: HashMap<i32, TrapAction>,
}

impl TrapTable {
    /// An empty trap table.
    #[must_use]
    pub fn new() -> Self {
        TrapTable::default()
    }

    /// Set the action for signal number `n` (0 means `EXIT`).
    pub fn set(&mut self, n: i32, action: TrapAction) {
        self.actions.insert(n, action);
    }

    /// Look up the action for signal number `n`, if any has been set.
    #[must_use]
    pub fn get(&self, n: i32) -> Option<&TrapAction> {
        self.actions.get(&n)
    }

    /// Remove any trap on `n`, restoring default disposition.
    pub fn clear(&mut self, n: i32) {
        self.actions.remove(&n);
    }

    /// Iterate over all configured traps, for the bare `trap` listing form.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &TrapAction)> {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_table_round_trips() {
        let mut t = TrapTable::new();
        t.set(2, TrapAction::Run("echo caught".into()));
        assert!(matches!(t.get(2), Some(TrapAction::Run(s)) if s == "echo caught"));
        t.clear(2);
        assert!(t.get(2).is_none());
    }

    #[test]
    fn relay_starts_with_nothing_pending() {
        let relay = SignalRelay::new();
        assert!(relay.take_pending().is_none());
        assert!(!relay.intr());
    }
}
