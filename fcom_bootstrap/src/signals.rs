// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Interrupt Delivery
//!
//! Cooperative cancellation for live operations. The hub keeps one stop
//! flag per registered operation; an interrupt (Ctrl-C) sets every flag,
//! and filters poll their command's flag between records. Teardown then
//! proceeds normally, so every `close` still runs.
//!
//! A second interrupt terminates the process immediately - the escape
//! hatch for a filter stuck in a blocking read.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
// Bootstrap stays dependency-light; a std mutex is all the hub needs.
use std::sync::Mutex;

/// Broadcast hub for cooperative stop flags.
#[derive(Default)]
pub struct SignalHub {
    flags: Mutex<Vec<Arc<AtomicBool>>>,
    raised: AtomicU32,
}

impl SignalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(SignalHub::default())
    }

    /// Registers one operation's stop flag. Flags of completed operations
    /// are pruned on the way.
    pub fn register(&self, flag: Arc<AtomicBool>) {
        let mut flags = match self.flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        flags.retain(|f| Arc::strong_count(f) > 1);
        flags.push(flag);
    }

    /// Sets every registered stop flag. Returns how many interrupts have
    /// been raised so far, this one included.
    pub fn signal_all(&self) -> u32 {
        let flags = match self.flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for f in flags.iter() {
            f.store(true, Ordering::Relaxed);
        }
        self.raised.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True once an interrupt has been observed.
    pub fn interrupted(&self) -> bool {
        self.raised.load(Ordering::SeqCst) > 0
    }
}

/// Installs the process interrupt handler. The first interrupt broadcasts
/// stop flags; the second exits with the conventional 130.
pub fn install_interrupt_handler(hub: Arc<SignalHub>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        let n = hub.signal_all();
        if n == 1 {
            eprintln!("fcom: interrupted, finishing up (press again to abort)");
        } else {
            std::process::exit(130);
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_all_sets_registered_flags() {
        let hub = SignalHub::new();
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        hub.register(Arc::clone(&a));
        hub.register(Arc::clone(&b));
        assert!(!hub.interrupted());
        hub.signal_all();
        assert!(a.load(Ordering::Relaxed));
        assert!(b.load(Ordering::Relaxed));
        assert!(hub.interrupted());
    }

    #[test]
    fn test_dead_flags_are_pruned() {
        let hub = SignalHub::new();
        hub.register(Arc::new(AtomicBool::new(false)));
        // The only strong reference was moved in; registering another flag
        // prunes the dead one.
        let live = Arc::new(AtomicBool::new(false));
        hub.register(Arc::clone(&live));
        let count = hub.flags.lock().unwrap().len();
        assert_eq!(count, 1);
    }
}
