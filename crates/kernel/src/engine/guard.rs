//! Re-entrancy protection for a single filter pass.
//!
//! The host may ask for its plugin list again while the filter is still
//! working out the answer (a plugin lookup during extraction, for example).
//! The nested call must see the unfiltered list, so each host request owns
//! a [`ReentrancyToken`] and the engine holds a [`PassGuard`] on it for the
//! duration of one pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Marks whether a filter pass is in progress for one host request.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyToken {
    in_pass: Arc<AtomicBool>,
}

impl ReentrancyToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a pass. `None` if one is already running.
    pub fn enter(&self) -> Option<PassGuard> {
        self.in_pass
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                in_pass: Arc::clone(&self.in_pass),
            })
    }

    /// Whether a pass currently holds this token.
    pub fn is_held(&self) -> bool {
        self.in_pass.load(Ordering::Acquire)
    }
}

/// Held for the duration of one pass; releases the token on drop.
#[derive(Debug)]
pub struct PassGuard {
    in_pass: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.in_pass.store(false, Ordering::Release);
    }
}
