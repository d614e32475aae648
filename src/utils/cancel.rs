// src/utils/cancel.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Cancelled;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can serve another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// `Err(Cancelled)` once `cancel` has been called on any clone.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
