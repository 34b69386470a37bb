//! Cancellation shared between a pipeline run and model training.
//!
//! The processing crate re-exports [`CancellationToken`], so one token stops
//! chunked reads, stage transitions and tree construction alike.
//!
//! ```
//! use vista_learning::CancellationToken;
//!
//! let token = CancellationToken::new();
//! assert!(token.check().is_ok());
//!
//! token.cancel();
//! assert!(token.check().is_err());
//! ```

use crate::error::{LearningError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop flag. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop at its next safe point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(LearningError::Cancelled)` once cancelled, for use with `?`
    /// between training steps.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(LearningError::Cancelled);
        }
        Ok(())
    }

    /// Clear the flag so a long-lived token can drive another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
