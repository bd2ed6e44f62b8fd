//! Cooperative time bounds and cancellation for slow steps.
//!
//! Long-running loops (STFT frames, projection iterations) call
//! [`Deadline::check`] at regular points; once the budget is spent or the
//! cancel flag is raised the step is abandoned with a typed error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Deadline {
    /// A deadline that never fires.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Expire `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(budget),
            cancel: None,
        }
    }

    /// Build from an optional budget, as read from configuration.
    #[must_use]
    pub fn from_budget(budget: Option<Duration>) -> Self {
        budget.map_or_else(Self::none, Self::after)
    }

    /// Attach a shared cancel flag.
    #[must_use]
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Remaining time, if bounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail if the step should be abandoned.
    pub fn check(&self, step: &'static str) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Cancelled { step });
            }
        }
        if let Some(at) = self.expires_at {
            if Instant::now() >= at {
                return Err(Error::Timeout { step });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fires() {
        assert!(Deadline::none().check("extract").is_ok());
        assert!(Deadline::none().remaining().is_none());
    }

    #[test]
    fn test_zero_budget_times_out() {
        let deadline = Deadline::after(Duration::ZERO);
        let err = deadline.check("projection").unwrap_err();
        assert!(matches!(err, Error::Timeout { step: "projection" }));
    }

    #[test]
    fn test_cancel_flag_wins() {
        let flag = Arc::new(AtomicBool::new(false));
        let deadline = Deadline::after(Duration::from_secs(60)).with_cancel(Arc::clone(&flag));
        assert!(deadline.check("ingest").is_ok());

        flag.store(true, Ordering::Relaxed);
        let err = deadline.check("ingest").unwrap_err();
        assert!(matches!(err, Error::Cancelled { step: "ingest" }));
    }
}
