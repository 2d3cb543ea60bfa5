//! [`RejectGuard`] – consecutive rejected-sample detector.
//!
//! A control loop that keeps receiving unusable samples (a stalled clock
//! producing `dt <= 0`, a disconnected thermistor reading NaN) is not being
//! controlled at all.  The guard counts consecutive rejections and trips once
//! a threshold is reached, at which point the loop refuses to run until it is
//! re-initialised.
//!
//! # Example
//!
//! ```rust
//! use pidloop_runtime::reject_guard::RejectGuard;
//!
//! let mut guard = RejectGuard::new(3);
//!
//! guard.record_reject();
//! guard.record_reject();
//! assert!(!guard.is_tripped());
//! guard.record_accept(); // a good sample breaks the streak
//!
//! guard.record_reject();
//! guard.record_reject();
//! guard.record_reject();
//! assert!(guard.is_tripped());
//!
//! // Resetting clears the streak and the trip.
//! guard.reset();
//! assert!(!guard.is_tripped());
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// RejectGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive rejected samples and latches once a threshold is hit.
#[derive(Debug, Clone)]
pub struct RejectGuard {
    /// Consecutive rejections that trip the guard; `0` disables tripping.
    threshold: usize,
    consecutive: usize,
    tripped: bool,
}

impl RejectGuard {
    /// Create a new guard.
    ///
    /// `threshold` is the number of consecutive rejections that trips it.
    /// A `threshold` of `0` never trips on its own (only [`trip`][Self::trip]
    /// latches it).
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive: 0,
            tripped: false,
        }
    }

    /// Record a rejected sample and return the current streak length.
    pub fn record_reject(&mut self) -> usize {
        self.consecutive += 1;
        if self.threshold > 0 && self.consecutive >= self.threshold {
            self.tripped = true;
        }
        self.consecutive
    }

    /// Record an accepted sample, ending any streak.  Does not clear a trip.
    pub fn record_accept(&mut self) {
        self.consecutive = 0;
    }

    /// Latch the guard regardless of the streak.
    pub fn trip(&mut self) {
        self.tripped = true;
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Clear the streak and the trip, returning the guard to its initial state.
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.tripped = false;
    }
}
