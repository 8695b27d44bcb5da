//! Round arithmetic and subround window configuration.

use std::time::Duration;

use parking_lot::RwLock;
use valence_core::Rounder;

use crate::state::{SubroundId, NR_OF_SUBROUNDS};

/// Timing configuration for one consensus round.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Nominal round duration.
    pub round_duration: Duration,
    /// Per-subround (start, end) windows as fractions of the round
    /// duration, indexed by [`SubroundId::index`].
    pub windows: [(f64, f64); NR_OF_SUBROUNDS],
    /// How often the chronology re-evaluates the current subround.
    pub tick_interval: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_millis(4000),
            windows: [
                (0.00, 0.05), // StartRound
                (0.05, 0.25), // Block
                (0.25, 0.40), // CommitmentHash
                (0.40, 0.55), // Bitmap
                (0.55, 0.70), // Commitment
                (0.70, 0.85), // Signature
                (0.85, 0.95), // EndRound
            ],
            tick_interval: Duration::from_millis(20),
        }
    }
}

impl RoundConfig {
    /// Absolute (start, end) of a subround window, unix milliseconds,
    /// given the round's start timestamp.
    pub fn window_ms(&self, subround: SubroundId, round_start_ms: u64) -> (u64, u64) {
        let duration = self.round_duration.as_millis() as f64;
        let (start, end) = self.windows[subround.index()];
        (
            round_start_ms + (duration * start) as u64,
            round_start_ms + (duration * end) as u64,
        )
    }
}

/// Rounder deriving the round purely from wall-clock time.
#[derive(Debug)]
pub struct TimeRounder {
    duration: Duration,
    inner: RwLock<(u64, u64)>, // (index, start timestamp ms)
}

impl TimeRounder {
    /// Create a rounder with the given nominal round duration.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            inner: RwLock::new((0, 0)),
        }
    }
}

impl Rounder for TimeRounder {
    fn index(&self) -> u64 {
        self.inner.read().0
    }

    fn time_stamp(&self) -> u64 {
        self.inner.read().1
    }

    fn time_duration(&self) -> Duration {
        self.duration
    }

    fn update_round(&self, genesis_time_ms: u64, current_time_ms: u64) {
        let duration_ms = self.duration.as_millis() as u64;
        let (index, start) = if current_time_ms <= genesis_time_ms {
            (0, genesis_time_ms)
        } else {
            let elapsed = current_time_ms - genesis_time_ms;
            let index = elapsed / duration_ms;
            (index, genesis_time_ms + index * duration_ms)
        };
        *self.inner.write() = (index, start);
    }
}
