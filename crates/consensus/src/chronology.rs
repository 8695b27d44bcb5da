//! Wall-clock driver of the subround sequence.
//!
//! The chronology owns the ordered subround handlers and walks them by
//! their percent windows of the round duration. The decision logic lives
//! in [`Chronology::tick`], a step function over an explicit timestamp, so
//! tests advance time by calling it directly; the background loop merely
//! feeds it the wall clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use valence_core::metrics::METRIC_CURRENT_ROUND;
use valence_core::{Rounder, StatusHandler};

use crate::round::RoundConfig;
use crate::state::NR_OF_SUBROUNDS;
use crate::subrounds::SubroundHandler;

struct Progress {
    last_round: Option<u64>,
    current: usize,
    job_dispatched: [bool; NR_OF_SUBROUNDS],
}

/// Drives the subrounds of consecutive rounds.
pub struct Chronology {
    rounder: Arc<dyn Rounder>,
    status: Arc<dyn StatusHandler>,
    subrounds: Vec<Arc<dyn SubroundHandler>>,
    config: RoundConfig,
    genesis_time_ms: u64,
    progress: Mutex<Progress>,
    stop_flag: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Chronology {
    /// Create a driver over the ordered subround handlers.
    pub fn new(
        rounder: Arc<dyn Rounder>,
        status: Arc<dyn StatusHandler>,
        subrounds: Vec<Arc<dyn SubroundHandler>>,
        config: RoundConfig,
        genesis_time_ms: u64,
    ) -> Self {
        Self {
            rounder,
            status,
            subrounds,
            config,
            genesis_time_ms,
            progress: Mutex::new(Progress {
                last_round: None,
                current: 0,
                job_dispatched: [false; NR_OF_SUBROUNDS],
            }),
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Advance the machine to the given wall-clock instant: enter a new
    /// round when the clock crossed a round boundary, dispatch due jobs,
    /// move past subrounds whose check passed, and extend the ones whose
    /// window lapsed.
    pub async fn tick(&self, now_ms: u64) {
        self.rounder.update_round(self.genesis_time_ms, now_ms);
        let round = self.rounder.index();

        let new_round = {
            let mut progress = self.progress.lock();
            if progress.last_round != Some(round) {
                progress.last_round = Some(round);
                progress.current = 0;
                progress.job_dispatched = [false; NR_OF_SUBROUNDS];
                true
            } else {
                false
            }
        };
        if new_round {
            self.status.set_uint64_value(METRIC_CURRENT_ROUND, round);
            debug!(round = round, "entering round");
        }

        loop {
            let index = self.progress.lock().current;
            let Some(handler) = self.subrounds.get(index) else {
                // round is over; wait for the next boundary
                return;
            };

            let (start_ms, end_ms) = self
                .config
                .window_ms(handler.id(), self.rounder.time_stamp());
            if now_ms < start_ms {
                return;
            }

            let dispatch_job = {
                let mut progress = self.progress.lock();
                if progress.job_dispatched[index] {
                    false
                } else {
                    progress.job_dispatched[index] = true;
                    true
                }
            };
            if dispatch_job {
                trace!(subround = %handler.id(), "dispatching job");
                handler.do_job().await;
            }

            if handler.do_check() {
                trace!(subround = %handler.id(), "subround finished");
                self.progress.lock().current = index + 1;
                continue;
            }

            if now_ms >= end_ms {
                debug!(subround = %handler.id(), "subround extended");
                handler.extend();
                self.progress.lock().current = index + 1;
                continue;
            }

            return;
        }
    }

    /// Launch the background driver loop.
    pub fn start(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if me.stop_flag.load(Ordering::Acquire) {
                    break;
                }
                me.tick(unix_now_ms()).await;
                tokio::time::sleep(me.config.tick_interval).await;
            }
        });
        *self.task.lock() = Some(handle);
    }

    /// Stop the driver loop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
