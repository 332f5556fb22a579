// cycle.rs — Per-frame rendezvous between the coordinator and its workers.
//
// One cycle:
//
//   coordinator             worker k (k = 0..N)
//   ───────────             ───────────────────
//   fill input buffer       (parked)
//   start.wait()  ───────▶  start.wait()
//                           if shutdown → finish.wait(), exit
//                           grayscale own core rows
//                           phase.wait()      (workers only)
//                           Sobel own gradient rows
//   finish.wait() ◀───────  finish.wait()
//   hand output to sink
//
// The shutdown flag is only written by the coordinator between cycles and
// read by workers right after the start barrier, so the barrier itself
// orders the write before every read.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Barrier;

/// Release counts and per-worker progress, for tests and reporting.
///
/// Exact once the workers have been joined; while the pool is running a
/// count may lag by one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierStats {
    /// Generations of the start barrier (frames dispatched + the shutdown release).
    pub start_releases: u64,
    /// Generations of the finish barrier.
    pub finish_releases: u64,
    /// Frames each worker actually processed.
    pub frames_per_worker: Vec<u64>,
}

/// Barriers, the shutdown flag and counters shared by one worker pool.
pub(crate) struct CycleState {
    start: Barrier,
    phase: Barrier,
    finish: Barrier,
    shutdown: AtomicBool,
    start_releases: AtomicU64,
    finish_releases: AtomicU64,
    processed: Vec<AtomicU64>,
}

impl CycleState {
    /// State for `workers` workers plus the coordinator.
    pub(crate) fn new(workers: usize) -> Self {
        CycleState {
            start: Barrier::new(workers + 1),
            phase: Barrier::new(workers),
            finish: Barrier::new(workers + 1),
            shutdown: AtomicBool::new(false),
            start_releases: AtomicU64::new(0),
            finish_releases: AtomicU64::new(0),
            processed: (0..workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub(crate) fn wait_start(&self) {
        if self.start.wait().is_leader() {
            self.start_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Grayscale → Sobel hand-over; workers only.
    pub(crate) fn wait_phase(&self) {
        self.phase.wait();
    }

    pub(crate) fn wait_finish(&self) {
        if self.finish.wait().is_leader() {
            self.finish_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Must only be called between cycles.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn record_processed(&self, worker: usize) {
        self.processed[worker].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> BarrierStats {
        BarrierStats {
            start_releases: self.start_releases.load(Ordering::Relaxed),
            finish_releases: self.finish_releases.load(Ordering::Relaxed),
            frames_per_worker: self
                .processed
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}
