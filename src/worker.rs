// worker.rs — Persistent strip workers.
//
// Each worker is an OS thread bound to one RegionDescriptor for the life of
// the pool. It loops through a three-state machine:
//
//   Waiting ──start barrier──▶ Processing ──finish barrier──▶ Waiting
//      │
//      └──start barrier, shutdown flag set──▶ Stopped (finish barrier, exit)
//
// The flag is checked once per cycle, right after waking from the start
// barrier. When the stream ends the coordinator sets the flag and releases
// the barrier in one go; a worker that sees the flag must not touch the
// frame buffers again, because nobody refreshes them any more.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::cycle::CycleState;
use crate::error::{Error, Result};
use crate::lanes::KernelBackend;
use crate::region::RegionDescriptor;
use crate::shared::FrameBuffers;

/// Where a worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Parked on the start barrier.
    Waiting,
    /// Running grayscale then Sobel over its strip.
    Processing,
    /// Saw the shutdown flag; will pass the finish barrier once and exit.
    Stopped,
}

/// A worker before its thread is started.
pub(crate) struct FrameWorker {
    index: usize,
    region: RegionDescriptor,
    frame_rows: usize,
    backend: KernelBackend,
    cycle: Arc<CycleState>,
    buffers: Arc<FrameBuffers>,
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    region: RegionDescriptor,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn region(&self) -> &RegionDescriptor {
        &self.region
    }

    pub(crate) fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| Error::WorkerPanicked(self.index))
    }
}

impl FrameWorker {
    pub(crate) fn new(
        index: usize,
        region: RegionDescriptor,
        backend: KernelBackend,
        cycle: Arc<CycleState>,
        buffers: Arc<FrameBuffers>,
    ) -> Self {
        let frame_rows = buffers.height();
        FrameWorker {
            index,
            region,
            frame_rows,
            backend,
            cycle,
            buffers,
        }
    }

    /// Start the worker's thread. It parks on the start barrier right away.
    pub(crate) fn spawn(self) -> Result<WorkerHandle> {
        let index = self.index;
        let region = self.region;
        let thread = thread::Builder::new()
            .name(format!("edgepool-worker-{index}"))
            .spawn(move || self.run())
            .map_err(|source| Error::Spawn { index, source })?;
        Ok(WorkerHandle {
            index,
            region,
            thread,
        })
    }

    fn run(self) {
        let _abort = AbortOnPanic { index: self.index };
        let span = tracing::debug_span!("worker", index = self.index);
        let _enter = span.enter();
        debug!(rows = ?self.region.core_rows(), skirt = self.region.skirt, "worker started");

        let mut state = WorkerState::Waiting;
        loop {
            state = match state {
                WorkerState::Waiting => {
                    self.cycle.wait_start();
                    if self.cycle.shutdown_requested() {
                        WorkerState::Stopped
                    } else {
                        WorkerState::Processing
                    }
                }
                WorkerState::Processing => {
                    self.process();
                    self.cycle.record_processed(self.index);
                    self.cycle.wait_finish();
                    WorkerState::Waiting
                }
                WorkerState::Stopped => {
                    self.cycle.wait_finish();
                    debug!("worker stopped");
                    return;
                }
            };
        }
    }

    /// One frame: grayscale over the core rows, wait for every strip's
    /// grayscale to land, then Sobel over the gradient rows.
    fn process(&self) {
        let core = self.region.core_rows();
        trace!(rows = ?core, "grayscale");
        // SAFETY: between the start and finish barriers the coordinator does
        // not touch the buffers. Input is read-only for the whole cycle, and
        // no other strip owns any of our core rows.
        let (src, dst) = unsafe {
            (
                self.buffers.input.rows(core.clone()),
                self.buffers.gray.rows_mut(core),
            )
        };
        self.backend.grayscale(src, dst);

        self.cycle.wait_phase();

        let out_rows = self.region.gradient_rows(self.frame_rows);
        if out_rows.is_empty() {
            return;
        }
        let context = self.region.gradient_context(self.frame_rows);
        let skirted = self.region.skirted_rows();
        assert!(
            context.start + 1 >= skirted.start && context.end <= skirted.end,
            "worker {}: stencil rows {context:?} escape strip {skirted:?} (+1 row above)",
            self.index,
        );

        trace!(rows = ?out_rows, "sobel");
        // SAFETY: after the phase barrier nobody writes the gray buffer until
        // the next cycle; output rows are inside our core rows.
        let (src, dst) = unsafe {
            (
                self.buffers.gray.band(context),
                self.buffers.output.band_mut(out_rows),
            )
        };
        self.backend.sobel(src, dst);
    }
}

/// A worker that panics never reaches the next barrier and would hang the
/// whole pool, so a panic on a worker thread takes the process down.
struct AbortOnPanic {
    index: usize,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(worker = self.index, "worker panicked inside a cycle; aborting");
            std::process::abort();
        }
    }
}
