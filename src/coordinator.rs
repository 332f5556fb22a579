// coordinator.rs — Drives the worker pool frame by frame.
//
// The loop the rest of the crate exists to serve:
//
//   1. Pull the next frame from the source straight into the input buffer
//   2. End of stream → shutdown protocol, done
//   3. Release the start barrier (workers wake and filter their strips)
//   4. Wait on the finish barrier (every strip written)
//   5. Hand the output buffer to the sink; the sink may ask to stop
//   6. Repeat
//
// The next frame is not fetched until the current one is finished, so the
// workers always see one fully materialised frame per cycle and nothing else
// touches the buffers while they run.
//
// Shutdown protocol (end of stream, sink stop, error, or drop):
//   set flag → start barrier → finish barrier → join every worker.
// Only after every worker is joined does the coordinator let go of the
// barriers and buffers.

use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cycle::{BarrierStats, CycleState};
use crate::error::{Error, Result};
use crate::image::{Image, ImageView, ImageViewMut, Rgb8};
use crate::lanes::KernelBackend;
use crate::region::{RegionPlan, DEFAULT_WORKERS};
use crate::shared::FrameBuffers;
use crate::worker::{FrameWorker, WorkerHandle};

/// Outcome of asking a source for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The frame buffer now holds a new frame.
    Frame,
    /// No more frames; the buffer contents are unspecified.
    EndOfStream,
}

/// What the sink wants after seeing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    /// Stop after this frame (e.g. the user closed the window).
    Stop,
}

/// Produces input frames of a fixed size.
pub trait FrameSource {
    /// `(width, height)` of every frame this source yields.
    fn dimensions(&self) -> (usize, usize);

    /// Decode the next frame into `frame`, which has exactly
    /// `dimensions()` pixels.
    fn read_frame(&mut self, frame: ImageViewMut<'_, Rgb8>) -> io::Result<ReadStatus>;
}

/// Consumes filtered frames.
pub trait FrameSink {
    /// Called once per frame with the finished gradient image. The view is
    /// only valid for the duration of the call.
    fn display(&mut self, frame: ImageView<'_, u8>) -> io::Result<SinkControl>;

    /// Flush anything buffered once the last frame has been displayed.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of strips / worker threads. Fixed for the life of the pool.
    pub workers: usize,
    /// Kernel implementation; `None` picks the fastest available.
    pub backend: Option<KernelBackend>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            backend: None,
        }
    }
}

/// Why [`FrameCoordinator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    SinkRequested,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames filtered and handed to the sink.
    pub frames: u64,
    pub stop: StopReason,
    /// Barrier and worker counters after every worker was joined.
    pub barriers: BarrierStats,
}

/// Owns the frame buffers, the cycle state and the worker threads.
pub struct FrameCoordinator {
    plan: RegionPlan,
    backend: KernelBackend,
    cycle: Arc<CycleState>,
    buffers: Arc<FrameBuffers>,
    workers: Vec<WorkerHandle>,
    frames: u64,
}

impl FrameCoordinator {
    /// Validate the geometry, allocate the buffers and start the workers.
    pub fn new(width: usize, height: usize, config: PipelineConfig) -> Result<Self> {
        let plan = RegionPlan::new(height, width, config.workers)?;
        let backend = match config.backend {
            Some(backend) if !backend.is_available() => {
                return Err(Error::BackendUnavailable(backend));
            }
            Some(backend) => backend,
            None => KernelBackend::detect(),
        };

        let cycle = Arc::new(CycleState::new(plan.len()));
        let buffers = Arc::new(FrameBuffers::new(width, height));

        let mut workers = Vec::with_capacity(plan.len());
        for (index, region) in plan.regions().iter().enumerate() {
            let worker = FrameWorker::new(
                index,
                *region,
                backend,
                Arc::clone(&cycle),
                Arc::clone(&buffers),
            );
            match worker.spawn() {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    detach_partial_pool(workers, plan.len());
                    return Err(err);
                }
            }
        }

        info!(
            width,
            height,
            workers = plan.len(),
            %backend,
            "worker pool started"
        );

        Ok(FrameCoordinator {
            plan,
            backend,
            cycle,
            buffers,
            workers,
            frames: 0,
        })
    }

    pub fn plan(&self) -> &RegionPlan {
        &self.plan
    }

    pub fn backend(&self) -> KernelBackend {
        self.backend
    }

    /// Running worker threads (empty after shutdown).
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn stats(&self) -> BarrierStats {
        self.cycle.stats()
    }

    /// `(width, height)` of the frames this pipeline filters.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.buffers.width(), self.buffers.height())
    }

    /// Filter frames from `source` into `sink` until the stream ends or the
    /// sink asks to stop, then shut the pool down.
    ///
    /// Errors from the source or sink also shut the pool down (on drop)
    /// before they are returned.
    pub fn run<S, K>(mut self, source: &mut S, sink: &mut K) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        self.check_dimensions(source.dimensions())?;

        let stop = loop {
            // SAFETY: between cycles; every worker is parked on the start barrier.
            let input = unsafe { self.buffers.input.view_mut() };
            match source.read_frame(input).map_err(Error::Source)? {
                ReadStatus::EndOfStream => break StopReason::EndOfStream,
                ReadStatus::Frame => {}
            }

            self.run_cycle();

            // SAFETY: the finish barrier has passed; workers are parked again.
            let output = unsafe { self.buffers.output.view() };
            if sink.display(output).map_err(Error::Sink)? == SinkControl::Stop {
                break StopReason::SinkRequested;
            }
        };

        let frames = self.frames;
        let barriers = self.shutdown_workers()?;
        info!(frames, ?stop, "run finished");
        Ok(RunSummary {
            frames,
            stop,
            barriers,
        })
    }

    /// Filter a single still image through the pool.
    pub fn process_image(&mut self, image: &Image<Rgb8>) -> Result<Image<u8>> {
        self.check_dimensions((image.width(), image.height()))?;
        // SAFETY: between cycles; every worker is parked on the start barrier.
        unsafe { self.buffers.input.view_mut() }
            .as_mut_slice()
            .copy_from_slice(image.as_slice());

        self.run_cycle();

        // SAFETY: the finish barrier has passed; workers are parked again.
        Ok(unsafe { self.buffers.output.view() }.to_owned_image())
    }

    /// Stop and join every worker.
    pub fn shutdown(mut self) -> Result<BarrierStats> {
        self.shutdown_workers()
    }

    /// One frame through the pool: release the workers, wait for all strips.
    fn run_cycle(&mut self) {
        assert!(!self.workers.is_empty(), "worker pool already shut down");
        self.cycle.wait_start();
        self.cycle.wait_finish();
        self.frames += 1;
        debug!(frame = self.frames, "frame filtered");
    }

    fn check_dimensions(&self, (width, height): (usize, usize)) -> Result<()> {
        let (expected_width, expected_height) = self.dimensions();
        if (width, height) != (expected_width, expected_height) {
            return Err(Error::DimensionMismatch {
                width: expected_width,
                height: expected_height,
                actual_width: width,
                actual_height: height,
            });
        }
        Ok(())
    }

    fn shutdown_workers(&mut self) -> Result<BarrierStats> {
        if self.workers.is_empty() {
            return Ok(self.cycle.stats());
        }

        self.cycle.request_shutdown();
        self.cycle.wait_start();
        self.cycle.wait_finish();

        let mut first_err = None;
        for handle in self.workers.drain(..) {
            if let Err(err) = handle.join() {
                first_err.get_or_insert(err);
            }
        }
        debug!(frames = self.frames, "worker pool joined");

        match first_err {
            Some(err) => Err(err),
            None => Ok(self.cycle.stats()),
        }
    }
}

/// A partial pool can never complete a barrier, so the workers that did
/// start stay parked on the start barrier for the life of the process.
/// Returns how many were left behind.
fn detach_partial_pool(started: Vec<WorkerHandle>, planned: usize) -> usize {
    let detached = started.len();
    if detached > 0 {
        warn!(
            detached,
            planned,
            "worker spawn failed; started workers stay parked and keep their frame buffers"
        );
    }
    detached
}

impl Drop for FrameCoordinator {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_workers() {
            warn!(%err, "worker pool shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.backend, None);
    }

    #[test]
    fn test_zero_sized_frame_starts_no_workers() {
        let err = FrameCoordinator::new(0, 480, PipelineConfig::default()).err();
        assert!(matches!(err, Some(Error::ZeroSizedFrame { width: 0, height: 480 })));
    }

    #[test]
    fn test_shutdown_without_frames() {
        let pool = FrameCoordinator::new(32, 16, PipelineConfig::default()).unwrap();
        assert_eq!(pool.workers().len(), 4);
        let stats = pool.shutdown().unwrap();
        assert_eq!(stats.start_releases, 1);
        assert_eq!(stats.finish_releases, 1);
        assert_eq!(stats.frames_per_worker, vec![0; 4]);
    }

    #[test]
    fn test_partial_pool_is_detached() {
        // Only the first of two planned workers starts; it can never leave
        // the start barrier and is left parked.
        let plan = RegionPlan::new(4, 4, 2).unwrap();
        let cycle = Arc::new(CycleState::new(plan.len()));
        let buffers = Arc::new(FrameBuffers::new(4, 4));
        let first = FrameWorker::new(0, plan.regions()[0], KernelBackend::Scalar, cycle, buffers)
            .spawn()
            .unwrap();

        assert_eq!(detach_partial_pool(vec![first], plan.len()), 1);
        assert_eq!(detach_partial_pool(Vec::new(), plan.len()), 0);
    }

    #[test]
    fn test_too_large_frame_starts_no_workers() {
        let err = FrameCoordinator::new(usize::MAX / 2, 3, PipelineConfig::default()).err();
        assert!(matches!(err, Some(Error::FrameTooLarge { height: 3, .. })));
    }

    #[test]
    fn test_process_image_rejects_wrong_size() {
        let mut pool = FrameCoordinator::new(8, 8, PipelineConfig::default()).unwrap();
        let img: Image<Rgb8> = Image::new(8, 9);
        assert!(matches!(
            pool.process_image(&img),
            Err(Error::DimensionMismatch { actual_height: 9, .. })
        ));
        assert_eq!(pool.frames(), 0);
    }
}
