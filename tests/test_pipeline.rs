// tests/test_pipeline.rs — End-to-end runs of the worker pool.
//
// Fake sources and sinks drive FrameCoordinator and check the barrier
// protocol (release counts, shutdown) and that the strip-parallel output is
// identical to filtering the whole frame on one thread.

use std::io;

use edgepool::convert::grayscale_image;
use edgepool::gradient::sobel_image;
use edgepool::{
    Error, FrameCoordinator, FrameSink, FrameSource, Image, ImageView, ImageViewMut, KernelBackend,
    NullSink, PipelineConfig, ReadStatus, Rgb8, SinkControl, StopReason,
};

// ============================================================
// Helpers
// ============================================================

/// Textured RGB scene; `shift` moves it so consecutive frames differ.
fn make_scene(w: usize, h: usize, shift: usize) -> Image<Rgb8> {
    let mut img = Image::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let sx = x + shift;
            let sy = y + 2 * shift;
            let r = ((sx * 200) / w + (sy * 55) / h) as u8;
            let g = if (sx / 5 + sy / 3) % 2 == 0 { 240 } else { 10 };
            let b = ((sx * sy) % 251) as u8;
            img.set(x, y, Rgb8::new(r, g, b));
        }
    }
    img
}

fn reference(frame: &Image<Rgb8>) -> Image<u8> {
    let gray = grayscale_image(frame, KernelBackend::Scalar);
    sobel_image(&gray, KernelBackend::Scalar)
}

fn config(workers: usize, backend: KernelBackend) -> PipelineConfig {
    PipelineConfig {
        workers,
        backend: Some(backend),
    }
}

struct VecSource {
    width: usize,
    height: usize,
    frames: Vec<Image<Rgb8>>,
    next: usize,
}

impl VecSource {
    fn new(width: usize, height: usize, count: usize) -> Self {
        VecSource {
            width,
            height,
            frames: (0..count).map(|k| make_scene(width, height, k * 3)).collect(),
            next: 0,
        }
    }
}

impl FrameSource for VecSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, mut frame: ImageViewMut<'_, Rgb8>) -> io::Result<ReadStatus> {
        let Some(src) = self.frames.get(self.next) else {
            return Ok(ReadStatus::EndOfStream);
        };
        frame.as_mut_slice().copy_from_slice(src.as_slice());
        self.next += 1;
        Ok(ReadStatus::Frame)
    }
}

/// Fails on the given read.
struct FailingSource {
    inner: VecSource,
    fail_at: usize,
}

impl FrameSource for FailingSource {
    fn dimensions(&self) -> (usize, usize) {
        self.inner.dimensions()
    }

    fn read_frame(&mut self, frame: ImageViewMut<'_, Rgb8>) -> io::Result<ReadStatus> {
        if self.inner.next == self.fail_at {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "camera unplugged"));
        }
        self.inner.read_frame(frame)
    }
}

#[derive(Default)]
struct CollectSink {
    frames: Vec<Image<u8>>,
    stop_after: Option<usize>,
}

impl FrameSink for CollectSink {
    fn display(&mut self, frame: ImageView<'_, u8>) -> io::Result<SinkControl> {
        self.frames.push(frame.to_owned_image());
        match self.stop_after {
            Some(n) if self.frames.len() >= n => Ok(SinkControl::Stop),
            _ => Ok(SinkControl::Continue),
        }
    }
}

// ============================================================
// Barrier protocol
// ============================================================

#[test]
fn k_frames_release_each_barrier_k_plus_one_times() {
    for k in [0usize, 1, 5] {
        let pool = FrameCoordinator::new(40, 24, PipelineConfig::default()).unwrap();
        let mut source = VecSource::new(40, 24, k);
        let mut sink = CollectSink::default();

        let summary = pool.run(&mut source, &mut sink).unwrap();
        assert_eq!(summary.frames, k as u64);
        assert_eq!(summary.stop, StopReason::EndOfStream);
        assert_eq!(summary.barriers.start_releases, k as u64 + 1, "k={k}");
        assert_eq!(summary.barriers.finish_releases, k as u64 + 1, "k={k}");
        // The shutdown release is never counted as a processed frame.
        assert_eq!(summary.barriers.frames_per_worker, vec![k as u64; 4], "k={k}");
        assert_eq!(sink.frames.len(), k);
    }
}

#[test]
fn sink_stop_ends_run() {
    let pool = FrameCoordinator::new(32, 16, PipelineConfig::default()).unwrap();
    let mut source = VecSource::new(32, 16, 10);
    let mut sink = CollectSink {
        stop_after: Some(2),
        ..Default::default()
    };

    let summary = pool.run(&mut source, &mut sink).unwrap();
    assert_eq!(summary.stop, StopReason::SinkRequested);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.barriers.start_releases, 3);
    assert_eq!(source.next, 2, "no frame read past the stop");
}

#[test]
fn workers_match_plan() {
    let pool = FrameCoordinator::new(16, 10, config(3, KernelBackend::Portable)).unwrap();
    assert_eq!(pool.backend(), KernelBackend::Portable);
    assert_eq!(pool.dimensions(), (16, 10));
    for (k, handle) in pool.workers().iter().enumerate() {
        assert_eq!(handle.index(), k);
        assert_eq!(handle.region(), &pool.plan().regions()[k]);
    }
}

#[test]
fn drop_without_run_joins_workers() {
    for workers in [1, 4, 8] {
        let pool = FrameCoordinator::new(8, 8, config(workers, KernelBackend::Scalar)).unwrap();
        drop(pool);
    }
}

// ============================================================
// Output
// ============================================================

#[test]
fn strip_output_matches_whole_frame() {
    let cases = [
        (64, 48, 4),
        (37, 13, 4),
        (20, 5, 4),
        (9, 3, 4),
        (9, 2, 4),
        (30, 17, 3),
        (16, 16, 1),
        (50, 40, 7),
        (1, 9, 2),
    ];
    for backend in KernelBackend::available() {
        for &(w, h, workers) in &cases {
            let pool = FrameCoordinator::new(w, h, config(workers, backend)).unwrap();
            let mut source = VecSource::new(w, h, 3);
            let mut sink = CollectSink::default();
            pool.run(&mut source, &mut sink).unwrap();

            assert_eq!(sink.frames.len(), 3);
            for (i, (out, input)) in sink.frames.iter().zip(&source.frames).enumerate() {
                assert_eq!(
                    out.as_slice(),
                    reference(input).as_slice(),
                    "{backend} {w}x{h} workers={workers} frame {i}"
                );
            }
        }
    }
}

#[test]
fn frame_border_stays_zero() {
    let (w, h) = (24, 12);
    let pool = FrameCoordinator::new(w, h, PipelineConfig::default()).unwrap();
    let mut source = VecSource::new(w, h, 2);
    let mut sink = CollectSink::default();
    pool.run(&mut source, &mut sink).unwrap();

    let out = sink.frames.last().unwrap();
    for x in 0..w {
        assert_eq!(out.get(x, 0), 0, "top x={x}");
        assert_eq!(out.get(x, h - 1), 0, "bottom x={x}");
    }
    for y in 0..h {
        assert_eq!(out.get(0, y), 0, "left y={y}");
        assert_eq!(out.get(w - 1, y), 0, "right y={y}");
    }
}

#[test]
fn process_image_reuses_pool() {
    let (w, h) = (33, 21);
    let mut pool = FrameCoordinator::new(w, h, PipelineConfig::default()).unwrap();
    for shift in [0, 7] {
        let img = make_scene(w, h, shift);
        let out = pool.process_image(&img).unwrap();
        assert_eq!(out.as_slice(), reference(&img).as_slice(), "shift {shift}");
    }
    assert_eq!(pool.frames(), 2);

    let stats = pool.shutdown().unwrap();
    assert_eq!(stats.start_releases, 3);
    assert_eq!(stats.frames_per_worker, vec![2; 4]);
}

// ============================================================
// Errors
// ============================================================

#[test]
fn source_error_is_returned() {
    let pool = FrameCoordinator::new(16, 8, PipelineConfig::default()).unwrap();
    let mut source = FailingSource {
        inner: VecSource::new(16, 8, 5),
        fail_at: 2,
    };
    let err = pool.run(&mut source, &mut NullSink).unwrap_err();
    match err {
        Error::Source(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected source error, got {other:?}"),
    }
}

#[test]
fn dimension_mismatch_is_rejected() {
    let pool = FrameCoordinator::new(16, 8, PipelineConfig::default()).unwrap();
    let mut source = VecSource::new(16, 9, 1);
    let err = pool.run(&mut source, &mut NullSink).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            width: 16,
            height: 8,
            actual_width: 16,
            actual_height: 9
        }
    ));
}

#[test]
fn unavailable_backend_is_rejected() {
    for backend in KernelBackend::ALL {
        if backend.is_available() {
            continue;
        }
        let err = FrameCoordinator::new(8, 8, config(4, backend)).err();
        assert!(matches!(err, Some(Error::BackendUnavailable(b)) if b == backend));
    }
}

#[test]
fn no_workers_is_rejected() {
    let err = FrameCoordinator::new(8, 8, config(0, KernelBackend::Scalar)).err();
    assert!(matches!(err, Some(Error::NoWorkers)));
}
