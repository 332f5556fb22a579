use std::io;

use thiserror::Error;

use crate::lanes::KernelBackend;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the pipeline.
///
/// End of stream is not an error: sources report it through
/// [`ReadStatus::EndOfStream`](crate::coordinator::ReadStatus) and the
/// coordinator turns it into an orderly shutdown. A broken strip partition is
/// not an error either: it is a programming bug and panics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("frame must have at least one row and one column (got {width}x{height})")]
    ZeroSizedFrame { width: usize, height: usize },

    #[error("frame {width}x{height} is too large to allocate")]
    FrameTooLarge { width: usize, height: usize },

    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("kernel backend `{0}` is not available on this CPU")]
    BackendUnavailable(KernelBackend),

    #[error("frame is {actual_width}x{actual_height}, pipeline expects {width}x{height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("failed to spawn worker {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("frame source failed")]
    Source(#[source] io::Error),

    #[error("frame sink failed")]
    Sink(#[source] io::Error),
}
