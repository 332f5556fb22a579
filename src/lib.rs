// edgepool: grayscale + Sobel edge filtering over a fixed pool of strip workers
//
// Each frame is split into horizontal strips, one per persistent worker
// thread. Workers meet the coordinator on a start and a finish barrier every
// frame, and each other on a phase barrier between the grayscale and Sobel
// passes.

pub mod image;
pub mod lanes;
pub mod convert;
pub mod gradient;
pub mod region;
pub mod cycle;
mod shared;
pub mod worker;
pub mod coordinator;
pub mod error;
pub mod io;

#[cfg(feature = "window")]
pub mod display;

pub use coordinator::{
    FrameCoordinator, FrameSink, FrameSource, PipelineConfig, ReadStatus, RunSummary, SinkControl,
    StopReason,
};
pub use cycle::BarrierStats;
pub use error::{Error, Result};
pub use image::{Image, ImageView, ImageViewMut, Rgb8};
pub use io::{ChannelOrder, FanoutSink, NullSink, RawVideoSink, RawVideoSource};
pub use lanes::KernelBackend;
pub use region::{RegionDescriptor, RegionPlan, DEFAULT_WORKERS};
pub use worker::{WorkerHandle, WorkerState};
