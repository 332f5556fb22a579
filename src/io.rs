// io.rs — Raw video sources and sinks.
//
// Frames travel as headerless interleaved bytes, the format `ffmpeg -f
// rawvideo` reads and writes:
//
//   input   width * height * 3 bytes per frame (rgb24 or bgr24)
//   output  width * height bytes per frame     (gray)
//
// A clean EOF on a frame boundary ends the stream. A partial trailing frame
// is dropped with a warning and also ends the stream.

use std::io::{self, ErrorKind, Read, Write};

use tracing::warn;

use crate::coordinator::{FrameSink, FrameSource, ReadStatus, SinkControl};
use crate::image::{ImageView, ImageViewMut, Rgb8};

/// Byte order of the three channels in each input pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    /// Blue first, as most capture libraries deliver frames.
    Bgr,
}

/// Reads fixed-size interleaved 24-bit frames from any byte stream.
pub struct RawVideoSource<R> {
    reader: R,
    width: usize,
    height: usize,
    order: ChannelOrder,
    frames: u64,
}

impl<R: Read> RawVideoSource<R> {
    pub fn new(reader: R, width: usize, height: usize, order: ChannelOrder) -> Self {
        RawVideoSource {
            reader,
            width,
            height,
            order,
            frames: 0,
        }
    }

    /// Frames read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> FrameSource for RawVideoSource<R> {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, mut frame: ImageViewMut<'_, Rgb8>) -> io::Result<ReadStatus> {
        let bytes = frame.as_bytes_mut();
        let filled = read_full(&mut self.reader, bytes)?;
        if filled == 0 {
            return Ok(ReadStatus::EndOfStream);
        }
        if filled < bytes.len() {
            warn!(
                frame = self.frames,
                got = filled,
                expected = bytes.len(),
                "truncated trailing frame dropped"
            );
            return Ok(ReadStatus::EndOfStream);
        }

        if self.order == ChannelOrder::Bgr {
            for px in frame.as_mut_slice() {
                std::mem::swap(&mut px.r, &mut px.b);
            }
        }
        self.frames += 1;
        Ok(ReadStatus::Frame)
    }
}

/// Fill `buf` from `reader`; stops early only at EOF. Returns bytes read.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes each gradient frame as raw 8-bit gray.
pub struct RawVideoSink<W> {
    writer: W,
    frames: u64,
}

impl<W: Write> RawVideoSink<W> {
    pub fn new(writer: W) -> Self {
        RawVideoSink { writer, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and hand back the writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> FrameSink for RawVideoSink<W> {
    fn display(&mut self, frame: ImageView<'_, u8>) -> io::Result<SinkControl> {
        self.writer.write_all(frame.as_slice())?;
        self.frames += 1;
        Ok(SinkControl::Continue)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Discards every frame. Useful for throughput runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn display(&mut self, _frame: ImageView<'_, u8>) -> io::Result<SinkControl> {
        Ok(SinkControl::Continue)
    }
}

/// Forwards every frame to several sinks; stops as soon as any of them does.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn FrameSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn FrameSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FrameSink for FanoutSink {
    fn display(&mut self, frame: ImageView<'_, u8>) -> io::Result<SinkControl> {
        let mut control = SinkControl::Continue;
        for sink in &mut self.sinks {
            if sink.display(frame)? == SinkControl::Stop {
                control = SinkControl::Stop;
            }
        }
        Ok(control)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.sinks.iter_mut().try_for_each(|sink| sink.finish())
    }
}
