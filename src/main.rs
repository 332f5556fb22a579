// edgepool — run raw video through the grayscale + Sobel worker pool.
//
//   ffmpeg -i in.mp4 -f rawvideo -pix_fmt rgb24 - \
//     | edgepool - --width 640 --height 480 --output edges.gray
//
// Exit codes: 0 ok, -1 input cannot be opened, -2 bad arguments or
// geometry, 1 anything that fails mid-run.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edgepool::{
    ChannelOrder, Error, FanoutSink, FrameCoordinator, FrameSink, KernelBackend, NullSink,
    PipelineConfig, RawVideoSink, RawVideoSource, DEFAULT_WORKERS,
};

const EXIT_OPEN_FAILED: i32 = -1;
const EXIT_USAGE: i32 = -2;
const EXIT_RUNTIME: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PixelFormat {
    Rgb24,
    Bgr24,
}

impl From<PixelFormat> for ChannelOrder {
    fn from(fmt: PixelFormat) -> Self {
        match fmt {
            PixelFormat::Rgb24 => ChannelOrder::Rgb,
            PixelFormat::Bgr24 => ChannelOrder::Bgr,
        }
    }
}

/// Grayscale + Sobel edge filter over raw video, split across a worker pool.
#[derive(Debug, Parser)]
#[command(name = "edgepool", version)]
struct Cli {
    /// Raw interleaved video file, or `-` for stdin.
    input: PathBuf,

    /// Frame width in pixels.
    #[arg(long)]
    width: usize,

    /// Frame height in pixels.
    #[arg(long)]
    height: usize,

    /// Worker threads (one horizontal strip each).
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Kernel backend: scalar, portable, sse2 or neon. Default: fastest available.
    #[arg(long)]
    backend: Option<KernelBackend>,

    #[arg(long, value_enum, default_value_t = PixelFormat::Rgb24)]
    pixel_format: PixelFormat,

    /// Write gradient frames as raw 8-bit gray (`-` for stdout).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Show frames in a window; Esc stops.
    #[cfg(feature = "window")]
    #[arg(long)]
    window: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let failed = err.use_stderr();
            let _ = err.print();
            process::exit(if failed { EXIT_USAGE } else { 0 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let reader = match open_input(&cli.input) {
        Ok(reader) => reader,
        Err(err) => {
            error!(input = %cli.input.display(), %err, "cannot open input");
            process::exit(EXIT_OPEN_FAILED);
        }
    };

    if let Err(err) = run(&cli, reader) {
        error!("{err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            error!("  caused by: {cause}");
            source = cause.source();
        }
        process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli, reader: Box<dyn Read>) -> Result<(), Error> {
    let config = PipelineConfig {
        workers: cli.workers,
        backend: cli.backend,
    };
    let pool = FrameCoordinator::new(cli.width, cli.height, config)?;

    let mut source = RawVideoSource::new(reader, cli.width, cli.height, cli.pixel_format.into());
    let mut sink = FanoutSink::new();
    if let Some(path) = &cli.output {
        let writer = open_output(path).map_err(Error::Sink)?;
        sink.push(Box::new(RawVideoSink::new(writer)));
    }
    #[cfg(feature = "window")]
    if cli.window {
        let window = edgepool::display::WindowSink::new("edgepool", cli.width, cli.height)
            .map_err(Error::Sink)?;
        sink.push(Box::new(window));
    }
    if sink.is_empty() {
        sink.push(Box::new(NullSink));
    }

    let started = Instant::now();
    let summary = pool.run(&mut source, &mut sink)?;
    sink.finish().map_err(Error::Sink)?;
    let secs = started.elapsed().as_secs_f64();

    let fps = if secs > 0.0 { summary.frames as f64 / secs } else { 0.0 };
    info!(
        frames = summary.frames,
        stop = ?summary.stop,
        seconds = secs,
        "average {fps:.1} fps"
    );
    Ok(())
}

fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin().lock())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufWriter::new(io::stdout().lock())))
    } else {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

fn exit_code(err: &Error) -> i32 {
    match err {
        Error::ZeroSizedFrame { .. }
        | Error::FrameTooLarge { .. }
        | Error::NoWorkers
        | Error::BackendUnavailable(_) => EXIT_USAGE,
        _ => EXIT_RUNTIME,
    }
}
