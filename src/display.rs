// display.rs — Live preview window (feature `window`).
//
// Shows each gradient frame in a minifb window at native resolution.
// Esc or closing the window asks the coordinator to stop.

use std::io;

use minifb::{Key, Window, WindowOptions};

use crate::coordinator::{FrameSink, SinkControl};
use crate::image::ImageView;

/// Pack a gray u8 into the 0RGB u32 minifb expects.
#[inline]
fn gray_to_u32(v: u8) -> u32 {
    let c = v as u32;
    0xFF00_0000 | (c << 16) | (c << 8) | c
}

pub struct WindowSink {
    window: Window,
    fb: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowSink {
    pub fn new(title: &str, width: usize, height: usize) -> io::Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .map_err(io::Error::other)?;
        window.set_target_fps(60);
        Ok(WindowSink {
            window,
            fb: vec![0; width * height],
            width,
            height,
        })
    }
}

impl FrameSink for WindowSink {
    fn display(&mut self, frame: ImageView<'_, u8>) -> io::Result<SinkControl> {
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            return Ok(SinkControl::Stop);
        }
        for (dst, &v) in self.fb.iter_mut().zip(frame.as_slice()) {
            *dst = gray_to_u32(v);
        }
        self.window
            .update_with_buffer(&self.fb, self.width, self.height)
            .map_err(io::Error::other)?;
        Ok(SinkControl::Continue)
    }
}
