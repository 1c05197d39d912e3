//! Frame acquisition boundary.

use thiserror::Error;

/// Failure to acquire a frame. Capture is not expected to fail in normal
/// operation, so the service lets this terminate the worker rather than
/// retrying.
#[derive(Debug, Error)]
#[error("frame capture failed: {0}")]
pub struct CaptureFault(pub String);

/// One RGB frame, already scaled to the requested size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major RGB.
    pub pixels: Vec<u8>,
}

/// Produces scaled frames. Real implementations wrap an OS screen-capture
/// capability; this crate ships only [`TestPattern`].
pub trait FrameSource {
    fn grab(&mut self, width: u32, height: u32) -> Result<Frame, CaptureFault>;
}

/// Synthetic gradient source that shifts each grab, for running and testing
/// the worker without a display.
#[derive(Debug, Default)]
pub struct TestPattern {
    tick: u64,
}

impl FrameSource for TestPattern {
    fn grab(&mut self, width: u32, height: u32) -> Result<Frame, CaptureFault> {
        let shift = (self.tick % 256) as u8;
        self.tick = self.tick.wrapping_add(1);

        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x * 255 / width.max(1)) as u8);
                pixels.push((y * 255 / height.max(1)) as u8);
                pixels.push(shift);
            }
        }
        Ok(Frame {
            width,
            height,
            pixels,
        })
    }
}
