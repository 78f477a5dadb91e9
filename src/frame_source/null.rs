use std::time::Duration;

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;

/// A constant-color source that never exhausts. Used for clips that only
/// carry effects/generators on overlay layers, or as a placeholder base.
pub struct NullSource {
    width: u32,
    height: u32,
    fill: (u8, u8, u8),
    frame_delay: Duration,
}

impl NullSource {
    pub fn new((width, height): (u32, u32), fps: f32) -> Self {
        Self {
            width,
            height,
            fill: (0, 0, 0),
            frame_delay: Duration::from_secs_f32(1.0 / fps.max(1.0)),
        }
    }

    pub fn with_fill((width, height): (u32, u32), fps: f32, fill: (u8, u8, u8)) -> Self {
        Self {
            width,
            height,
            fill,
            frame_delay: Duration::from_secs_f32(1.0 / fps.max(1.0)),
        }
    }
}

impl FrameSource for NullSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        Ok((Frame::filled(self.width, self.height, self.fill), self.frame_delay))
    }

    fn reset(&mut self) -> Result<(), FrameSourceError> {
        Ok(())
    }

    fn seek(&mut self, _target_frame: u64) -> Result<(), FrameSourceError> {
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn cleanup(&mut self) {}
}
