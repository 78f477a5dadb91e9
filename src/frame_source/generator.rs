use std::time::Duration;

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;
use crate::plugin::{Generator, ResolvedParams};

/// A pure function of frame-number, time, dimensions and params .
pub struct GeneratorSource {
    generator: Box<dyn Generator>,
    params: ResolvedParams,
    width: u32,
    height: u32,
    frame_number: u64,
    frame_delay: Duration,
}

impl GeneratorSource {
    pub fn new(
        generator: Box<dyn Generator>,
        params: ResolvedParams,
        (width, height): (u32, u32),
        fps: f32,
    ) -> Self {
        Self {
            generator,
            params,
            width,
            height,
            frame_number: 0,
            frame_delay: Duration::from_secs_f32(1.0 / fps.max(1.0)),
        }
    }
}

impl FrameSource for GeneratorSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        let time = self.frame_number as f64 * self.frame_delay.as_secs_f64();
        let frame = self
            .generator
            .produce(self.frame_number, time, self.width, self.height, &self.params);
        self.frame_number += 1;
        Ok((frame, self.frame_delay))
    }

    fn reset(&mut self) -> Result<(), FrameSourceError> {
        self.frame_number = 0;
        Ok(())
    }

    fn seek(&mut self, target_frame: u64) -> Result<(), FrameSourceError> {
        self.frame_number = target_frame;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn cleanup(&mut self) {}
}
