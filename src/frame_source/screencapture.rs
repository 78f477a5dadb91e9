use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::Duration;

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;

/// A captured screen region. Like [`crate::frame_source::WebcamSource`],
/// OS screen capture is out of scope for this crate's dependency stack;
/// frames arrive over a channel from an external capture thread that
/// owns the platform-specific capture API and crops to `(x, y, width,
/// height)` before pushing.
pub struct ScreencaptureSource {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    rx: Option<Receiver<Frame>>,
    last_frame: Option<Frame>,
    frame_delay: Duration,
}

pub type ScreencaptureFeed = Sender<Frame>;

impl ScreencaptureSource {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rx: None,
            last_frame: None,
            frame_delay: Duration::from_secs_f32(1.0 / 30.0),
        }
    }

    pub fn attach(&mut self, rx: Receiver<Frame>) {
        self.rx = Some(rx);
    }

    pub fn region(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

impl FrameSource for ScreencaptureSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        if self.rx.is_none() {
            return Err(FrameSourceError::Fatal {
                reason: "screencapture source has no attached feed".to_string(),
            });
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        let rx = self.rx.as_ref().ok_or(FrameSourceError::Fatal {
            reason: "screencapture source not initialized".to_string(),
        })?;

        loop {
            match rx.try_recv() {
                Ok(frame) => self.last_frame = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(FrameSourceError::Fatal {
                        reason: "screencapture feed disconnected".to_string(),
                    })
                }
            }
        }

        match &self.last_frame {
            Some(frame) => Ok((frame.clone(), self.frame_delay)),
            None => Err(FrameSourceError::Transient {
                reason: "waiting for first screencapture frame".to_string(),
            }),
        }
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

    fn cleanup(&mut self) {
        self.rx = None;
        self.last_frame = None;
    }

    fn is_seekable(&self) -> bool {
        false
    }
}
