use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::Duration;

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;

/// A live camera feed. Opening an OS camera device is out of scope for
/// this crate (no portable, dependency-light capture API in the stack);
/// a `WebcamSource` instead consumes frames pushed by an external
/// producer thread through a channel, the same "decouple acquisition
/// from consumption" shape the teacher uses for its background workers.
///
/// Never seekable and ignores `speed` entirely  -- every tick just asks for whatever the producer most
/// recently pushed.
pub struct WebcamSource {
    device: String,
    canvas: (u32, u32),
    rx: Option<Receiver<Frame>>,
    last_frame: Option<Frame>,
    frame_delay: Duration,
}

/// Handed to the external capture thread; it pushes frames here.
pub type WebcamFeed = Sender<Frame>;

impl WebcamSource {
    pub fn new(device: String, canvas: (u32, u32)) -> Self {
        Self {
            device,
            canvas,
            rx: None,
            last_frame: None,
            frame_delay: Duration::from_secs_f32(1.0 / 30.0),
        }
    }

    /// Attach the channel a capture thread will feed. Call before
    /// `initialize`.
    pub fn attach(&mut self, rx: Receiver<Frame>) {
        self.rx = Some(rx);
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl FrameSource for WebcamSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        if self.rx.is_none() {
            return Err(FrameSourceError::Fatal {
                reason: format!("webcam source '{}' has no attached feed", self.device),
            });
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        let rx = self.rx.as_ref().ok_or(FrameSourceError::Fatal {
            reason: "webcam source not initialized".to_string(),
        })?;

        loop {
            match rx.try_recv() {
                Ok(frame) => {
                    self.last_frame = Some(frame);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(FrameSourceError::Fatal {
                        reason: format!("webcam feed '{}' disconnected", self.device),
                    })
                }
            }
        }

        match &self.last_frame {
            Some(frame) => Ok((frame.clone(), self.frame_delay)),
            None => Err(FrameSourceError::Transient {
                reason: "waiting for first webcam frame".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn holds_last_frame_between_pushes() {
        let mut src = WebcamSource::new("test0".to_string(), (4, 4));
        let (tx, rx) = channel();
        src.attach(rx);
        src.initialize().unwrap();
        tx.send(Frame::filled(4, 4, (9, 9, 9))).unwrap();
        let (frame, _) = src.next_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), (9, 9, 9));
        let (frame2, _) = src.next_frame().unwrap();
        assert_eq!(frame2.pixel(0, 0), (9, 9, 9));
    }
}
