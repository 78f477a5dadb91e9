//! Pluggable producers of RGB frames .
//!
//! Every variant implements [`FrameSource`]: `initialize`, `next_frame`,
//! `reset`, `seek`, `is_exhausted`, `cleanup`. Locking discipline :
//! sequential reads (`next_frame`) never take a lock; only the
//! non-sequential operations do, so the multi-layer compositor can block
//! on a seek without stalling every other layer's steady-state reads.

mod generator;
mod null;
mod screencapture;
mod stream;
mod video;
mod webcam;

pub use generator::GeneratorSource;
pub use null::NullSource;
pub use screencapture::ScreencaptureSource;
pub use stream::StreamSource;
pub use video::VideoDecodeSource;
pub use webcam::WebcamSource;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::plugin::PluginRegistry;
use crate::value::ParamValue;

/// A serializable descriptor for a frame source -- what gets persisted
/// in a Clip / Layer Spec and round-tripped through a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSourceSpec {
    VideoDecode { path: String },
    Generator { plugin_id: String, params: BTreeMap<String, ParamValue> },
    Webcam { device: String },
    Stream { url: String },
    Screencapture { x: i32, y: i32, width: u32, height: u32 },
    Null,
}

pub trait FrameSource: Send {
    fn initialize(&mut self) -> Result<(), FrameSourceError>;

    /// Produce the next frame and the delay the caller should target
    /// before requesting another one.
    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError>;

    fn reset(&mut self) -> Result<(), FrameSourceError>;

    fn seek(&mut self, target_frame: u64) -> Result<(), FrameSourceError>;

    fn is_exhausted(&self) -> bool;

    fn cleanup(&mut self);

    /// Non-seekable sources (live camera/screen/stream feeds) ignore
    /// `speed` entirely .
    fn is_seekable(&self) -> bool {
        true
    }
}

/// Build a frame source from its descriptor, given the engine canvas
/// dimensions and the plugin registry (for `Generator` sources).
pub fn build(
    spec: &FrameSourceSpec,
    canvas: (u32, u32),
    registry: &PluginRegistry,
    default_fps: f32,
) -> Result<Box<dyn FrameSource>, FrameSourceError> {
    match spec {
        FrameSourceSpec::VideoDecode { path } => {
            Ok(Box::new(VideoDecodeSource::new(path.clone(), canvas)))
        }
        FrameSourceSpec::Generator { plugin_id, params } => {
            let resolved = registry
                .validate_params(plugin_id, params)
                .map_err(|e| FrameSourceError::Fatal {
                    reason: e.to_string(),
                })?;
            let instance = registry
                .instantiate_generator(plugin_id)
                .map_err(|e| FrameSourceError::Fatal {
                    reason: e.to_string(),
                })?;
            Ok(Box::new(GeneratorSource::new(
                instance,
                resolved,
                canvas,
                default_fps,
            )))
        }
        FrameSourceSpec::Webcam { device } => Ok(Box::new(WebcamSource::new(device.clone(), canvas))),
        FrameSourceSpec::Stream { url } => Ok(Box::new(StreamSource::new(url.clone(), canvas))),
        FrameSourceSpec::Screencapture { x, y, width, height } => {
            Ok(Box::new(ScreencaptureSource::new(*x, *y, *width, *height)))
        }
        FrameSourceSpec::Null => Ok(Box::new(NullSource::new(canvas, default_fps))),
    }
}
