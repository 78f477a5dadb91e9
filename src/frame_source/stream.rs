use std::time::Duration;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;

/// A network stream (RTSP/HLS/etc). Shares `VideoDecodeSource`'s
/// ffmpeg-the-third decode path (grounded on the teacher pack's
/// `velocut-media` `LiveDecoder`) but drops seek support: a live stream
/// has no stable frame index to seek back to, so it always ignores
/// `speed` and advances one source-frame per tick .
pub struct StreamSource {
    url: String,
    canvas: (u32, u32),
    decoder: Option<Decoder>,
    exhausted: bool,
}

struct Decoder {
    ictx: ffmpeg::format::context::Input,
    video_idx: usize,
    decoder: ffmpeg::decoder::video::Video,
    scaler: SwsContext,
    fps: f32,
}

impl StreamSource {
    pub fn new(url: String, canvas: (u32, u32)) -> Self {
        Self {
            url,
            canvas,
            decoder: None,
            exhausted: false,
        }
    }

    fn open(&self) -> Result<Decoder, FrameSourceError> {
        let fatal = |reason: String| FrameSourceError::Fatal { reason };

        let ictx = input(&self.url).map_err(|e| fatal(e.to_string()))?;
        let video_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| fatal("stream has no video track".to_string()))?
            .index();

        let fps = {
            let stream = ictx.stream(video_idx).unwrap();
            let rate = stream.avg_frame_rate();
            if rate.denominator() != 0 {
                rate.numerator() as f32 / rate.denominator() as f32
            } else {
                30.0
            }
        };

        let ictx2 = input(&self.url).map_err(|e| fatal(e.to_string()))?;
        let stream2 = ictx2.stream(video_idx).unwrap();
        let dec_ctx = ffmpeg::codec::context::Context::from_parameters(stream2.parameters())
            .map_err(|e| fatal(e.to_string()))?;
        let decoder = dec_ctx.decoder().video().map_err(|e| fatal(e.to_string()))?;

        let (out_w, out_h) = self.canvas;
        let scaler = SwsContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            out_w,
            out_h,
            Flags::BILINEAR,
        )
        .map_err(|e| fatal(e.to_string()))?;

        Ok(Decoder {
            ictx,
            video_idx,
            decoder,
            scaler,
            fps: fps.max(1.0),
        })
    }
}

impl FrameSource for StreamSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        self.decoder = Some(self.open()?);
        self.exhausted = false;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        let dec = self.decoder.as_mut().ok_or(FrameSourceError::Fatal {
            reason: "stream source not initialized".to_string(),
        })?;

        let (out_w, out_h) = self.canvas;
        for (stream, packet) in dec.ictx.packets().flatten() {
            if stream.index() != dec.video_idx {
                continue;
            }
            if dec.decoder.send_packet(&packet).is_err() {
                return Err(FrameSourceError::Transient {
                    reason: "decoder rejected packet".to_string(),
                });
            }
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            while dec.decoder.receive_frame(&mut decoded).is_ok() {
                let mut out = ffmpeg::util::frame::video::Video::empty();
                if dec.scaler.run(&decoded, &mut out).is_err() {
                    return Err(FrameSourceError::Transient {
                        reason: "scaler failed on decoded frame".to_string(),
                    });
                }
                let stride = out.stride(0);
                let raw = out.data(0);
                let data: Vec<u8> = (0..out_h as usize)
                    .flat_map(|row| {
                        let s = row * stride;
                        &raw[s..s + out_w as usize * 3]
                    })
                    .copied()
                    .collect();

                return Ok((Frame::new(out_w, out_h, data), Duration::from_secs_f32(1.0 / dec.fps)));
            }
        }

        // A live stream going dry is transient, not terminal -- the caller
        // should keep polling rather than tear the source down.
        Err(FrameSourceError::Transient {
            reason: format!("no packets available from '{}'", self.url),
        })
    }

    fn reset(&mut self) -> Result<(), FrameSourceError> {
        self.initialize()
    }

    fn seek(&mut self, target_frame: u64) -> Result<(), FrameSourceError> {
        Err(FrameSourceError::SeekOutOfRange { target: target_frame, len: 0 })
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn cleanup(&mut self) {
        self.decoder = None;
    }

    fn is_seekable(&self) -> bool {
        false
    }
}
