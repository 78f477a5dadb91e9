use std::sync::Mutex;
use std::time::Duration;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};

use crate::error::FrameSourceError;
use crate::frame::Frame;
use crate::frame_source::FrameSource;

/// Container-demuxed, sequentially-read video source. Grounded directly
/// on the teacher pack's `velocut-media` `LiveDecoder`: a stateful
/// decoder that keeps its demux/scale context open across frames rather
/// than reopening the file every call.
///
/// Sequential `next_frame` reads never take `seek_lock` ; only `seek`/`initialize`/`cleanup` do.
pub struct VideoDecodeSource {
    path: String,
    canvas: (u32, u32),
    decoder: Option<Decoder>,
    /// Guards non-sequential operations only; `next_frame` does not lock.
    seek_lock: Mutex<()>,
    exhausted: bool,
}

struct Decoder {
    ictx: ffmpeg::format::context::Input,
    video_idx: usize,
    decoder: ffmpeg::decoder::video::Video,
    scaler: SwsContext,
    tb_num: i32,
    tb_den: i32,
    last_pts: i64,
    fps: f32,
}

impl VideoDecodeSource {
    pub fn new(path: String, canvas: (u32, u32)) -> Self {
        Self {
            path,
            canvas,
            decoder: None,
            seek_lock: Mutex::new(()),
            exhausted: false,
        }
    }

    fn open(&self) -> Result<Decoder, FrameSourceError> {
        let fatal = |reason: String| FrameSourceError::Fatal { reason };

        let ictx = input(&self.path).map_err(|e| fatal(e.to_string()))?;
        let video_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| fatal("no video stream in file".to_string()))?
            .index();

        let (tb_num, tb_den) = {
            let stream = ictx.stream(video_idx).unwrap();
            let tb = stream.time_base();
            (tb.numerator(), tb.denominator())
        };
        let fps = {
            let stream = ictx.stream(video_idx).unwrap();
            let rate = stream.avg_frame_rate();
            if rate.denominator() != 0 {
                rate.numerator() as f32 / rate.denominator() as f32
            } else {
                30.0
            }
        };

        let ictx2 = input(&self.path).map_err(|e| fatal(e.to_string()))?;
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
            tb_num,
            tb_den,
            last_pts: -1,
            fps: fps.max(1.0),
        })
    }
}

impl FrameSource for VideoDecodeSource {
    fn initialize(&mut self) -> Result<(), FrameSourceError> {
        let _guard = self.seek_lock.lock().expect("video seek lock poisoned");
        self.decoder = Some(self.open()?);
        self.exhausted = false;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<(Frame, Duration), FrameSourceError> {
        let dec = self.decoder.as_mut().ok_or(FrameSourceError::Fatal {
            reason: "source not initialized".to_string(),
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
                let pts = decoded.pts().unwrap_or(dec.last_pts + 1);
                dec.last_pts = pts;

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

                let delay = Duration::from_secs_f32(1.0 / dec.fps);
                return Ok((Frame::new(out_w, out_h, data), delay));
            }
        }

        self.exhausted = true;
        Err(FrameSourceError::Exhausted)
    }

    fn reset(&mut self) -> Result<(), FrameSourceError> {
        self.seek(0)
    }

    fn seek(&mut self, target_frame: u64) -> Result<(), FrameSourceError> {
        let _guard = self.seek_lock.lock().expect("video seek lock poisoned");
        let dec = self.decoder.as_mut().ok_or(FrameSourceError::Fatal {
            reason: "source not initialized".to_string(),
        })?;
        let target_secs = target_frame as f64 / dec.fps as f64;
        let target_ts = (target_secs * dec.tb_den as f64 / dec.tb_num as f64) as i64;
        dec.ictx
            .seek(target_ts, ..=target_ts)
            .map_err(|e| FrameSourceError::Fatal { reason: e.to_string() })?;
        dec.last_pts = target_ts.saturating_sub(1);
        self.exhausted = false;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn cleanup(&mut self) {
        let _guard = self.seek_lock.lock().expect("video seek lock poisoned");
        self.decoder = None;
    }
}
