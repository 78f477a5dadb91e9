//! Preview Streamer: a demand-gated JPEG push stream with
//! frame-identity dedup, served over a real binary WebSocket sink.
//!
//! Built from `tokio-tungstenite`'s `Message::Binary` as the wire type
//! and the `image` crate's JPEG encoder, in the condvar-gated
//! producer-loop idiom of `PatternPlaybackState::spawn_broadcaster`'s
//! background thread.
//!
//! Route wiring (accepting the upgrade, URL dispatch) is out of scope --
//! this module's public surface ends at [`PreviewStreamer::subscribe`],
//! whose [`SubscriptionHandle`] is a `Stream` of binary WebSocket
//! messages an external HTTP layer attaches to an accepted socket.

use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::config::PreviewConfig;
use crate::frame::Frame;

/// Bounded per-subscriber outbound queue; a full queue drops the
/// newest frame rather than blocking the producer .
const SUBSCRIBER_QUEUE_DEPTH: usize = 4;

struct Subscriber {
    tx: mpsc::Sender<Message>,
}

struct Shared {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscriber_id: AtomicU64,
    latest_frame: Mutex<Option<(u64, Frame)>>,
    last_encoded_tick: Mutex<u64>,
    active: AtomicBool,
    wake_mutex: Mutex<()>,
    wake_cv: Condvar,
    shutting_down: AtomicBool,
    config: PreviewConfig,
}

impl Shared {
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("preview subscriber map poisoned").len()
    }
}

/// Owns the subscriber set and the demand-gated producer thread
/// . One per player.
pub struct PreviewStreamer {
    shared: std::sync::Arc<Shared>,
    producer: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PreviewStreamer {
    pub fn new(config: PreviewConfig) -> std::sync::Arc<Self> {
        let shared = std::sync::Arc::new(Shared {
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            latest_frame: Mutex::new(None),
            last_encoded_tick: Mutex::new(u64::MAX),
            active: AtomicBool::new(false),
            wake_mutex: Mutex::new(()),
            wake_cv: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            config,
        });

        let producer_shared = shared.clone();
        let handle = std::thread::spawn(move || producer_loop(producer_shared));

        std::sync::Arc::new(Self {
            shared,
            producer: Mutex::new(Some(handle)),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }

    /// Register a new subscriber; bumps the reference count that drives
    /// `active` and wakes the producer loop if it was asleep.
    pub fn subscribe(&self) -> SubscriptionHandle {
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.shared
            .subscribers
            .lock()
            .expect("preview subscriber map poisoned")
            .insert(id, Subscriber { tx });
        self.shared.active.store(true, Ordering::Release);
        self.wake_producer();
        SubscriptionHandle {
            id,
            shared: self.shared.clone(),
            rx,
        }
    }

    fn wake_producer(&self) {
        let _guard = self.shared.wake_mutex.lock().expect("preview wake mutex poisoned");
        self.shared.wake_cv.notify_all();
    }

    /// The play loop calls this once per tick with `frame_video` . Cheap: an `Arc` bump plus a tick-counter store. The
    /// producer thread does the actual JPEG encode at its own adaptive
    /// rate, not on every call here.
    pub fn offer_frame(&self, frame: &Frame, tick: u64) {
        if self.shared.subscriber_count() == 0 {
            return;
        }
        *self.shared.latest_frame.lock().expect("preview latest frame poisoned") = Some((tick, frame.clone()));
    }
}

impl Drop for PreviewStreamer {
    fn drop(&mut self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        self.wake_producer();
        if let Some(handle) = self.producer.lock().expect("preview producer mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// A subscription to one player's preview stream; deregisters (and
/// decrements the reference count driving `active`) on drop.
pub struct SubscriptionHandle {
    id: u64,
    shared: std::sync::Arc<Shared>,
    rx: mpsc::Receiver<Message>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.shared
            .subscribers
            .lock()
            .expect("preview subscriber map poisoned")
            .remove(&self.id);
        if self.shared.subscriber_count() == 0 {
            self.shared.active.store(false, Ordering::Release);
        }
    }
}

impl Stream for SubscriptionHandle {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx.poll_recv(cx)
    }
}

fn producer_loop(shared: std::sync::Arc<Shared>) {
    loop {
        if shared.shutting_down.load(Ordering::Acquire) {
            return;
        }

        if !shared.active.load(Ordering::Acquire) {
            let guard = shared.wake_mutex.lock().expect("preview wake mutex poisoned");
            let _ = shared
                .wake_cv
                .wait_timeout(guard, Duration::from_millis(500))
                .expect("preview wake condvar poisoned");
            continue;
        }

        let subscriber_count = shared.subscriber_count();
        if subscriber_count == 0 {
            shared.active.store(false, Ordering::Release);
            continue;
        }

        let target_fps = (shared.config.base_fps_per_client * subscriber_count as f32)
            .min(shared.config.fps_cap)
            .max(1.0);
        let tick_interval = Duration::from_secs_f32(1.0 / target_fps);

        encode_and_broadcast_if_new(&shared);
        std::thread::sleep(tick_interval);
    }
}

fn encode_and_broadcast_if_new(shared: &Shared) {
    let frame = {
        let latest = shared.latest_frame.lock().expect("preview latest frame poisoned");
        match &*latest {
            Some((tick, frame)) => {
                let mut last_tick = shared.last_encoded_tick.lock().expect("preview last-tick poisoned");
                if *last_tick == *tick {
                    // Same frame identity as last encode: nothing changed
                    // since the player was paused or idle .
                    return;
                }
                *last_tick = *tick;
                frame.clone()
            }
            None => return,
        }
    };

    let jpeg_bytes = match encode_jpeg(&frame, shared.config.quality.jpeg_quality()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("preview JPEG encode failed: {}", e);
            return;
        }
    };

    let message = Message::Binary(jpeg_bytes.into());
    let subscribers = shared.subscribers.lock().expect("preview subscriber map poisoned");
    for subscriber in subscribers.values() {
        // Silent drop on a full queue -- the producer never blocks on
        // the slowest consumer .
        let _ = subscriber.tx.try_send(message.clone());
    }
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    encoder
        .encode(frame.as_bytes(), frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PreviewConfig {
        PreviewConfig {
            quality: crate::config::PreviewQuality::Low,
            base_fps_per_client: 5.0,
            fps_cap: 30.0,
        }
    }

    #[test]
    fn a_fresh_streamer_has_no_subscribers() {
        let streamer = PreviewStreamer::new(config());
        assert_eq!(streamer.subscriber_count(), 0);
    }

    #[test]
    fn subscribing_increments_the_count_and_dropping_decrements_it() {
        let streamer = PreviewStreamer::new(config());
        let handle = streamer.subscribe();
        assert_eq!(streamer.subscriber_count(), 1);
        drop(handle);
        // Give the drop a moment to run (it is synchronous, but be
        // generous against scheduling jitter in CI).
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(streamer.subscriber_count(), 0);
    }

    #[test]
    fn offering_a_frame_with_no_subscribers_does_not_panic() {
        let streamer = PreviewStreamer::new(config());
        let frame = Frame::filled(4, 4, (1, 2, 3));
        streamer.offer_frame(&frame, 0);
    }

    #[test]
    fn jpeg_encoding_round_trips_dimensions() {
        let frame = Frame::filled(16, 16, (10, 20, 30));
        let bytes = encode_jpeg(&frame, 80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);
    }
}
