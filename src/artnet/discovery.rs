//! ArtPoll / ArtPollReply discovery: a background thread that
//! periodically broadcasts ArtPoll and records replying nodes.
//!
//! Grounded on `artnet.rs`'s `start_discovery` thread: same
//! poll-interval loop over a short-timeout socket, same
//! `discovered_nodes` map keyed by source IP.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artnet::packet::{build_artpoll_packet, parse_poll_reply, ARTNET_PORT};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredNode {
    pub ip: String,
    pub short_name: String,
    pub long_name: String,
    pub net: u8,
    pub sub_universe: u8,
    pub last_seen: DateTime<Utc>,
}

struct Shared {
    nodes: Mutex<HashMap<String, DiscoveredNode>>,
    running: std::sync::atomic::AtomicBool,
}

/// Owns the discovery thread's lifetime; dropping or calling `stop`
/// ends the poll loop on its next wake.
pub struct ArtNetDiscovery {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ArtNetDiscovery {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                nodes: Mutex::new(HashMap::new()),
                running: std::sync::atomic::AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        use std::sync::atomic::Ordering;
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(s) => s,
            Err(_) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return;
            }
        };
        let _ = socket.set_broadcast(true);
        let _ = socket.set_read_timeout(Some(Duration::from_millis(200)));

        let shared = self.shared.clone();
        let handle = std::thread::spawn(move || {
            let broadcast_addr = format!("255.255.255.255:{}", ARTNET_PORT);
            let poll_interval = Duration::from_secs(3);
            let mut last_poll = Instant::now() - poll_interval;
            let mut buf = [0u8; 1024];

            while shared.running.load(Ordering::SeqCst) {
                if last_poll.elapsed() >= poll_interval {
                    let _ = socket.send_to(&build_artpoll_packet(), &broadcast_addr);
                    last_poll = Instant::now();
                }

                match socket.recv_from(&mut buf) {
                    Ok((size, src)) => {
                        if let Some(reply) = parse_poll_reply(&buf[..size]) {
                            let ip = src.ip().to_string();
                            let node = DiscoveredNode {
                                ip: ip.clone(),
                                short_name: reply.short_name,
                                long_name: reply.long_name,
                                net: reply.net,
                                sub_universe: reply.sub_universe,
                                last_seen: Utc::now(),
                            };
                            shared.nodes.lock().expect("discovery node map poisoned").insert(ip, node);
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(_) => break,
                }
            }
        });

        *self.handle.lock().expect("discovery handle mutex poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.running.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn nodes(&self) -> Vec<DiscoveredNode> {
        self.shared
            .nodes
            .lock()
            .expect("discovery node map poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for ArtNetDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArtNetDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}
