//! Art-Net sender: delta encoding, per-universe channel permutation,
//! and UDP emission .
//!
//! Grounded on the teacher's `artnet.rs` almost directly for the socket
//! lifecycle and packet-build call shape; the delta/permutation logic
//! itself is new (the teacher's fixture engine had no equivalent -- it
//! recomputed a full buffer from scratch every tick).

mod discovery;
mod packet;

pub use discovery::{ArtNetDiscovery, DiscoveredNode};
pub use packet::ARTNET_PORT;

use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ArtNetError;

/// One of the six orderings of the three color channels .
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl Default for ChannelOrder {
    fn default() -> Self {
        ChannelOrder::Rgb
    }
}

impl ChannelOrder {
    /// Reorder one RGB triplet for the wire. `permute` and its inverse
    /// are the same permutation applied twice where it matters: each of
    /// the six orderings is its own inverse on the index level used
    /// here, since every one is a transposition or identity of 3
    /// elements composed from at most two swaps.
    fn permute(self, rgb: [u8; 3]) -> [u8; 3] {
        let [r, g, b] = rgb;
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Rbg => [r, b, g],
            ChannelOrder::Grb => [g, r, b],
            ChannelOrder::Gbr => [g, b, r],
            ChannelOrder::Brg => [b, r, g],
            ChannelOrder::Bgr => [b, g, r],
        }
    }

    /// The permutation that undoes `permute` .
    pub fn inverse(self) -> ChannelOrder {
        match self {
            ChannelOrder::Rgb => ChannelOrder::Rgb,
            ChannelOrder::Rbg => ChannelOrder::Rbg,
            ChannelOrder::Grb => ChannelOrder::Gbr,
            ChannelOrder::Gbr => ChannelOrder::Grb,
            ChannelOrder::Brg => ChannelOrder::Brg,
            ChannelOrder::Bgr => ChannelOrder::Bgr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    pub net: u8,
    pub sub_universe: u8,
    pub channel_order: ChannelOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaConfig {
    pub enabled: bool,
    pub threshold: u8,
    pub full_frame_interval: u32,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self { enabled: true, threshold: 8, full_frame_interval: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtNetTargetConfig {
    pub target_ip: String,
    pub broadcast: bool,
    pub physical: u8,
}

impl Default for ArtNetTargetConfig {
    fn default() -> Self {
        Self { target_ip: "255.255.255.255".to_string(), broadcast: true, physical: 0 }
    }
}

struct DeltaState {
    last_sent: Option<Vec<u8>>,
    frames_since_full: u32,
}

impl DeltaState {
    fn new() -> Self {
        Self { last_sent: None, frames_since_full: 0 }
    }
}

/// Decision made for a universe on a given tick.
enum SendDecision {
    Send(Vec<u8>),
    Drop,
}

fn decide(state: &mut DeltaState, data: &[u8], delta: &DeltaConfig) -> SendDecision {
    if !delta.enabled {
        state.last_sent = Some(data.to_vec());
        state.frames_since_full = 0;
        return SendDecision::Send(data.to_vec());
    }

    let Some(prev) = &state.last_sent else {
        state.last_sent = Some(data.to_vec());
        state.frames_since_full = 0;
        return SendDecision::Send(data.to_vec());
    };

    state.frames_since_full += 1;
    if state.frames_since_full >= delta.full_frame_interval {
        state.last_sent = Some(data.to_vec());
        state.frames_since_full = 0;
        return SendDecision::Send(data.to_vec());
    }

    let max_diff = prev
        .iter()
        .zip(data.iter())
        .map(|(a, b)| (*a as i16 - *b as i16).unsigned_abs() as u8)
        .max()
        .unwrap_or(0);

    if max_diff < delta.threshold {
        SendDecision::Drop
    } else {
        state.last_sent = Some(data.to_vec());
        state.frames_since_full = 0;
        SendDecision::Send(data.to_vec())
    }
}

/// Owns the UDP socket, per-universe delta state, and sequence counter
/// . One `ArtNetSender` serves all universes for one player.
pub struct ArtNetSender {
    socket: UdpSocket,
    sequence: AtomicU8,
    target: Mutex<ArtNetTargetConfig>,
    delta: Mutex<DeltaConfig>,
    universes: Mutex<BTreeMap<u16, UniverseConfig>>,
    delta_state: Mutex<BTreeMap<u16, DeltaState>>,
    dropped_packets: AtomicU64,
    sent_packets: AtomicU64,
}

impl ArtNetSender {
    pub fn bind(target: ArtNetTargetConfig, delta: DeltaConfig) -> Result<Self, ArtNetError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| ArtNetError::BindFailed {
            addr: "0.0.0.0:0".to_string(),
            reason: e.to_string(),
        })?;
        socket.set_broadcast(target.broadcast).map_err(|e| ArtNetError::BindFailed {
            addr: "0.0.0.0:0".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            socket,
            sequence: AtomicU8::new(0),
            target: Mutex::new(target),
            delta: Mutex::new(delta),
            universes: Mutex::new(BTreeMap::new()),
            delta_state: Mutex::new(BTreeMap::new()),
            dropped_packets: AtomicU64::new(0),
            sent_packets: AtomicU64::new(0),
        })
    }

    pub fn set_universe_config(&self, universe: u16, config: UniverseConfig) {
        self.universes.lock().expect("universe map poisoned").insert(universe, config);
    }

    pub fn set_target(&self, target: ArtNetTargetConfig) {
        if let Ok(socket_broadcast) = self.socket.set_broadcast(target.broadcast) {
            let _ = socket_broadcast;
        }
        *self.target.lock().expect("target mutex poisoned") = target;
    }

    pub fn set_delta(&self, delta: DeltaConfig) {
        *self.delta.lock().expect("delta mutex poisoned") = delta;
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    pub fn sent_packets(&self) -> u64 {
        self.sent_packets.load(Ordering::Relaxed)
    }

    /// Emit one packet per universe, in ascending universe order .
    pub fn send_frame(&self, universes: &BTreeMap<u16, Vec<u8>>) -> Result<(), ArtNetError> {
        let target = self.target.lock().expect("target mutex poisoned").clone();
        let delta = self.delta.lock().expect("delta mutex poisoned").clone();
        let configs = self.universes.lock().expect("universe map poisoned");
        let mut states = self.delta_state.lock().expect("delta state mutex poisoned");

        let addr = format!("{}:{}", target.target_ip, ARTNET_PORT);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        for (&universe, data) in universes {
            let config = configs.get(&universe).cloned().unwrap_or(UniverseConfig {
                net: 0,
                sub_universe: universe as u8,
                channel_order: ChannelOrder::default(),
            });
            let state = states.entry(universe).or_insert_with(DeltaState::new);

            match decide(state, data, &delta) {
                SendDecision::Drop => {
                    self.dropped_packets.fetch_add(1, Ordering::Relaxed);
                }
                SendDecision::Send(raw) => {
                    let permuted = permute_payload(&raw, config.channel_order);
                    let packet = packet::build_opdmx_packet(
                        sequence,
                        target.physical,
                        config.sub_universe,
                        config.net,
                        &permuted,
                    );
                    self.socket
                        .send_to(&packet, &addr)
                        .map_err(|e| ArtNetError::NetworkTransient { reason: e.to_string() })?;
                    self.sent_packets.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Immediately zero every configured universe and send full frames
    /// .
    pub fn blackout(&self) -> Result<(), ArtNetError> {
        let universes: BTreeMap<u16, Vec<u8>> = self
            .universes
            .lock()
            .expect("universe map poisoned")
            .keys()
            .map(|&u| (u, vec![0u8; 512]))
            .collect();
        // Force a full send regardless of delta state.
        {
            let mut states = self.delta_state.lock().expect("delta state mutex poisoned");
            for u in universes.keys() {
                states.remove(u);
            }
        }
        self.send_frame(&universes)
    }
}

fn permute_payload(data: &[u8], order: ChannelOrder) -> Vec<u8> {
    data.chunks_exact(3)
        .flat_map(|c| order.permute([c[0], c[1], c[2]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grb_permutation_round_trips_through_its_inverse() {
        let original = [10u8, 20, 30];
        let permuted = ChannelOrder::Grb.permute(original);
        let restored = ChannelOrder::Grb.inverse().permute(permuted);
        assert_eq!(restored, original);
    }

    #[test]
    fn all_six_orderings_round_trip() {
        let original = [1u8, 2, 3];
        for order in [
            ChannelOrder::Rgb,
            ChannelOrder::Rbg,
            ChannelOrder::Grb,
            ChannelOrder::Gbr,
            ChannelOrder::Brg,
            ChannelOrder::Bgr,
        ] {
            let permuted = order.permute(original);
            assert_eq!(order.inverse().permute(permuted), original);
        }
    }

    #[test]
    fn delta_drop_law_holds_for_identical_frames() {
        let delta = DeltaConfig { enabled: true, threshold: 8, full_frame_interval: 30 };
        let mut state = DeltaState::new();
        let frame = vec![10u8; 512];

        let mut sends = 0;
        let mut drops = 0;
        for _ in 0..35 {
            match decide(&mut state, &frame, &delta) {
                SendDecision::Send(_) => sends += 1,
                SendDecision::Drop => drops += 1,
            }
        }
        assert_eq!(sends, 2, "expected a full send on frame 1 and frame 31");
        assert_eq!(drops, 33);
    }

    #[test]
    fn large_diff_forces_a_send_even_mid_interval() {
        let delta = DeltaConfig { enabled: true, threshold: 8, full_frame_interval: 30 };
        let mut state = DeltaState::new();
        let frame_a = vec![10u8; 512];
        let frame_b = vec![200u8; 512];

        assert!(matches!(decide(&mut state, &frame_a, &delta), SendDecision::Send(_)));
        assert!(matches!(decide(&mut state, &frame_b, &delta), SendDecision::Send(_)));
    }
}
