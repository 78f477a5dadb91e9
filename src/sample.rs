//! Sample Point Set: precomputed pixel → (universe, offset) mapping used
//! by the play loop to pull RGB values out of the rendered frame for
//! Art-Net transmission.
//!
//! Grounded on `fixtures/engine.rs`'s fixture-to-DMX pass
//! (`generate_dmx`): a per-universe byte buffer accumulated in a single
//! walk over a flat point list, rather than per-pixel branching deep in
//! a hot loop.

use std::collections::BTreeMap;

use crate::frame::Frame;

/// Art-Net limits a universe to 512 DMX channels; RGB sample points
/// consume 3 each, so at most 170 points address a single universe.
pub const MAX_CHANNELS_PER_UNIVERSE: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct SamplePoint {
    pub x: u32,
    pub y: u32,
    pub universe: u16,
    /// Pixel slot within the universe, in `0..170`; byte offset is `offset * 3`.
    pub offset: u16,
}

/// An ordered, precomputed set of sample points. Bounds-checking against
/// the canvas is done once at construction, not per frame .
pub struct SamplePointSet {
    points: Vec<SamplePoint>,
    in_range: Vec<bool>,
}

impl SamplePointSet {
    pub fn new(points: Vec<SamplePoint>, canvas: (u32, u32)) -> Self {
        let in_range = points
            .iter()
            .map(|p| p.x < canvas.0 && p.y < canvas.1)
            .collect();
        Self { points, in_range }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index `frame` at every in-range point in a single pass, producing
    /// one RGB byte buffer per universe (zero-filled for un-sampled
    /// channels). Out-of-range points are skipped silently -- the mask
    /// was precomputed exactly so this loop never re-checks bounds.
    pub fn extract(&self, frame: &Frame) -> BTreeMap<u16, Vec<u8>> {
        let mut universes: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
        for (point, &in_range) in self.points.iter().zip(self.in_range.iter()) {
            if !in_range {
                continue;
            }
            let (r, g, b) = frame.pixel(point.x, point.y);
            let buf = universes
                .entry(point.universe)
                .or_insert_with(|| vec![0u8; MAX_CHANNELS_PER_UNIVERSE]);
            let off = point.offset as usize * 3;
            if off + 2 < buf.len() {
                buf[off] = r;
                buf[off + 1] = g;
                buf[off + 2] = b;
            }
        }
        universes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: u32, y: u32, offset: u16) -> SamplePoint {
        SamplePoint { x, y, universe: 0, offset }
    }

    #[test]
    fn extracts_red_frame_into_universe_zero() {
        let frame = Frame::filled(64, 64, (255, 0, 0));
        let points = vec![point(0, 0, 0), point(10, 10, 1), point(20, 20, 2), point(30, 30, 3)];
        let set = SamplePointSet::new(points, (64, 64));
        let universes = set.extract(&frame);
        let buf = universes.get(&0).unwrap();
        assert_eq!(&buf[0..12], &[255, 0, 0, 255, 0, 0, 255, 0, 0, 255, 0, 0]);
    }

    #[test]
    fn out_of_range_points_are_skipped_not_panicking() {
        let frame = Frame::filled(8, 8, (10, 20, 30));
        let points = vec![SamplePoint { x: 100, y: 100, universe: 0, offset: 0 }];
        let set = SamplePointSet::new(points, (8, 8));
        let universes = set.extract(&frame);
        // No in-range point touched universe 0, so nothing is emitted for it.
        assert!(universes.get(&0).is_none());
    }

    #[test]
    fn points_partition_across_multiple_universes() {
        let frame = Frame::filled(4, 4, (1, 2, 3));
        let points = vec![
            SamplePoint { x: 0, y: 0, universe: 0, offset: 0 },
            SamplePoint { x: 1, y: 0, universe: 1, offset: 0 },
        ];
        let set = SamplePointSet::new(points, (4, 4));
        let universes = set.extract(&frame);
        assert_eq!(universes.len(), 2);
        assert_eq!(&universes[&0][0..3], &[1, 2, 3]);
        assert_eq!(&universes[&1][0..3], &[1, 2, 3]);
    }
}
