//! The canvas frame type shared by frame sources, effects, the
//! compositor, the sampler and the preview encoder.

use std::sync::Arc;

/// An RGB frame: `width * height * 3` bytes, row-major, no padding.
///
/// `data` is `Arc`-wrapped so the zero-copy contract between target chains can
/// be satisfied literally: when both target chains alias the same frame, they
/// clone this struct (cheap, an `Arc` bump) rather than the backing bytes.
/// A mutation site that needs exclusive access calls [`Frame::make_mut`],
/// which clones the bytes only if another alias is outstanding.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    data: Arc<Vec<u8>>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    pub fn filled(width: u32, height: u32, rgb: (u8, u8, u8)) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 3];
        for px in data.chunks_exact_mut(3) {
            px[0] = rgb.0;
            px[1] = rgb.1;
            px[2] = rgb.2;
        }
        Self::new(width, height, data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns true if this frame shares its backing storage with `other`.
    /// Used by tests to verify the zero-copy contract .
    pub fn shares_storage_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Get mutable access to the backing bytes, cloning them first if this
    /// frame's storage is shared with another alias.
    pub fn make_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data)
    }

    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_storage_until_mutated() {
        let a = Frame::filled(4, 4, (1, 2, 3));
        let b = a.clone();
        assert!(a.shares_storage_with(&b));

        let mut c = b.clone();
        c.make_mut()[0] = 9;
        assert!(!a.shares_storage_with(&c));
        assert!(a.shares_storage_with(&b));
    }
}
