use std::sync::Arc;

use super::super::{cache, Backend, Bitmap, DrawOp, Rasterizer};
use crate::util::Rect;

/// Samples of the edge falloff table, covering depths `[-0.5, 0.5]` pixels.
const TABLE_SAMPLES: usize = 256;

/// Anti-aliased software rasterizer. Edge coverage is looked up from a smoothstep falloff table held in the
/// process-wide [`cache`].
pub struct Smooth {
    handle: cache::BackendHandle,
    /// Local hold on the shared table, None until first use or after [`Rasterizer::free`].
    falloff: Option<Arc<[f32]>>,
}
impl Smooth {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: cache::BackendHandle::default(),
            falloff: None,
        }
    }
    fn build_falloff() -> Vec<f32> {
        #[allow(clippy::cast_precision_loss)]
        (0..TABLE_SAMPLES)
            .map(|idx| {
                let t = idx as f32 / (TABLE_SAMPLES - 1) as f32;
                t * t * (3.0 - 2.0 * t)
            })
            .collect()
    }
    fn falloff(&mut self) -> Arc<[f32]> {
        let handle = self.handle;
        self.falloff
            .get_or_insert_with(|| cache::acquire(handle, Self::build_falloff))
            .clone()
    }
}
impl Default for Smooth {
    fn default() -> Self {
        Self::new()
    }
}
impl Rasterizer for Smooth {
    fn backend(&self) -> Backend {
        Backend::Smooth
    }
    fn draw(&mut self, target: &mut Bitmap, op: DrawOp<'_>, clip: Rect) {
        let falloff = self.falloff();
        super::draw(target, op, clip, |depth| {
            use az::SaturatingAs;
            if depth >= 0.5 {
                1.0
            } else if depth <= -0.5 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let idx: usize = ((depth + 0.5) * (TABLE_SAMPLES - 1) as f32)
                    .round()
                    .saturating_as();
                falloff.get(idx).copied().unwrap_or(1.0)
            }
        });
    }
    fn memory_footprint_bytes(&self, width: u32, height: u32) -> usize {
        Bitmap::byte_size(width, height)
    }
    fn check_sanity(&mut self) -> bool {
        let falloff = self.falloff();
        let table_ok = falloff.len() == TABLE_SAMPLES
            && falloff.first() == Some(&0.0)
            && falloff.last() == Some(&1.0)
            && falloff.windows(2).all(|pair| pair[0] <= pair[1]);
        table_ok && super::super::sanity_pattern(self)
    }
    fn free(&mut self) {
        self.falloff = None;
        cache::release(self.handle);
    }
}
impl Drop for Smooth {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn table_lifecycle() {
        let mut smooth = Smooth::new();
        assert!(!cache::is_held(smooth.handle));
        assert!(smooth.check_sanity());
        assert!(cache::is_held(smooth.handle));
        assert!(cache::held_bytes(smooth.handle) > 0);
        smooth.free();
        assert!(!cache::is_held(smooth.handle));
    }
}
