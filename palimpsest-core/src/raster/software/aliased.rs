use super::super::{Backend, Bitmap, DrawOp, Rasterizer};
use crate::util::Rect;

/// Hard-edged software rasterizer: a pixel is either inside a stroke or not. Holds no resources.
#[derive(Default)]
pub struct Aliased;
impl Aliased {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}
impl Rasterizer for Aliased {
    fn backend(&self) -> Backend {
        Backend::Aliased
    }
    fn draw(&mut self, target: &mut Bitmap, op: DrawOp<'_>, clip: Rect) {
        super::draw(target, op, clip, |depth| if depth >= 0.0 { 1.0 } else { 0.0 });
    }
    fn memory_footprint_bytes(&self, width: u32, height: u32) -> usize {
        Bitmap::byte_size(width, height)
    }
    fn check_sanity(&mut self) -> bool {
        super::super::sanity_pattern(self)
    }
    fn free(&mut self) {}
}
