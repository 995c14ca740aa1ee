//! # Rasterization
//!
//! The document never touches pixels itself - it sequences [`Rasterizer`] calls and measures the memory
//! they cost. Backends are independent implementations of that one capability, picked by [`Backend`] when a
//! document is created.

mod bitmap;
pub mod cache;
pub mod software;

pub use bitmap::Bitmap;

use crate::{
    event::{Gradient, Stroke},
    util::Rect,
};

/// One unit of drawing work.
#[derive(Clone, Copy, Debug)]
pub enum DrawOp<'a> {
    Stroke(&'a Stroke),
    Gradient(&'a Gradient),
    /// Blend another layer's pixels on top, as a merge does.
    Composite { source: &'a Bitmap, opacity: f32 },
}

pub trait Rasterizer {
    /// Which backend this is.
    fn backend(&self) -> Backend;
    /// Draw `op` into `target`, touching only pixels within `clip`.
    fn draw(&mut self, target: &mut Bitmap, op: DrawOp<'_>, clip: Rect);
    /// Bytes one target bitmap of the given size costs with this backend.
    fn memory_footprint_bytes(&self, width: u32, height: u32) -> usize;
    /// Draw a synthetic pattern and check coverage and alpha come out right.
    /// A backend failing this is unusable.
    fn check_sanity(&mut self) -> bool;
    /// Release backing resources. The rasterizer may be used again afterwards, re-acquiring them lazily.
    fn free(&mut self);
}

/// Available rasterizer implementations.
#[derive(
    strum::AsRefStr,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Anti-aliased edges.
    #[default]
    Smooth,
    /// Hard edges. Cheaper, and exact.
    Aliased,
}
impl Backend {
    /// Create a fresh, unchecked instance of this backend.
    #[must_use]
    pub fn create(self) -> Box<dyn Rasterizer> {
        match self {
            Self::Smooth => Box::new(software::Smooth::new()),
            Self::Aliased => Box::new(software::Aliased::new()),
        }
    }
}

/// Shared sanity pattern. Returns true if the backend drew it acceptably.
pub(crate) fn sanity_pattern(rasterizer: &mut dyn Rasterizer) -> bool {
    use crate::{blend::BlendMode, color::Color, event::StrokePoint, util::FiniteF32};
    const SIZE: u32 = 16;
    const EPSILON: f32 = 1.0e-4;

    let mut bitmap = Bitmap::new(SIZE, SIZE, Color::TRANSPARENT, true);
    let Some(center) = StrokePoint::new(8.0, 8.0, 1.0) else {
        return false;
    };
    let dab = Stroke {
        points: vec![center],
        radius: FiniteF32::new(4.0).unwrap_or(FiniteF32::ONE),
        color: Color::WHITE,
        opacity: FiniteF32::ONE,
        blend: BlendMode::Normal,
    };
    let bounds = bitmap.bounds();
    rasterizer.draw(&mut bitmap, DrawOp::Stroke(&dab), bounds);

    let well_formed = bitmap.pixels().iter().all(|&[r, g, b, a]| {
        (-EPSILON..=1.0 + EPSILON).contains(&a)
            && [r, g, b].iter().all(|&c| c >= -EPSILON && c <= a + EPSILON)
    });
    let center_covered = bitmap
        .get(8, 8)
        .is_some_and(|[.., a]| (a - 1.0).abs() < EPSILON);
    let corner_empty = bitmap.get(0, 0).is_some_and(|[.., a]| a == 0.0);

    // Clipping must be honored.
    let mut clipped = Bitmap::new(SIZE, SIZE, Color::TRANSPARENT, true);
    rasterizer.draw(&mut clipped, DrawOp::Stroke(&dab), Rect::new(0, 0, 8, 16));
    let clip_honored = clipped.get(9, 8).is_some_and(|[.., a]| a == 0.0)
        && clipped.get(7, 8).is_some_and(|[.., a]| a > 0.0);

    well_formed && center_covered && corner_empty && clip_honored
}

#[cfg(test)]
mod test {
    use super::Backend;
    #[test]
    fn every_backend_is_sane() {
        use strum::IntoEnumIterator;
        for backend in Backend::iter() {
            let mut rasterizer = backend.create();
            assert_eq!(rasterizer.backend(), backend);
            assert!(rasterizer.check_sanity(), "{backend:?} failed sanity check");
            rasterizer.free();
        }
    }
    #[test]
    fn backend_names() {
        assert_eq!("aliased".parse::<Backend>().unwrap(), Backend::Aliased);
        assert_eq!(Backend::Smooth.as_ref(), "smooth");
    }
}
