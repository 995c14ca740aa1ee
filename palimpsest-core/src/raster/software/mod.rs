//! CPU rasterizers. They share the geometry below but nothing else - each backend decides its own edge
//! coverage and owns its own resources.

mod aliased;
mod smooth;

pub use aliased::Aliased;
pub use smooth::Smooth;

use super::{Bitmap, DrawOp};
use crate::{
    event::{Gradient, Stroke},
    util::Rect,
};

/// Pixels the stroke could possibly touch, before clipping.
fn stroke_bounds(stroke: &Stroke) -> Option<Rect> {
    let radius = stroke.radius.get();
    let mut points = stroke.points.iter().map(crate::event::StrokePoint::position);
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(min, max), [x, y]| {
        ([min[0].min(x), min[1].min(y)], [max[0].max(x), max[1].max(y)])
    });
    // Pad by the radius plus a pixel of edge falloff.
    let pad = radius + 1.0;
    Some(Rect::from_float_bounds(
        [min[0] - pad, min[1] - pad],
        [max[0] + pad, max[1] + pad],
    ))
}

/// Signed distance from `p` to the edge of the stroke's capsule chain. Positive inside.
fn stroke_depth(stroke: &Stroke, p: [f32; 2]) -> f32 {
    // Very thin strokes still cover something.
    const MIN_RADIUS: f32 = 0.5;
    let radius = stroke.radius.get();
    let radius_at = |pressure: f32| (radius * pressure).max(MIN_RADIUS);

    match stroke.points.as_slice() {
        [] => f32::NEG_INFINITY,
        [only] => {
            let [x, y] = only.position();
            radius_at(only.pressure.get()) - (p[0] - x).hypot(p[1] - y)
        }
        points => points
            .windows(2)
            .map(|pair| {
                let (a, b) = (pair[0].position(), pair[1].position());
                let ab = [b[0] - a[0], b[1] - a[1]];
                let ap = [p[0] - a[0], p[1] - a[1]];
                let len2 = ab[0] * ab[0] + ab[1] * ab[1];
                let t = if len2 > 0.0 {
                    ((ap[0] * ab[0] + ap[1] * ab[1]) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let closest = [a[0] + ab[0] * t, a[1] + ab[1] * t];
                let r = radius_at(
                    pair[0].pressure.get() * (1.0 - t) + pair[1].pressure.get() * t,
                );
                r - (p[0] - closest[0]).hypot(p[1] - closest[1])
            })
            .fold(f32::NEG_INFINITY, f32::max),
    }
}

/// Write a premultiplied, coverage-scaled source color into one pixel.
fn blend_into(target: &mut Bitmap, x: u32, y: u32, blend: crate::blend::BlendMode, src: [f32; 4]) {
    let has_alpha = target.has_alpha();
    let clear = target.clear_color();
    let Some(dst) = target.get_mut(x, y) else {
        return;
    };
    if !has_alpha && blend == crate::blend::BlendMode::Erase {
        // Nothing to reveal but the clear color.
        let amount = src[3];
        for c in 0..4 {
            dst[c] = dst[c] * (1.0 - amount) + clear[c] * amount;
        }
        return;
    }
    *dst = blend.apply(src, *dst);
    if !has_alpha {
        dst[3] = 1.0;
    }
}

/// Rasterize a stroke given the backend's mapping from edge depth to coverage.
fn draw_stroke(target: &mut Bitmap, stroke: &Stroke, clip: Rect, coverage: impl Fn(f32) -> f32) {
    let Some(bounds) = stroke_bounds(stroke) else {
        return;
    };
    let region = bounds.intersect(&clip).intersect(&target.bounds());
    let opacity = stroke.opacity.get();
    let color = stroke.color.as_array();
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            #[allow(clippy::cast_precision_loss)]
            let center = [x as f32 + 0.5, y as f32 + 0.5];
            let cover = coverage(stroke_depth(stroke, center)) * opacity;
            if cover <= 0.0 {
                continue;
            }
            blend_into(target, x, y, stroke.blend, color.map(|c| c * cover));
        }
    }
}

fn draw_gradient(target: &mut Bitmap, gradient: &Gradient, clip: Rect) {
    let region = clip.intersect(&target.bounds());
    let from = gradient.from.map(crate::util::FiniteF32::get);
    let to = gradient.to.map(crate::util::FiniteF32::get);
    let dir = [to[0] - from[0], to[1] - from[1]];
    let len2 = dir[0] * dir[0] + dir[1] * dir[1];
    let from_color = gradient.from_color.as_array();
    let to_color = gradient.to_color.as_array();
    let opacity = gradient.opacity.get();
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            #[allow(clippy::cast_precision_loss)]
            let p = [x as f32 + 0.5 - from[0], y as f32 + 0.5 - from[1]];
            // Degenerate gradients are solid `to_color`.
            let t = if len2 > 0.0 {
                ((p[0] * dir[0] + p[1] * dir[1]) / len2).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let mut src = [0.0; 4];
            for c in 0..4 {
                src[c] = (from_color[c] * (1.0 - t) + to_color[c] * t) * opacity;
            }
            blend_into(target, x, y, gradient.blend, src);
        }
    }
}

fn draw_composite(target: &mut Bitmap, source: &Bitmap, opacity: f32, clip: Rect) {
    let region = clip.intersect(&target.bounds()).intersect(&source.bounds());
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let Some(src) = source.get(x, y) else {
                continue;
            };
            blend_into(
                target,
                x,
                y,
                crate::blend::BlendMode::Normal,
                src.map(|c| c * opacity),
            );
        }
    }
}

/// Shared dispatch - backends differ only in how stroke edges are covered.
fn draw(target: &mut Bitmap, op: DrawOp<'_>, clip: Rect, coverage: impl Fn(f32) -> f32) {
    match op {
        DrawOp::Stroke(stroke) => draw_stroke(target, stroke, clip, coverage),
        DrawOp::Gradient(gradient) => draw_gradient(target, gradient, clip),
        DrawOp::Composite { source, opacity } => draw_composite(target, source, opacity, clip),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{blend::BlendMode, color::Color, event::StrokePoint, util::FiniteF32};

    fn line() -> Stroke {
        Stroke {
            points: vec![
                StrokePoint::new(2.0, 5.0, 1.0).unwrap(),
                StrokePoint::new(12.0, 5.0, 1.0).unwrap(),
            ],
            radius: FiniteF32::new(2.0).unwrap(),
            color: Color::BLACK,
            opacity: FiniteF32::ONE,
            blend: BlendMode::Normal,
        }
    }
    #[test]
    fn depth_along_segment() {
        let stroke = line();
        // On the spine.
        assert!((stroke_depth(&stroke, [7.0, 5.0]) - 2.0).abs() < 1e-5);
        // Past the end cap.
        assert!(stroke_depth(&stroke, [20.0, 5.0]) < 0.0);
    }
    #[test]
    fn bounds_cover_caps() {
        let bounds = stroke_bounds(&line()).unwrap();
        assert!(bounds.contains(0, 3));
        assert!(bounds.contains(14, 7));
        assert!(!bounds.contains(20, 5));
    }
    #[test]
    fn opaque_layers_stay_opaque() {
        let mut bitmap = Bitmap::new(16, 16, Color::WHITE, false);
        let mut eraser = line();
        eraser.blend = BlendMode::Erase;
        let bounds = bitmap.bounds();
        draw(&mut bitmap, DrawOp::Stroke(&eraser), bounds, |d| {
            if d >= 0.0 {
                1.0
            } else {
                0.0
            }
        });
        assert!(bitmap.pixels().iter().all(|px| px[3] == 1.0));
        assert_eq!(bitmap.get(7, 5), Some([1.0; 4]));
    }
    #[test]
    fn gradient_ramps() {
        let mut bitmap = Bitmap::new(8, 1, Color::TRANSPARENT, true);
        let gradient = Gradient {
            from: [FiniteF32::ZERO, FiniteF32::ZERO],
            to: [FiniteF32::new(8.0).unwrap(), FiniteF32::ZERO],
            from_color: Color::BLACK,
            to_color: Color::WHITE,
            opacity: FiniteF32::ONE,
            blend: BlendMode::Normal,
        };
        let bounds = bitmap.bounds();
        draw_gradient(&mut bitmap, &gradient, bounds);
        let left = bitmap.get(0, 0).unwrap();
        let right = bitmap.get(7, 0).unwrap();
        assert!(left[0] < right[0]);
        assert_eq!(left[3], 1.0);
    }
}
