//! Read-only views of a document's pixels: the composited picture, historical layer states, and blame.

use smallvec::SmallVec;

use super::{Chain, Document, DocumentError};
use crate::{
    color::Color,
    event::{EventId, EventKind, LayerId},
    raster::{Bitmap, DrawOp, Rasterizer},
    state::layer::Layer,
    util::Rect,
};

/// Premultiplied half-transparent gray. Any blend mode drawing anything changes it.
const PROBE_BACKGROUND: [f32; 4] = [0.25, 0.25, 0.25, 0.5];

/// A scratch pixel for testing whether a drawing operation touches it.
struct Probe {
    bitmap: Bitmap,
    x: u32,
    y: u32,
}
impl Probe {
    fn new(x: u32, y: u32) -> Self {
        Self {
            bitmap: Bitmap::window(Rect::pixel(x, y), Color::TRANSPARENT, true),
            x,
            y,
        }
    }
    fn touched_by(&mut self, rasterizer: &mut dyn Rasterizer, op: DrawOp<'_>) -> bool {
        let Some(pixel) = self.bitmap.get_mut(self.x, self.y) else {
            return false;
        };
        *pixel = PROBE_BACKGROUND;
        rasterizer.draw(&mut self.bitmap, op, Rect::pixel(self.x, self.y));
        self.bitmap
            .get(self.x, self.y)
            .is_some_and(|pixel| pixel != PROBE_BACKGROUND)
    }
}

/// Effective drawing events of `id` touching the probe, newest first. Follows merges into merged layers.
fn blame_layer(
    layers: &hashbrown::HashMap<LayerId, Layer>,
    rasterizer: &mut dyn Rasterizer,
    id: LayerId,
    probe: &mut Probe,
    found: &mut SmallVec<[EventId; 4]>,
    chain: &mut Chain,
) {
    let Some(layer) = layers.get(&id) else {
        return;
    };
    if chain.contains(&id) {
        return;
    }
    chain.push(id);
    let history = layer.history();
    let hidden = history.hidden();
    for event in history.iter().rev() {
        if !history.is_effective(event.index, &hidden) {
            continue;
        }
        let op = match &event.event.kind {
            EventKind::Stroke(stroke) => DrawOp::Stroke(stroke),
            EventKind::Gradient(gradient) => DrawOp::Gradient(gradient),
            EventKind::LayerMerge {
                merged, opacity, ..
            } => {
                if opacity.get() > 0.0 {
                    blame_layer(layers, rasterizer, *merged, probe, found, chain);
                }
                continue;
            }
            _ => continue,
        };
        if probe.touched_by(rasterizer, op) {
            found.push(event.event.id);
        }
    }
    chain.pop();
}

impl Document {
    /// Blend every present, visible layer bottom to top, each at its display opacity.
    pub fn composite(&mut self) -> Bitmap {
        let mut out = Bitmap::new(self.width, self.height, Color::TRANSPARENT, true);
        let bounds = out.bounds();
        let Self {
            layers,
            stack,
            rasterizer,
            ..
        } = self;
        for id in stack.order().iter().rev() {
            let Some(layer) = layers.get(id) else {
                continue;
            };
            if !layer.is_present() || !layer.visible() {
                continue;
            }
            match layer.bitmap() {
                Some(source) => rasterizer.draw(
                    &mut out,
                    DrawOp::Composite {
                        source,
                        opacity: layer.opacity(),
                    },
                    bounds,
                ),
                None => log::error!("{id} is present but not resident"),
            }
        }
        out
    }
    /// A layer as it looked after its first `log_index` events, under the current undo state.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn render_layer_at(&mut self, id: LayerId, log_index: usize) -> Result<Bitmap, DocumentError> {
        self.prepare_sources(id, None)?;
        let bitmap = self.with_layer(id, |layer, replay| layer.render_at(log_index, replay))?;
        self.rebalance();
        Ok(bitmap)
    }
    /// Events whose pixels cover `(x, y)`: the top visible layer first, newest event first. Events of layers
    /// merged into another are listed where the merge happened.
    pub fn blame(&mut self, x: u32, y: u32) -> SmallVec<[EventId; 4]> {
        let mut found = SmallVec::new();
        if x >= self.width || y >= self.height {
            return found;
        }
        let mut probe = Probe::new(x, y);
        let Self {
            layers,
            stack,
            rasterizer,
            ..
        } = self;
        for &id in stack.order() {
            if layers
                .get(&id)
                .is_some_and(|layer| layer.is_present() && layer.visible())
            {
                blame_layer(
                    layers,
                    rasterizer.as_mut(),
                    id,
                    &mut probe,
                    &mut found,
                    &mut Chain::new(),
                );
            }
        }
        found
    }
}

#[cfg(test)]
mod test {
    use crate::{
        blend::BlendMode,
        color::Color,
        config::DocumentConfig,
        event::{LayerId, Stroke, StrokePoint},
        raster::Backend,
        state::Document,
        util::FiniteF32,
    };

    fn stroke(x: f32, blend: BlendMode) -> Stroke {
        Stroke {
            points: vec![
                StrokePoint::new(x, 0.0, 1.0).unwrap(),
                StrokePoint::new(x, 16.0, 1.0).unwrap(),
            ],
            radius: FiniteF32::new(1.0).unwrap(),
            color: Color::from_straight(1.0, 0.0, 0.0, 1.0).unwrap(),
            opacity: FiniteF32::ONE,
            blend,
        }
    }

    #[test]
    fn blame_orders_and_follows_merges() {
        let mut document =
            Document::new(16, 16, Backend::Aliased, DocumentConfig::default()).unwrap();
        document.add_layer(LayerId(0), Color::TRANSPARENT, true).unwrap();
        document.add_layer(LayerId(1), Color::TRANSPARENT, true).unwrap();
        let below = document.draw_stroke(LayerId(0), stroke(4.5, BlendMode::Normal)).unwrap();
        let elsewhere = document.draw_stroke(LayerId(0), stroke(12.5, BlendMode::Normal)).unwrap();
        let erase = document.draw_stroke(LayerId(1), stroke(4.5, BlendMode::Erase)).unwrap();
        let above = document.draw_stroke(LayerId(1), stroke(4.5, BlendMode::Normal)).unwrap();

        assert_eq!(document.blame(4, 8).as_slice(), &[above, erase, below]);
        assert_eq!(document.blame(12, 8).as_slice(), &[elsewhere]);
        assert!(document.blame(8, 8).is_empty());
        assert!(document.blame(40, 8).is_empty());

        // Layer 1 is on top, at index 0. Merged events stay blamed through the merge.
        document.merge_layer(0, 1.0).unwrap().unwrap();
        assert_eq!(document.blame(4, 8).as_slice(), &[above, erase, below]);

        document.set_layer_visible(LayerId(0), false).unwrap();
        assert!(document.blame(4, 8).is_empty());
    }
    #[test]
    fn blame_far_corner_probes_one_pixel() {
        let probe = super::Probe::new(59_999, 3);
        assert_eq!(probe.bitmap.pixels().len(), 1);

        let mut document =
            Document::new(60_000, 4, Backend::Smooth, DocumentConfig::default()).unwrap();
        document.add_layer(LayerId(0), Color::TRANSPARENT, true).unwrap();
        let far = Stroke {
            points: vec![
                StrokePoint::new(59_990.0, 2.0, 1.0).unwrap(),
                StrokePoint::new(60_010.0, 2.0, 1.0).unwrap(),
            ],
            ..stroke(0.0, BlendMode::Normal)
        };
        let near = document.draw_stroke(LayerId(0), stroke(1.5, BlendMode::Normal)).unwrap();
        let far = document.draw_stroke(LayerId(0), far).unwrap();
        assert_eq!(document.blame(59_999, 2).as_slice(), &[far]);
        assert_eq!(document.blame(1, 3).as_slice(), &[near]);
        assert!(document.blame(30_000, 3).is_empty());
    }
    #[test]
    fn composite_respects_display() {
        let mut document =
            Document::new(16, 16, Backend::Aliased, DocumentConfig::default()).unwrap();
        document.add_layer(LayerId(0), Color::WHITE, false).unwrap();
        document.draw_stroke(LayerId(0), stroke(4.5, BlendMode::Normal)).unwrap();
        let painted = document.composite();
        assert_eq!(painted.get(4, 8), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(painted.get(10, 8), Some([1.0; 4]));

        document.set_layer_opacity(LayerId(0), 0.5).unwrap();
        assert_eq!(document.composite().get(10, 8), Some([0.5; 4]));
        document.set_layer_visible(LayerId(0), false).unwrap();
        assert_eq!(document.composite().get(10, 8), Some([0.0; 4]));
    }
}
