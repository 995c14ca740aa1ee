//! # Playback
//!
//! Animated replay of a document's history from a blank canvas, a bounded slice of events at a time.
//!
//! A [`Playback`] works on a snapshot of the effective events and its own rasterizer, so it never touches the
//! document it came from. Callers drive it by calling [`Playback::tick`] once per frame, and may stop at any
//! tick boundary.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
};

use crate::{
    color::Color,
    event::{Event, EventKind, LayerId},
    raster::{Backend, Bitmap, DrawOp, Rasterizer},
    state::{Document, DocumentError},
};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Tick {
    /// A slice was applied. `applied` of `total` events are now on the canvas.
    Progress { applied: usize, total: usize },
    /// Nothing left to apply.
    Finished,
}

/// One layer as replayed so far.
struct Canvas {
    bitmap: Bitmap,
    removed: bool,
    merged: bool,
    opacity: f32,
    visible: bool,
}

pub struct Playback {
    rasterizer: Box<dyn Rasterizer>,
    width: u32,
    height: u32,
    pending: VecDeque<(LayerId, Event)>,
    canvases: hashbrown::HashMap<LayerId, Canvas>,
    /// Top down, like the document stack.
    order: Vec<LayerId>,
    /// Display properties, applied as each layer is created.
    display: hashbrown::HashMap<LayerId, (f32, bool)>,
    events_per_tick: usize,
    applied: usize,
    total: usize,
}

impl Document {
    /// Prepare an animated replay of this document's history, drawn with a fresh instance of `backend`.
    /// At most `events_per_tick` events are applied per [`Playback::tick`], at least one.
    /// # Errors
    /// [`DocumentError::RasterizerSanityFailure`] if the backend is unusable.
    pub fn playback(
        &self,
        backend: Backend,
        events_per_tick: usize,
    ) -> Result<Playback, DocumentError> {
        let mut rasterizer = backend.create();
        if !rasterizer.check_sanity() {
            rasterizer.free();
            return Err(DocumentError::RasterizerSanityFailure(backend));
        }

        let mut logs = Vec::new();
        let mut display = hashbrown::HashMap::new();
        for layer in self.layers() {
            if !layer.is_created() {
                continue;
            }
            let history = layer.history();
            let hidden = history.hidden();
            let log: VecDeque<Event> = history
                .iter()
                .filter(|event| {
                    history.is_effective(event.index, &hidden)
                        && !matches!(event.event.kind, EventKind::EventHide { .. })
                })
                .map(|event| event.event.clone())
                .collect();
            display.insert(layer.id(), (layer.opacity(), layer.visible()));
            logs.push((layer.id(), log));
        }
        let pending = interleave(logs);
        let total = pending.len();
        log::debug!(
            "{}: playback of {total} events, {events_per_tick} per tick",
            self.id()
        );
        Ok(Playback {
            rasterizer,
            width: self.width(),
            height: self.height(),
            pending,
            canvases: hashbrown::HashMap::new(),
            order: Vec::new(),
            display,
            events_per_tick: events_per_tick.max(1),
            applied: 0,
            total,
        })
    }
}

/// Merge per-layer logs into one sequence ordered by `(seq, session)`. Each log's own order is kept, even
/// where it disagrees with the ordering.
fn interleave(mut logs: Vec<(LayerId, VecDeque<Event>)>) -> VecDeque<(LayerId, Event)> {
    let total = logs.iter().map(|(_, log)| log.len()).sum();
    let mut heads = BinaryHeap::with_capacity(logs.len());
    for (slot, (_, log)) in logs.iter().enumerate() {
        if let Some(head) = log.front() {
            heads.push(Reverse((head.id.seq, head.id.session, slot)));
        }
    }
    let mut out = VecDeque::with_capacity(total);
    while let Some(Reverse((.., slot))) = heads.pop() {
        let Some((layer, log)) = logs.get_mut(slot) else {
            continue;
        };
        let Some(event) = log.pop_front() else {
            continue;
        };
        if let Some(head) = log.front() {
            heads.push(Reverse((head.id.seq, head.id.session, slot)));
        }
        out.push_back((*layer, event));
    }
    out
}

impl Playback {
    /// Apply the next slice of events.
    pub fn tick(&mut self) -> Tick {
        if self.pending.is_empty() {
            return Tick::Finished;
        }
        for _ in 0..self.events_per_tick {
            let Some((layer, event)) = self.pending.pop_front() else {
                break;
            };
            self.apply(layer, &event);
            self.applied += 1;
        }
        Tick::Progress {
            applied: self.applied,
            total: self.total,
        }
    }
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied
    }
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
    fn apply(&mut self, owner: LayerId, event: &Event) {
        let Self {
            rasterizer,
            width,
            height,
            canvases,
            order,
            display,
            ..
        } = self;
        match &event.kind {
            EventKind::LayerAdd(add) => {
                let (opacity, visible) = display.get(&add.layer).copied().unwrap_or((1.0, true));
                canvases.insert(
                    add.layer,
                    Canvas {
                        bitmap: Bitmap::new(*width, *height, add.clear_color, add.has_alpha),
                        removed: false,
                        merged: false,
                        opacity,
                        visible,
                    },
                );
                order.insert(add.stack_index.min(order.len()), add.layer);
            }
            EventKind::LayerRemove { layer } => {
                if let Some(canvas) = canvases.get_mut(layer) {
                    canvas.removed = true;
                }
            }
            EventKind::LayerMove { layer, to, .. } => {
                if let Some(from) = order.iter().position(|id| id == layer) {
                    order.remove(from);
                    order.insert((*to).min(order.len()), *layer);
                }
            }
            EventKind::LayerMerge {
                merged, opacity, ..
            } => {
                // Taken out to borrow it alongside the target.
                let Some(mut source) = canvases.remove(merged) else {
                    log::warn!("playback: {merged} merged before it exists");
                    return;
                };
                if let Some(target) = canvases.get_mut(&owner) {
                    let clip = target.bitmap.bounds();
                    rasterizer.draw(
                        &mut target.bitmap,
                        DrawOp::Composite {
                            source: &source.bitmap,
                            opacity: opacity.get(),
                        },
                        clip,
                    );
                }
                source.merged = true;
                order.retain(|id| id != merged);
                canvases.insert(*merged, source);
            }
            EventKind::Stroke(stroke) => {
                if let Some(canvas) = canvases.get_mut(&owner) {
                    let clip = canvas.bitmap.bounds();
                    rasterizer.draw(&mut canvas.bitmap, DrawOp::Stroke(stroke), clip);
                }
            }
            EventKind::Gradient(gradient) => {
                if let Some(canvas) = canvases.get_mut(&owner) {
                    let clip = canvas.bitmap.bounds();
                    rasterizer.draw(&mut canvas.bitmap, DrawOp::Gradient(gradient), clip);
                }
            }
            EventKind::EventHide { .. } => (),
        }
    }
    /// Composite of everything applied so far.
    pub fn frame(&mut self) -> Bitmap {
        let mut out = Bitmap::new(self.width, self.height, Color::TRANSPARENT, true);
        let bounds = out.bounds();
        for id in self.order.iter().rev() {
            let Some(canvas) = self.canvases.get(id) else {
                continue;
            };
            if canvas.removed || canvas.merged || !canvas.visible {
                continue;
            }
            self.rasterizer.draw(
                &mut out,
                DrawOp::Composite {
                    source: &canvas.bitmap,
                    opacity: canvas.opacity,
                },
                bounds,
            );
        }
        out
    }
    /// Stop early. The document is unaffected either way.
    pub fn cancel(self) {
        log::debug!("playback cancelled at {}/{}", self.applied, self.total);
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.rasterizer.free();
    }
}

#[cfg(test)]
mod test {
    use super::Tick;
    use crate::{
        blend::BlendMode,
        color::Color,
        config::DocumentConfig,
        event::{LayerId, Stroke, StrokePoint},
        raster::Backend,
        state::Document,
        util::FiniteF32,
    };

    fn line(y: f32, color: Color) -> Stroke {
        Stroke {
            points: vec![
                StrokePoint::new(0.0, y, 1.0).unwrap(),
                StrokePoint::new(16.0, y, 0.5).unwrap(),
            ],
            radius: FiniteF32::new(2.0).unwrap(),
            color,
            opacity: FiniteF32::ONE,
            blend: BlendMode::Normal,
        }
    }

    fn sample() -> Document {
        let mut document =
            Document::new(16, 16, Backend::Aliased, DocumentConfig::default()).unwrap();
        document.add_layer(LayerId(0), Color::WHITE, false).unwrap();
        document.add_layer(LayerId(1), Color::TRANSPARENT, true).unwrap();
        document.add_layer(LayerId(2), Color::TRANSPARENT, true).unwrap();
        document.draw_stroke(LayerId(0), line(4.0, Color::BLACK)).unwrap();
        let red = Color::from_straight(1.0, 0.0, 0.0, 1.0).unwrap();
        let hidden = document.draw_stroke(LayerId(1), line(8.0, red)).unwrap();
        document.draw_stroke(LayerId(1), line(10.0, red)).unwrap();
        document.draw_stroke(LayerId(2), line(12.0, Color::BLACK)).unwrap();
        document.hide_event(hidden).unwrap();
        let undone = document.draw_stroke(LayerId(2), line(2.0, red)).unwrap();
        assert!(document.undo_event_by_session_id(undone));
        document.move_layer(LayerId(0), 1).unwrap().unwrap();
        document.merge_layer(0, 0.75).unwrap().unwrap();
        document
    }

    #[test]
    fn playback_reaches_document() {
        let mut document = sample();
        let mut playback = document.playback(Backend::Aliased, 3).unwrap();
        let total = playback.total();
        // The undone stroke, the hidden stroke and the hide itself are left out.
        assert_eq!(total, document.event_count() - 3);

        let mut ticks = 0;
        while let Tick::Progress { applied, total: t } = playback.tick() {
            assert_eq!(t, total);
            assert!(applied <= total);
            ticks += 1;
        }
        assert_eq!(ticks, total.div_ceil(3));
        assert_eq!(playback.frame(), document.composite());
        assert_eq!(playback.tick(), Tick::Finished);
    }
    #[test]
    fn cancel_leaves_document_alone() {
        let mut document = sample();
        let before = document.to_picture();
        let composite = document.composite();
        let mut playback = document.playback(Backend::Aliased, 2).unwrap();
        assert_eq!(
            playback.tick(),
            Tick::Progress {
                applied: 2,
                total: playback.total()
            }
        );
        assert!(!playback.is_finished());
        playback.cancel();
        assert_eq!(document.to_picture(), before);
        assert_eq!(document.composite(), composite);
    }
}
