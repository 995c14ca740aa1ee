//! # Layers
//!
//! A layer is its event log plus whatever pixels are currently resident for it: the live bitmap (the result
//! of replaying the whole log) and a budgeted set of [checkpoints](super::checkpoint). Pixels are always
//! derivable from the log, so a layer may drop all of them ("freed") and rebuild later.

mod history;

pub use history::{EventRef, History};

use super::checkpoint::CheckpointCache;
use crate::{
    color::Color,
    event::{Event, EventId, EventKind, LayerId},
    raster::{Bitmap, DrawOp, Rasterizer},
};

/// Lookup of other layers' pixels, for replaying merges.
pub trait MergeSources {
    /// The live bitmap of `layer`, or None if it doesn't exist or is freed.
    fn merged_bitmap(&self, layer: LayerId) -> Option<&Bitmap>;
}
impl<S: std::hash::BuildHasher> MergeSources for hashbrown::HashMap<LayerId, Layer, S> {
    fn merged_bitmap(&self, layer: LayerId) -> Option<&Bitmap> {
        self.get(&layer)?.bitmap()
    }
}
/// For layers that never merge anything.
pub struct NoSources;
impl MergeSources for NoSources {
    fn merged_bitmap(&self, _: LayerId) -> Option<&Bitmap> {
        None
    }
}

/// Everything replay needs from outside the layer.
pub struct Replay<'a> {
    pub rasterizer: &'a mut dyn Rasterizer,
    pub sources: &'a dyn MergeSources,
}
impl Replay<'_> {
    fn draw(&mut self, event: &Event, target: &mut Bitmap) {
        let clip = target.bounds();
        match &event.kind {
            EventKind::Stroke(stroke) => self.rasterizer.draw(target, DrawOp::Stroke(stroke), clip),
            EventKind::Gradient(gradient) => {
                self.rasterizer
                    .draw(target, DrawOp::Gradient(gradient), clip);
            }
            EventKind::LayerMerge {
                merged, opacity, ..
            } => match self.sources.merged_bitmap(*merged) {
                Some(source) => self.rasterizer.draw(
                    target,
                    DrawOp::Composite {
                        source,
                        opacity: opacity.get(),
                    },
                    clip,
                ),
                None => log::error!("{merged} not resident, skipping merge {}", event.id),
            },
            EventKind::LayerAdd(_)
            | EventKind::LayerRemove { .. }
            | EventKind::LayerMove { .. }
            | EventKind::EventHide { .. } => (),
        }
    }
}

pub struct Layer {
    id: LayerId,
    history: History,
    /// None while freed.
    bitmap: Option<Bitmap>,
    checkpoints: CheckpointCache,
    checkpoint_interval: usize,
    width: u32,
    height: u32,
    clear_color: Color,
    has_alpha: bool,
    /// Set while an active merge event of another layer has absorbed this one.
    merged_into: Option<LayerId>,
    // Display properties. Not events, and not persisted.
    opacity: f32,
    visible: bool,
}

impl Layer {
    /// Create a resident layer from its creation event. None if `creation` is not a [`EventKind::LayerAdd`].
    #[must_use]
    pub fn new(
        creation: Event,
        undone: bool,
        width: u32,
        height: u32,
        checkpoint_budget: usize,
        checkpoint_interval: usize,
    ) -> Option<Self> {
        let mut this = Self::from_events(
            [(creation, undone)],
            width,
            height,
            checkpoint_budget,
            checkpoint_interval,
        )?;
        this.bitmap = Some(this.blank());
        Some(this)
    }
    /// Create a *freed* layer from a whole log, such as one read from disk. Its pixels are built on the
    /// first [`Self::regenerate`].
    ///
    /// None if the log doesn't start with a [`EventKind::LayerAdd`], or a later event is one.
    pub fn from_events(
        events: impl IntoIterator<Item = (Event, bool)>,
        width: u32,
        height: u32,
        checkpoint_budget: usize,
        checkpoint_interval: usize,
    ) -> Option<Self> {
        let mut events = events.into_iter();
        let (creation, undone) = events.next()?;
        let add = creation.kind.layer_add()?.clone();
        let mut history = History::new(creation, undone);
        for (event, undone) in events {
            if event.kind.layer_add().is_some() {
                return None;
            }
            history.push(event, undone);
        }
        Some(Self {
            id: add.layer,
            history,
            bitmap: None,
            checkpoints: CheckpointCache::new(checkpoint_budget),
            checkpoint_interval,
            width,
            height,
            clear_color: add.clear_color,
            has_alpha: add.has_alpha,
            merged_into: None,
            opacity: 1.0,
            visible: true,
        })
    }
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.history.len()
    }
    /// The result of replaying the whole log. None while freed.
    #[must_use]
    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }
    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.bitmap.is_none()
    }
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointCache {
        &self.checkpoints
    }
    #[must_use]
    pub fn clear_color(&self) -> Color {
        self.clear_color
    }
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }
    /// Creation event is not undone.
    #[must_use]
    pub fn is_created(&self) -> bool {
        !self.history.is_undone(0)
    }
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.history.has_active_removal()
    }
    #[must_use]
    pub fn merged_into(&self) -> Option<LayerId> {
        self.merged_into
    }
    pub(in crate::state) fn set_merged_into(&mut self, into: Option<LayerId>) {
        self.merged_into = into;
    }
    /// Created, not removed, and not merged away - i.e. part of the picture.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.is_created() && !self.is_removed() && self.merged_into.is_none()
    }
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
    /// Bitmaps held, counting the live one.
    #[must_use]
    pub fn resident_bitmaps(&self) -> usize {
        usize::from(self.bitmap.is_some()) + self.checkpoints.len()
    }
    /// Bytes held, given the cost of one bitmap.
    #[must_use]
    pub fn memory_bytes(&self, bitmap_bytes: usize) -> usize {
        self.resident_bitmaps() * bitmap_bytes
    }
    #[must_use]
    pub fn checkpoint_budget(&self) -> usize {
        self.checkpoints.budget()
    }
    /// Returns the number of checkpoints evicted to fit.
    pub fn set_checkpoint_budget(&mut self, budget: usize) -> usize {
        self.checkpoints.set_budget(budget)
    }
    fn blank(&self) -> Bitmap {
        Bitmap::new(self.width, self.height, self.clear_color, self.has_alpha)
    }

    /// Log position from which pixels change if the event at `index` toggles between active and undone.
    fn toggle_effect(&self, index: usize, hidden: &hashbrown::HashSet<EventId>) -> Option<usize> {
        let event = self.history.event(index)?;
        match &event.kind {
            EventKind::EventHide { hidden: target } => {
                let Some(position) = self.history.position(*target) else {
                    log::debug!("{} hides {target}, which is not in {}", event.id, self.id);
                    return None;
                };
                let target_kind = &self.history.event(position)?.kind;
                if target_kind.is_drawing() {
                    Some(position)
                } else {
                    log::warn!("{} hides structural event {target}, ignoring", event.id);
                    None
                }
            }
            kind if kind.is_drawing() && !hidden.contains(&event.id) => Some(index),
            _ => None,
        }
    }
    /// Append an event, drawing it if it is active.
    pub fn push_event(&mut self, event: Event, undone: bool, replay: &mut Replay<'_>) -> usize {
        let index = self.history.push(event, undone);
        if undone {
            return index;
        }
        let hidden = self.history.hidden();
        match self.toggle_effect(index, &hidden) {
            // The live bitmap is exactly the log up to here.
            Some(start) if start == index => self.advance(index, replay),
            Some(start) => self.invalidate_from(start, replay),
            None => (),
        }
        index
    }
    /// Insert an event at log position `at`, clamped to after the creation event. Returns where it landed.
    ///
    /// Checkpoints past the insertion point are dropped and the live bitmap rebuilt from the nearest survivor.
    pub fn insert_event(
        &mut self,
        at: usize,
        event: Event,
        undone: bool,
        replay: &mut Replay<'_>,
    ) -> usize {
        let at = at.clamp(1, self.history.len());
        if at == self.history.len() {
            return self.push_event(event, undone, replay);
        }
        self.history.insert(at, event, undone);
        let hidden = self.history.hidden();
        let effect = if undone {
            None
        } else {
            self.toggle_effect(at, &hidden)
        };
        match effect {
            Some(start) => self.invalidate_from(start.min(at), replay),
            // No pixel changes, only positions.
            None => self.checkpoints.shift_after(at, 1),
        }
        at
    }
    /// Mark the event at `index` undone or not. Returns false if it already was, or doesn't exist.
    pub fn set_undone(&mut self, index: usize, undone: bool, replay: &mut Replay<'_>) -> bool {
        let hidden = self.history.hidden();
        let effect = self.toggle_effect(index, &hidden);
        match self.history.set_undone(index, undone) {
            Some(previous) if previous != undone => (),
            _ => return false,
        }
        if let Some(start) = effect {
            self.invalidate_from(start, replay);
        }
        true
    }
    /// Physically remove an undone event from the log. Active events must be undone first, and the creation
    /// event can never be removed.
    pub fn remove_event(&mut self, index: usize) -> Option<Event> {
        if !self.history.is_undone(index) {
            return None;
        }
        let (event, _) = self.history.remove(index)?;
        // Pixels are unaffected, only positions after it.
        self.checkpoints.shift_after(index, -1);
        Some(event)
    }
    /// Pixels resulting from log position `start` onward are stale. Drops the checkpoints that include them and
    /// rebuilds the live bitmap, if resident.
    pub fn invalidate_from(&mut self, start: usize, replay: &mut Replay<'_>) {
        let dropped = self.checkpoints.invalidate_after(start);
        if dropped > 0 {
            log::trace!("{}: dropped {dropped} checkpoints past {start}", self.id);
        }
        let Some(bitmap) = self.bitmap.as_mut() else {
            return;
        };
        let from = match self.checkpoints.nearest(start) {
            Some(checkpoint) => {
                bitmap.clone_from(checkpoint.bitmap());
                checkpoint.log_index()
            }
            None => {
                bitmap.reset();
                0
            }
        };
        self.advance(from, replay);
    }
    /// Replay `from..` onto the live bitmap, which must currently hold the result of `..from`.
    /// Leaves checkpoints behind every `checkpoint_interval` events.
    fn advance(&mut self, from: usize, replay: &mut Replay<'_>) {
        let Self {
            history,
            bitmap,
            checkpoints,
            checkpoint_interval,
            ..
        } = self;
        let Some(bitmap) = bitmap.as_mut() else {
            return;
        };
        let hidden = history.hidden();
        let mut last_checkpoint = checkpoints.newest_index().unwrap_or(0).min(from);
        for index in from..history.len() {
            if let (true, Some(event)) = (history.is_effective(index, &hidden), history.event(index)) {
                replay.draw(event, bitmap);
            }
            let covered = index + 1;
            if *checkpoint_interval > 0
                && covered - last_checkpoint >= *checkpoint_interval
                && checkpoints.offer(covered, bitmap)
            {
                last_checkpoint = covered;
            }
        }
    }
    /// The layer as it looks after its first `log_index` events. Works while freed too, just slower.
    pub fn render_at(&self, log_index: usize, replay: &mut Replay<'_>) -> Bitmap {
        let log_index = log_index.min(self.history.len());
        if log_index == self.history.len() {
            if let Some(live) = &self.bitmap {
                return live.clone();
            }
        }
        let (mut bitmap, from) = match self.checkpoints.nearest(log_index) {
            Some(checkpoint) => (checkpoint.bitmap().clone(), checkpoint.log_index()),
            None => (self.blank(), 0),
        };
        let hidden = self.history.hidden();
        for index in from..log_index {
            if let (true, Some(event)) = (
                self.history.is_effective(index, &hidden),
                self.history.event(index),
            ) {
                replay.draw(event, &mut bitmap);
            }
        }
        bitmap
    }
    /// Drop all pixels. Returns whether anything was resident.
    pub fn free(&mut self) -> bool {
        self.checkpoints.clear();
        self.bitmap.take().is_some()
    }
    /// Rebuild the live bitmap of a freed layer by replaying the whole log. Returns false if it was resident.
    pub fn regenerate(&mut self, replay: &mut Replay<'_>) -> bool {
        if self.bitmap.is_some() {
            return false;
        }
        self.checkpoints.clear();
        self.bitmap = Some(self.blank());
        self.advance(0, replay);
        true
    }
    /// Change dimensions. Frees the layer - pixels at the old size are useless. Returns whether it was resident.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        self.width = width;
        self.height = height;
        self.free()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        blend::BlendMode,
        event::{LayerAdd, Stroke, StrokePoint},
        raster::software::Aliased,
        util::FiniteF32,
    };

    const SIZE: u32 = 24;

    fn creation() -> Event {
        Event::new(
            EventId::new(1, 0),
            EventKind::LayerAdd(LayerAdd {
                layer: LayerId(1),
                clear_color: Color::TRANSPARENT,
                has_alpha: true,
                stack_index: 0,
            }),
        )
    }
    fn dab(seq: u32) -> Event {
        #[allow(clippy::cast_precision_loss)]
        let offset = (seq % SIZE) as f32;
        Event::new(
            EventId::new(1, seq),
            EventKind::Stroke(Stroke {
                points: vec![
                    StrokePoint::new(offset, 2.0, 1.0).unwrap(),
                    StrokePoint::new(offset, 20.0, 0.5).unwrap(),
                ],
                radius: FiniteF32::new(2.0).unwrap(),
                color: Color::from_straight(0.5, 0.2, 0.9, 0.6).unwrap(),
                opacity: FiniteF32::ONE,
                blend: BlendMode::Normal,
            }),
        )
    }
    fn layer(budget: usize) -> Layer {
        Layer::new(creation(), false, SIZE, SIZE, budget, 4).unwrap()
    }
    fn digest(layer: &Layer) -> blake3::Hash {
        layer.bitmap().unwrap().digest()
    }

    #[test]
    fn rejects_non_creation() {
        assert!(Layer::new(dab(1), false, SIZE, SIZE, 3, 4).is_none());
        assert!(Layer::from_events([(creation(), false), (creation(), false)], 1, 1, 3, 4).is_none());
    }
    #[test]
    fn checkpoints_follow_interval() {
        let mut rasterizer = Aliased::new();
        let mut replay = Replay {
            rasterizer: &mut rasterizer,
            sources: &NoSources,
        };
        let mut layer = layer(8);
        for seq in 1..=12 {
            layer.push_event(dab(seq), false, &mut replay);
        }
        let indices: Vec<_> = layer.checkpoints().iter().map(|c| c.log_index()).collect();
        assert_eq!(indices, vec![4, 8, 12]);
        assert_eq!(layer.resident_bitmaps(), 4);
    }
    #[test]
    fn undo_redo_restores_pixels() {
        let mut rasterizer = Aliased::new();
        let mut replay = Replay {
            rasterizer: &mut rasterizer,
            sources: &NoSources,
        };
        let mut layer = layer(3);
        for seq in 1..=10 {
            layer.push_event(dab(seq), false, &mut replay);
        }
        let before = digest(&layer);
        assert!(layer.set_undone(5, true, &mut replay));
        assert_ne!(digest(&layer), before);
        assert!(!layer.set_undone(5, true, &mut replay));
        assert!(layer.set_undone(5, false, &mut replay));
        assert_eq!(digest(&layer), before);
    }
    #[test]
    fn insert_matches_in_order_build() {
        let mut rasterizer = Aliased::new();
        let mut replay = Replay {
            rasterizer: &mut rasterizer,
            sources: &NoSources,
        };
        let mut in_order = layer(3);
        let mut late = layer(3);
        for seq in 1..=9 {
            in_order.push_event(dab(seq), false, &mut replay);
            if seq != 3 {
                late.push_event(dab(seq), false, &mut replay);
            }
        }
        assert_eq!(late.insert_event(3, dab(3), false, &mut replay), 3);
        assert_eq!(digest(&late), digest(&in_order));
        // Nothing can precede creation.
        assert_eq!(late.insert_event(0, dab(40), true, &mut replay), 1);
    }
    #[test]
    fn hide_and_remove() {
        let mut rasterizer = Aliased::new();
        let mut replay = Replay {
            rasterizer: &mut rasterizer,
            sources: &NoSources,
        };
        let mut reference = layer(3);
        let mut layer = layer(3);
        for seq in 1..=6 {
            layer.push_event(dab(seq), false, &mut replay);
            if seq != 2 {
                reference.push_event(dab(seq), false, &mut replay);
            }
        }
        let hide = Event::new(
            EventId::new(1, 7),
            EventKind::EventHide {
                hidden: EventId::new(1, 2),
            },
        );
        let hide_index = layer.push_event(hide, false, &mut replay);
        assert_eq!(digest(&layer), digest(&reference));

        // Active events can't be removed.
        assert!(layer.remove_event(hide_index).is_none());
        assert!(layer.set_undone(hide_index, true, &mut replay));
        assert!(layer.remove_event(hide_index).is_some());
        assert!(layer.remove_event(0).is_none());
        assert_eq!(layer.event_count(), 7);
    }
    #[test]
    fn render_at_matches_prefix() {
        let mut rasterizer = Aliased::new();
        let mut replay = Replay {
            rasterizer: &mut rasterizer,
            sources: &NoSources,
        };
        let mut full = layer(2);
        let mut prefix = layer(2);
        for seq in 1..=11 {
            full.push_event(dab(seq), false, &mut replay);
            if seq <= 6 {
                prefix.push_event(dab(seq), false, &mut replay);
            }
        }
        assert_eq!(full.render_at(7, &mut replay).digest(), digest(&prefix));

        // Freed layers rebuild to the same pixels.
        let before = digest(&full);
        assert!(full.free());
        assert!(full.is_freed());
        assert_eq!(full.render_at(7, &mut replay).digest(), digest(&prefix));
        assert!(full.regenerate(&mut replay));
        assert_eq!(digest(&full), before);
    }
}
