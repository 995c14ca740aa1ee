//! # Document
//!
//! Owns every layer of a picture and routes edits to them. Layers live in an arena keyed by [`LayerId`], with
//! the [`Stack`] holding their order. Events refer to other layers by id only, resolved here when needed.
//!
//! Besides sequencing replay, the document keeps the bookkeeping no single layer can: stack order, which
//! layers are merged into which, and the memory use of everyone's pixels against one shared budget.

pub mod budget;
mod picture;
mod view;

use smallvec::SmallVec;

use super::{
    layer::{Layer, Replay},
    stack::Stack,
};
use crate::{
    color::Color,
    commands::{CommandConsumer, DoUndo},
    config::DocumentConfig,
    event::{Event, EventId, EventKind, Gradient, LayerAdd, LayerId, SessionId, Stroke},
    raster::{Backend, Rasterizer},
    util::FiniteF32,
};
use budget::MemoryExhausted;

pub type DocumentID = crate::id::ProcessID<Document>;

/// Layers visited while following merges, to stop on cycles.
type Chain = SmallVec<[LayerId; 8]>;

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("{0} does not exist")]
    InvalidReference(LayerId),
    #[error("{0} already exists")]
    DuplicateLayer(LayerId),
    #[error("event {0} does not exist")]
    UnknownEvent(EventId),
    #[error("layer creation must be the first event of its layer, and only that")]
    MisplacedCreation,
    #[error("{} rasterizer failed its sanity check", .0.as_ref())]
    RasterizerSanityFailure(Backend),
    #[error(transparent)]
    Parse(#[from] crate::io::ParseError),
}

pub struct Document {
    id: DocumentID,
    width: u32,
    height: u32,
    config: DocumentConfig,
    rasterizer: Box<dyn Rasterizer>,
    /// What one bitmap costs at the current size.
    bitmap_bytes: usize,
    layers: hashbrown::HashMap<LayerId, Layer>,
    stack: Stack,
    /// Bytes of every resident bitmap and checkpoint. Updated in the same step as whatever changes them.
    memory_use: usize,
    budget_warning: Option<MemoryExhausted>,
    /// Authoring cursor. New events are written as `(session, next_seq)`.
    session: SessionId,
    next_seq: u32,
    metadata: Option<Vec<String>>,
}

impl Document {
    /// Create an empty document drawing with a fresh instance of `backend`.
    /// # Errors
    /// [`DocumentError::RasterizerSanityFailure`] if the backend is unusable. Try another.
    pub fn new(
        width: u32,
        height: u32,
        backend: Backend,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        Self::with_rasterizer(width, height, backend.create(), config)
    }
    /// Create an empty document drawing with `rasterizer`, which is sanity checked first.
    /// # Errors
    /// [`DocumentError::RasterizerSanityFailure`] if the rasterizer is unusable.
    pub fn with_rasterizer(
        width: u32,
        height: u32,
        mut rasterizer: Box<dyn Rasterizer>,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        let backend = rasterizer.backend();
        if !rasterizer.check_sanity() {
            log::warn!("{} rasterizer failed sanity check", backend.as_ref());
            rasterizer.free();
            return Err(DocumentError::RasterizerSanityFailure(backend));
        }
        let bitmap_bytes = rasterizer.memory_footprint_bytes(width, height);
        let id = DocumentID::default();
        log::info!(
            "{id}: {width}x{height}, {} backend, {} per bitmap",
            backend.as_ref(),
            budget::bytes(&bitmap_bytes)
        );
        Ok(Self {
            id,
            width,
            height,
            config,
            rasterizer,
            bitmap_bytes,
            layers: hashbrown::HashMap::new(),
            stack: Stack::default(),
            memory_use: 0,
            budget_warning: None,
            session: SessionId(0),
            next_seq: 0,
            metadata: None,
        })
    }
    #[must_use]
    pub fn id(&self) -> DocumentID {
        self.id
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.rasterizer.backend()
    }
    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }
    /// Every layer, stack order first (top down), then merged-away layers.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.stack.iter().filter_map(|id| self.layers.get(&id))
    }
    /// Total events across all layers.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.layers.values().map(Layer::event_count).sum()
    }
    #[must_use]
    pub fn metadata(&self) -> Option<&[String]> {
        self.metadata.as_deref()
    }
    pub fn set_metadata(&mut self, metadata: Option<Vec<String>>) {
        self.metadata = metadata;
    }

    /// Author new events as `session`, continuing after its latest event in this document.
    pub fn set_session(&mut self, session: SessionId) {
        self.session = session;
        self.next_seq = self
            .layers
            .values()
            .flat_map(|layer| layer.history().iter())
            .filter(|event| event.event.id.session == session)
            .map(|event| event.event.id.seq.saturating_add(1))
            .max()
            .unwrap_or(0);
    }
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }
    fn next_event_id(&mut self) -> EventId {
        let id = EventId {
            session: self.session,
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.saturating_add(1);
        id
    }
    /// A layer id not yet used in this document.
    #[must_use]
    pub fn fresh_layer_id(&self) -> LayerId {
        LayerId(
            self.layers
                .keys()
                .map(|id| id.0.saturating_add(1))
                .max()
                .unwrap_or(0),
        )
    }

    // ---- Authoring. These write events as the active session.

    /// Create a layer on top of the stack.
    /// # Errors
    /// [`DocumentError::DuplicateLayer`] if `id` is taken.
    pub fn add_layer(
        &mut self,
        id: LayerId,
        clear_color: Color,
        has_alpha: bool,
    ) -> Result<EventId, DocumentError> {
        if self.layers.contains_key(&id) {
            return Err(DocumentError::DuplicateLayer(id));
        }
        let event = Event::new(
            self.next_event_id(),
            EventKind::LayerAdd(LayerAdd {
                layer: id,
                clear_color,
                has_alpha,
                stack_index: 0,
            }),
        );
        let event_id = event.id;
        self.push_event(id, event)?;
        Ok(event_id)
    }
    /// Remove a layer. Ok(None) if it isn't present to begin with.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Option<EventId>, DocumentError> {
        let layer = self
            .layers
            .get(&id)
            .ok_or(DocumentError::InvalidReference(id))?;
        if !layer.is_present() {
            return Ok(None);
        }
        let event = Event::new(self.next_event_id(), EventKind::LayerRemove { layer: id });
        let event_id = event.id;
        self.push_event(id, event)?;
        Ok(Some(event_id))
    }
    /// Move a layer to `to` in the stack, clamped to the bottom. Ok(None) if it is already there.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if the layer is not in the stack.
    pub fn move_layer(&mut self, id: LayerId, to: usize) -> Result<Option<EventId>, DocumentError> {
        let from = self
            .stack
            .index_of(id)
            .ok_or(DocumentError::InvalidReference(id))?;
        let to = to.min(self.stack.order().len().saturating_sub(1));
        if from == to {
            return Ok(None);
        }
        let event = Event::new(
            self.next_event_id(),
            EventKind::LayerMove { layer: id, from, to },
        );
        let event_id = event.id;
        self.push_event(id, event)?;
        Ok(Some(event_id))
    }
    /// Merge the layer at stack `index` into the next present layer beneath it.
    /// Ok(None) if there is no present layer at `index`, or none beneath it.
    /// # Errors
    /// Only on internal inconsistency.
    pub fn merge_layer(
        &mut self,
        index: usize,
        opacity: f32,
    ) -> Result<Option<EventId>, DocumentError> {
        let present = |id: &LayerId| self.layers.get(id).is_some_and(Layer::is_present);
        let order = self.stack.order();
        let Some(&merged) = order.get(index).filter(|id| present(id)) else {
            return Ok(None);
        };
        let Some(&target) = order.iter().skip(index + 1).find(|id| present(id)) else {
            return Ok(None);
        };
        let event = Event::new(
            self.next_event_id(),
            EventKind::LayerMerge {
                merged,
                opacity: FiniteF32::unit_lossy(opacity),
                merged_index: index,
            },
        );
        let event_id = event.id;
        self.push_event(target, event)?;
        Ok(Some(event_id))
    }
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn draw_stroke(&mut self, layer: LayerId, stroke: Stroke) -> Result<EventId, DocumentError> {
        let event = Event::new(self.next_event_id(), EventKind::Stroke(stroke));
        let event_id = event.id;
        self.push_event(layer, event)?;
        Ok(event_id)
    }
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn draw_gradient(
        &mut self,
        layer: LayerId,
        gradient: Gradient,
    ) -> Result<EventId, DocumentError> {
        let event = Event::new(self.next_event_id(), EventKind::Gradient(gradient));
        let event_id = event.id;
        self.push_event(layer, event)?;
        Ok(event_id)
    }
    /// Hide a drawing event, written into the log of the layer that holds it.
    /// # Errors
    /// [`DocumentError::UnknownEvent`] if the event doesn't exist.
    pub fn hide_event(&mut self, hidden: EventId) -> Result<EventId, DocumentError> {
        let (layer, _) = self
            .locate(hidden)
            .ok_or(DocumentError::UnknownEvent(hidden))?;
        let event = Event::new(self.next_event_id(), EventKind::EventHide { hidden });
        let event_id = event.id;
        self.push_event(layer, event)?;
        Ok(event_id)
    }

    // ---- Event routing.

    /// Apply an event to `target`. Events carrying an insertion point inside the log are inserted there
    /// instead of appended.
    ///
    /// Returns the event's position in the layer's log.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if `target`, or a layer the event names, doesn't exist.
    pub fn push_event(&mut self, target: LayerId, event: Event) -> Result<usize, DocumentError> {
        if let Some(at) = event.insertion_point {
            if self
                .layers
                .get(&target)
                .is_some_and(|layer| at < layer.event_count())
            {
                return self.insert_event(target, event, at);
            }
        }
        if let EventKind::LayerAdd(add) = &event.kind {
            if add.layer != target {
                return Err(DocumentError::InvalidReference(target));
            }
            self.create_layer(event)?;
            return Ok(0);
        }
        self.validate(target, &event)?;
        log::trace!("{target} <- {} {}", event.kind.tag().as_ref(), event.id);
        let structural = event.kind.is_structural().then(|| event.kind.clone());
        self.prepare_sources(target, event.kind.merged_layer())?;
        let index = self.with_layer(target, |layer, replay| layer.push_event(event, false, replay))?;
        if let Some(kind) = structural {
            self.apply_structure(target, DoUndo::Do(&kind));
        }
        self.settle(target);
        Ok(index)
    }
    /// Splice a causally-earlier event into `target`'s log at `at`. Pixels after that point are rebuilt.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if `target`, or a layer the event names, doesn't exist.
    /// [`DocumentError::MisplacedCreation`] for creation events, which can't be inserted.
    pub fn insert_event(
        &mut self,
        target: LayerId,
        event: Event,
        at: usize,
    ) -> Result<usize, DocumentError> {
        if event.kind.layer_add().is_some() {
            return Err(DocumentError::MisplacedCreation);
        }
        self.validate(target, &event)?;
        log::trace!(
            "{target} <- {} {} at {at}",
            event.kind.tag().as_ref(),
            event.id
        );
        let structural = event.kind.is_structural().then(|| event.kind.clone());
        self.prepare_sources(target, event.kind.merged_layer())?;
        let index = self.with_layer(target, |layer, replay| {
            layer.insert_event(at, event, false, replay)
        })?;
        if let Some(kind) = structural {
            self.apply_structure(target, DoUndo::Do(&kind));
        }
        self.settle(target);
        Ok(index)
    }
    /// Check the layers an event names are sensible for it to be applied to `target`.
    fn validate(&self, target: LayerId, event: &Event) -> Result<(), DocumentError> {
        if !self.layers.contains_key(&target) {
            return Err(DocumentError::InvalidReference(target));
        }
        match &event.kind {
            EventKind::LayerRemove { layer } | EventKind::LayerMove { layer, .. }
                if *layer != target =>
            {
                Err(DocumentError::InvalidReference(*layer))
            }
            EventKind::LayerMerge { merged, .. }
                if *merged == target || self.stack.index_of(*merged).is_none() =>
            {
                Err(DocumentError::InvalidReference(*merged))
            }
            EventKind::LayerAdd(_) => Err(DocumentError::MisplacedCreation),
            _ => Ok(()),
        }
    }
    fn create_layer(&mut self, event: Event) -> Result<(), DocumentError> {
        let Some(add) = event.kind.layer_add().cloned() else {
            return Err(DocumentError::MisplacedCreation);
        };
        if self.layers.contains_key(&add.layer) {
            return Err(DocumentError::DuplicateLayer(add.layer));
        }
        self.reserve(self.bitmap_bytes);
        let layer = Layer::new(
            event,
            false,
            self.width,
            self.height,
            self.config.default_checkpoint_budget,
            self.config.checkpoint_interval,
        )
        .ok_or(DocumentError::MisplacedCreation)?;
        self.memory_use += layer.memory_bytes(self.bitmap_bytes);
        let index = self.stack.insert(add.layer, add.stack_index);
        log::debug!("created {} at stack index {index}", add.layer);
        self.layers.insert(add.layer, layer);
        self.rebalance();
        Ok(())
    }
    /// Run `f` on a layer with everything needed to replay it, keeping memory accounting in step.
    fn with_layer<R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut Layer, &mut Replay<'_>) -> R,
    ) -> Result<R, DocumentError> {
        // Taken out so the rest of the arena can be borrowed as merge sources.
        let mut layer = self
            .layers
            .remove(&id)
            .ok_or(DocumentError::InvalidReference(id))?;
        let before = layer.memory_bytes(self.bitmap_bytes);
        let result = {
            let mut replay = Replay {
                rasterizer: self.rasterizer.as_mut(),
                sources: &self.layers,
            };
            f(&mut layer, &mut replay)
        };
        let after = layer.memory_bytes(self.bitmap_bytes);
        self.layers.insert(id, layer);
        self.memory_use = self.memory_use.saturating_sub(before) + after;
        Ok(result)
    }
    /// Mirror a structural event into the stack and merge links.
    fn apply_structure(&mut self, owner: LayerId, command: DoUndo<'_, EventKind>) {
        if let Err(err) = self.stack.apply(command) {
            // Only reachable through remote structural events that conflict with the local stack.
            log::warn!(
                "stack unchanged by {} on {owner}: {err}",
                command.inner().tag().as_ref()
            );
            return;
        }
        if let Some(merged) = command.inner().merged_layer() {
            if let Some(layer) = self.layers.get_mut(&merged) {
                layer.set_merged_into((!command.is_undo()).then_some(owner));
            }
        }
    }
    /// Everything that must follow a change to `changed`'s log.
    fn settle(&mut self, changed: LayerId) {
        self.propagate(changed);
        self.revive();
        self.rebalance();
    }
    /// A merged-away layer changed, so everything it was merged into is stale from the merge on.
    fn propagate(&mut self, changed: LayerId) {
        let mut chain = Chain::new();
        chain.push(changed);
        let mut current = changed;
        while let Some(parent) = self.layers.get(&current).and_then(Layer::merged_into) {
            if chain.contains(&parent) {
                log::error!("merge cycle through {parent}");
                break;
            }
            chain.push(parent);
            let Some(position) = self
                .layers
                .get(&parent)
                .and_then(|layer| layer.history().merge_position(current))
            else {
                log::error!("{current} merged into {parent}, which has no such merge");
                break;
            };
            log::debug!("{current} changed, replaying {parent} from {position}");
            if let Err(err) = self.prepare_sources(parent, None) {
                log::error!("can't restore sources of {parent}: {err}");
            }
            if let Err(err) =
                self.with_layer(parent, |layer, replay| layer.invalidate_from(position, replay))
            {
                log::error!("{err}");
            }
            current = parent;
        }
    }
    /// Regenerate layers that are back in the picture but still freed.
    fn revive(&mut self) {
        let dormant: SmallVec<[LayerId; 4]> = self
            .stack
            .order()
            .iter()
            .copied()
            .filter(|id| {
                self.layers
                    .get(id)
                    .is_some_and(|layer| layer.is_present() && layer.is_freed())
            })
            .collect();
        for id in dormant {
            if let Err(err) = self.regenerate(id) {
                log::error!("can't revive {id}: {err}");
            }
        }
    }
    /// Rebuild a freed layer, and the freed layers merged into it.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn regenerate(&mut self, id: LayerId) -> Result<(), DocumentError> {
        self.regenerate_chain(id, &mut Chain::new())
    }
    fn regenerate_chain(&mut self, id: LayerId, chain: &mut Chain) -> Result<(), DocumentError> {
        let layer = self
            .layers
            .get(&id)
            .ok_or(DocumentError::InvalidReference(id))?;
        if !layer.is_freed() {
            return Ok(());
        }
        if chain.contains(&id) {
            log::error!("merge cycle through {id}");
            return Ok(());
        }
        chain.push(id);
        self.sources_chain(id, None, chain)?;
        self.reserve(self.bitmap_bytes);
        log::debug!("regenerating {id}");
        self.with_layer(id, |layer, replay| layer.regenerate(replay))?;
        chain.pop();
        Ok(())
    }
    /// Make sure every layer merged into `id` (and `extra`, about to be) is resident.
    fn prepare_sources(&mut self, id: LayerId, extra: Option<LayerId>) -> Result<(), DocumentError> {
        self.sources_chain(id, extra, &mut Chain::new())
    }
    fn sources_chain(
        &mut self,
        id: LayerId,
        extra: Option<LayerId>,
        chain: &mut Chain,
    ) -> Result<(), DocumentError> {
        let sources: SmallVec<[LayerId; 4]> = self
            .layers
            .get(&id)
            .ok_or(DocumentError::InvalidReference(id))?
            .history()
            .active_merges()
            .map(|(_, source)| source)
            .chain(extra)
            .collect();
        for source in sources {
            self.regenerate_chain(source, chain)?;
        }
        Ok(())
    }

    // ---- History.

    /// Find the layer and log position of an event. Searches the stack top down, then the most recently
    /// merged layers first.
    #[must_use]
    pub fn locate(&self, id: EventId) -> Option<(LayerId, usize)> {
        self.stack
            .order()
            .iter()
            .chain(self.stack.merged().iter().rev())
            .find_map(|&layer| Some((layer, self.layers.get(&layer)?.history().position(id)?)))
    }
    /// Would undoing this event take away the last layer of the picture?
    fn is_last_layer_creation(&self, layer: LayerId, index: usize) -> bool {
        index == 0
            && self.config.keep_last_layer
            && self.layers.get(&layer).is_some_and(Layer::is_present)
            && self.layers.values().filter(|layer| layer.is_present()).count() == 1
    }
    fn set_undone(&mut self, id: LayerId, index: usize, undone: bool) -> Result<bool, DocumentError> {
        let layer = self
            .layers
            .get(&id)
            .ok_or(DocumentError::InvalidReference(id))?;
        let Some(event) = layer.history().get(index) else {
            return Ok(false);
        };
        if event.undone() == undone {
            return Ok(false);
        }
        let structural = event
            .event
            .kind
            .is_structural()
            .then(|| event.event.kind.clone());
        if let Some(kind) = &structural {
            let command = if undone {
                DoUndo::Undo(kind)
            } else {
                DoUndo::Do(kind)
            };
            // Trial run, the log must not change unless the stack can follow.
            if let Err(err) = self.stack.clone().apply(command) {
                log::warn!(
                    "{} {} on {id} conflicts with the stack: {err}",
                    if undone { "undoing" } else { "redoing" },
                    kind.tag().as_ref()
                );
                return Ok(false);
            }
        }
        let restoring = if undone {
            None
        } else {
            event.event.kind.merged_layer()
        };
        self.prepare_sources(id, restoring)?;
        let changed = self.with_layer(id, |layer, replay| layer.set_undone(index, undone, replay))?;
        if let (true, Some(kind)) = (changed, structural) {
            self.apply_structure(
                id,
                if undone {
                    DoUndo::Undo(&kind)
                } else {
                    DoUndo::Do(&kind)
                },
            );
        }
        self.settle(id);
        Ok(changed)
    }
    /// Undo the latest active event written by `session`, anywhere in the document. Returns it, or None if
    /// there is nothing to undo.
    ///
    /// With [`DocumentConfig::keep_last_layer`], the creation of the only remaining layer is never undone.
    pub fn undo_latest(&mut self, session: SessionId) -> Option<EventId> {
        let (layer, index, id) = self
            .layers
            .values()
            .filter_map(|layer| {
                let index = layer.history().latest_of(session, false)?;
                Some((layer.id(), index, layer.history().event(index)?.id))
            })
            .max_by_key(|(.., id)| id.seq)?;
        if self.is_last_layer_creation(layer, index) {
            log::warn!("not undoing {id}, it would remove the last layer");
            return None;
        }
        match self.set_undone(layer, index, true) {
            Ok(true) => Some(id),
            Ok(false) => None,
            Err(err) => {
                log::error!("undoing {id}: {err}");
                None
            }
        }
    }
    /// Undo a specific event. Returns whether it was found and undone.
    pub fn undo_event_by_session_id(&mut self, id: EventId) -> bool {
        let Some((layer, index)) = self.locate(id) else {
            return false;
        };
        if self.is_last_layer_creation(layer, index) {
            log::warn!("not undoing {id}, it would remove the last layer");
            return false;
        }
        self.set_undone(layer, index, true).unwrap_or_else(|err| {
            log::error!("undoing {id}: {err}");
            false
        })
    }
    /// Redo a specific event. Returns whether it was found and redone.
    ///
    /// Structural events that no longer fit the stack stay undone, such as the merge of a layer that has
    /// since been merged elsewhere.
    pub fn redo_event_by_session_id(&mut self, id: EventId) -> bool {
        let Some((layer, index)) = self.locate(id) else {
            return false;
        };
        self.set_undone(layer, index, false).unwrap_or_else(|err| {
            log::error!("redoing {id}: {err}");
            false
        })
    }
    /// Discard an event from history for good, undoing it first if needed. Creation events can't be removed.
    /// Returns the removed event.
    pub fn remove_event_by_session_id(&mut self, id: EventId) -> Option<Event> {
        let (layer, index) = self.locate(id)?;
        if index == 0 {
            log::warn!("refusing to remove creation event {id}");
            return None;
        }
        let undone = self.layers.get(&layer)?.history().is_undone(index);
        if !undone && !self.set_undone(layer, index, true).unwrap_or(false) {
            return None;
        }
        let removed = self
            .with_layer(layer, |layer, _| layer.remove_event(index))
            .ok()
            .flatten();
        if removed.is_some() {
            log::debug!("removed {id} from {layer}");
        }
        self.rebalance();
        removed
    }

    // ---- Layer properties.

    /// Display visibility, independent of history. None if there's no such layer.
    #[must_use]
    pub fn layer_visible(&self, id: LayerId) -> Option<bool> {
        self.layers.get(&id).map(Layer::visible)
    }
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<(), DocumentError> {
        self.layers
            .get_mut(&id)
            .ok_or(DocumentError::InvalidReference(id))?
            .set_visible(visible);
        Ok(())
    }
    /// Display opacity, independent of history. None if there's no such layer.
    #[must_use]
    pub fn layer_opacity(&self, id: LayerId) -> Option<f32> {
        self.layers.get(&id).map(Layer::opacity)
    }
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f32) -> Result<(), DocumentError> {
        self.layers
            .get_mut(&id)
            .ok_or(DocumentError::InvalidReference(id))?
            .set_opacity(opacity);
        Ok(())
    }
    /// Change how many bitmaps a layer may keep. Returns how many checkpoints were evicted.
    /// # Errors
    /// [`DocumentError::InvalidReference`] if there is no such layer.
    pub fn set_checkpoint_budget(&mut self, id: LayerId, budget: usize) -> Result<usize, DocumentError> {
        self.with_layer(id, |layer, _| layer.set_checkpoint_budget(budget))
    }
    /// Change the canvas size. Every layer is rebuilt at the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        log::info!(
            "{}: resizing {}x{} -> {width}x{height}",
            self.id,
            self.width,
            self.height
        );
        let resident: Vec<LayerId> = self
            .stack
            .iter()
            .filter(|id| self.layers.get(id).is_some_and(|layer| !layer.is_freed()))
            .collect();
        self.width = width;
        self.height = height;
        self.bitmap_bytes = self.rasterizer.memory_footprint_bytes(width, height);
        for layer in self.layers.values_mut() {
            layer.resize(width, height);
        }
        self.memory_use = 0;
        for id in resident {
            if let Err(err) = self.regenerate(id) {
                log::error!("can't rebuild {id}: {err}");
            }
        }
        self.rebalance();
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.rasterizer.free();
    }
}
