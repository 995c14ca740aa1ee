//! The ordered event log of a single layer.

use crate::event::{Event, EventId, EventKind, LayerId, SessionId};

/// Events of one layer in log order, plus which of them are undone.
///
/// Log order is insertion order, which is usually but not necessarily chronological - late events from
/// other sessions are inserted in the middle.
#[derive(Clone, Debug)]
pub struct History {
    events: Vec<Event>,
    /// Parallel to `events`. Undo never removes an event, it only sets its bit.
    undone: bitvec::vec::BitVec,
    /// Where each identity sits in `events`. If an identity is logged twice, the first one.
    positions: hashbrown::HashMap<EventId, usize>,
}

/// A borrowed event along with its position and undo state.
#[derive(Clone, Copy, Debug)]
pub struct EventRef<'a> {
    pub index: usize,
    pub event: &'a Event,
    undone: bool,
}
impl EventRef<'_> {
    #[must_use]
    pub fn undone(&self) -> bool {
        self.undone
    }
}

impl History {
    /// Start a log with its creation event.
    #[must_use]
    pub fn new(creation: Event, undone: bool) -> Self {
        let mut undone_bits = bitvec::vec::BitVec::with_capacity(1);
        undone_bits.push(undone);
        let mut positions = hashbrown::HashMap::new();
        positions.insert(creation.id, 0);
        Self {
            events: vec![creation],
            undone: undone_bits,
            positions,
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }
    /// Never true - the creation event can't be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    #[must_use]
    pub fn get(&self, index: usize) -> Option<EventRef<'_>> {
        Some(EventRef {
            index,
            event: self.events.get(index)?,
            undone: *self.undone.get(index)?,
        })
    }
    #[must_use]
    pub fn event(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }
    /// Out-of-bounds reads as undone.
    #[must_use]
    pub fn is_undone(&self, index: usize) -> bool {
        self.undone.get(index).as_deref().copied().unwrap_or(true)
    }
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = EventRef<'_>> + '_ {
        self.events
            .iter()
            .zip(self.undone.iter().by_vals())
            .enumerate()
            .map(|(index, (event, undone))| EventRef {
                index,
                event,
                undone,
            })
    }
    /// Iterate the events that are not undone.
    pub fn iter_active(&self) -> impl DoubleEndedIterator<Item = EventRef<'_>> + '_ {
        self.iter().filter(|event| !event.undone)
    }
    /// Set the undone flag, returning the old value. None if out of bounds.
    pub(super) fn set_undone(&mut self, index: usize, undone: bool) -> Option<bool> {
        let mut bit = self.undone.get_mut(index)?;
        Some(std::mem::replace(&mut *bit, undone))
    }
    pub(super) fn push(&mut self, event: Event, undone: bool) -> usize {
        let index = self.events.len();
        self.positions.entry(event.id).or_insert(index);
        self.events.push(event);
        self.undone.push(undone);
        index
    }
    /// Insert at `index`, which must be within `1..=len` - nothing may precede the creation event.
    pub(super) fn insert(&mut self, index: usize, event: Event, undone: bool) {
        debug_assert!(index >= 1 && index <= self.events.len());
        for position in self.positions.values_mut() {
            if *position >= index {
                *position += 1;
            }
        }
        self.positions
            .entry(event.id)
            .and_modify(|position| *position = (*position).min(index))
            .or_insert(index);
        self.events.insert(index, event);
        self.undone.insert(index, undone);
    }
    /// Physically remove an event. The creation event can't be removed.
    pub(super) fn remove(&mut self, index: usize) -> Option<(Event, bool)> {
        if index == 0 || index >= self.events.len() {
            return None;
        }
        let undone = self.undone.remove(index);
        let event = self.events.remove(index);
        for position in self.positions.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }
        if self.positions.get(&event.id) == Some(&index) {
            match self.events.iter().position(|other| other.id == event.id) {
                Some(again) => self.positions.insert(event.id, again),
                None => self.positions.remove(&event.id),
            };
        }
        Some((event, undone))
    }
    /// Position of the event with this identity.
    #[must_use]
    pub fn position(&self, id: EventId) -> Option<usize> {
        self.positions.get(&id).copied()
    }
    /// Position of the event with the highest sequence number written by `session`.
    #[must_use]
    pub fn latest_of(&self, session: SessionId, include_undone: bool) -> Option<usize> {
        self.iter()
            .filter(|event| event.event.id.session == session && (include_undone || !event.undone))
            .max_by_key(|event| event.event.id.seq)
            .map(|event| event.index)
    }
    /// Events currently hidden by an active [`EventKind::EventHide`].
    #[must_use]
    pub fn hidden(&self) -> hashbrown::HashSet<EventId> {
        self.iter_active()
            .filter_map(|event| match event.event.kind {
                EventKind::EventHide { hidden } => Some(hidden),
                _ => None,
            })
            .collect()
    }
    /// Does the event at `index` currently contribute to the layer?
    #[must_use]
    pub fn is_effective(&self, index: usize, hidden: &hashbrown::HashSet<EventId>) -> bool {
        self.get(index)
            .is_some_and(|event| !event.undone && !hidden.contains(&event.event.id))
    }
    /// Layers merged into this one by active merge events, in log order.
    pub fn active_merges(&self) -> impl Iterator<Item = (usize, LayerId)> + '_ {
        self.iter_active()
            .filter_map(|event| Some((event.index, event.event.kind.merged_layer()?)))
    }
    /// Position of the active merge of `merged` into this layer.
    #[must_use]
    pub fn merge_position(&self, merged: LayerId) -> Option<usize> {
        self.active_merges()
            .find(|&(_, id)| id == merged)
            .map(|(index, _)| index)
    }
    /// Is there an active removal event?
    #[must_use]
    pub fn has_active_removal(&self) -> bool {
        self.iter_active()
            .any(|event| matches!(event.event.kind, EventKind::LayerRemove { .. }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{color::Color, event::LayerAdd};

    fn creation() -> Event {
        Event::new(
            EventId::new(1, 0),
            EventKind::LayerAdd(LayerAdd {
                layer: LayerId(0),
                clear_color: Color::TRANSPARENT,
                has_alpha: true,
                stack_index: 0,
            }),
        )
    }
    fn hide(seq: u32, hidden: EventId) -> Event {
        Event::new(EventId::new(1, seq), EventKind::EventHide { hidden })
    }

    #[test]
    fn latest_skips_undone() {
        let mut history = History::new(creation(), false);
        history.push(hide(1, EventId::new(9, 9)), false);
        history.push(hide(2, EventId::new(9, 9)), true);
        history.push(
            Event::new(EventId::new(2, 50), EventKind::LayerRemove { layer: LayerId(0) }),
            false,
        );
        assert_eq!(history.latest_of(SessionId(1), false), Some(1));
        assert_eq!(history.latest_of(SessionId(1), true), Some(2));
        assert_eq!(history.latest_of(SessionId(2), false), Some(3));
        assert_eq!(history.latest_of(SessionId(3), true), None);
        assert!(history.has_active_removal());
    }
    #[test]
    fn creation_is_permanent() {
        let mut history = History::new(creation(), false);
        assert!(history.remove(0).is_none());
        history.insert(1, hide(1, EventId::new(1, 0)), true);
        assert_eq!(history.remove(1).map(|(_, undone)| undone), Some(true));
        assert_eq!(history.len(), 1);
    }
    #[test]
    fn positions_follow_inserts_and_removals() {
        let mut history = History::new(creation(), false);
        for seq in 1..5 {
            history.push(hide(seq, EventId::new(9, 9)), false);
        }
        let late = hide(40, EventId::new(9, 9));
        history.insert(2, late.clone(), false);
        assert_eq!(history.position(late.id), Some(2));
        assert_eq!(history.position(EventId::new(1, 2)), Some(3));
        assert_eq!(history.position(EventId::new(1, 4)), Some(5));

        history.remove(1);
        assert_eq!(history.position(EventId::new(1, 1)), None);
        assert_eq!(history.position(late.id), Some(1));
        assert_eq!(history.position(EventId::new(1, 4)), Some(4));
        for (index, event) in history.iter().enumerate() {
            assert_eq!(history.position(event.event.id), Some(index));
        }

        // A repeated identity resolves to its first entry, and to the other one once that is gone.
        history.push(late.clone(), false);
        assert_eq!(history.position(late.id), Some(1));
        history.remove(1);
        assert_eq!(history.position(late.id), Some(history.len() - 1));
    }
    #[test]
    fn hidden_tracks_undo() {
        let target = EventId::new(1, 0);
        let mut history = History::new(creation(), false);
        let idx = history.push(hide(1, target), false);
        assert!(history.hidden().contains(&target));
        assert!(!history.is_effective(0, &history.hidden()));
        history.set_undone(idx, true);
        assert!(history.hidden().is_empty());
        assert!(history.is_effective(0, &history.hidden()));
    }
}
