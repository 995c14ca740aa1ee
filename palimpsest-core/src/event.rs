//! # Events
//!
//! Every change to a picture is recorded as an [`Event`] in the log of the layer it affects. Events are
//! immutable once written - undo only flips a flag kept by the owning log, see [`crate::state::layer::History`].
//!
//! Events are identified by `(session, seq)`. Sessions are assigned externally and unique, and a session's
//! sequence numbers only ever go up, so for one session a larger `seq` is always a later edit.

use crate::{blend::BlendMode, color::Color, util::FiniteF32};

/// An authoring session. Every participant editing a picture writes under their own session.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SessionId(pub u32);

/// Globally unique identity of an event.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EventId {
    pub session: SessionId,
    /// Session-local, monotonically increasing.
    pub seq: u32,
}
impl EventId {
    #[must_use]
    pub const fn new(session: u32, seq: u32) -> Self {
        Self {
            session: SessionId(session),
            seq,
        }
    }
}
impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.session.0, self.seq)
    }
}

/// Identity of a layer, unique within one document. Persisted.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LayerId(pub u32);
impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Layer#{}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct StrokePoint {
    pub x: FiniteF32,
    pub y: FiniteF32,
    /// Scales the stroke radius at this point, `[0, 1]`.
    pub pressure: FiniteF32,
}
impl StrokePoint {
    /// Construct from raw floats. None if any are not finite.
    #[must_use]
    pub fn new(x: f32, y: f32, pressure: f32) -> Option<Self> {
        Some(Self {
            x: FiniteF32::new(x).ok()?,
            y: FiniteF32::new(y).ok()?,
            pressure: FiniteF32::new(pressure.clamp(0.0, 1.0)).ok()?,
        })
    }
    #[must_use]
    pub fn position(&self) -> [f32; 2] {
        [self.x.get(), self.y.get()]
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
    /// Radius at full pressure, in pixels.
    pub radius: FiniteF32,
    pub color: Color,
    pub opacity: FiniteF32,
    pub blend: BlendMode,
}

/// Linear gradient filling the whole layer.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Gradient {
    pub from: [FiniteF32; 2],
    pub to: [FiniteF32; 2],
    pub from_color: Color,
    pub to_color: Color,
    pub opacity: FiniteF32,
    pub blend: BlendMode,
}

/// The creation event of a layer. Always the first event of that layer's log.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LayerAdd {
    pub layer: LayerId,
    pub clear_color: Color,
    pub has_alpha: bool,
    /// Stack index the layer was created at, top = 0.
    pub stack_index: usize,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    Stroke(Stroke),
    Gradient(Gradient),
    LayerAdd(LayerAdd),
    /// Lives in the log of the removed layer.
    LayerRemove { layer: LayerId },
    /// Lives in the log of the moved layer.
    LayerMove {
        layer: LayerId,
        from: usize,
        to: usize,
    },
    /// Lives in the log of the surviving layer. The merged layer is referenced by id, and resolved
    /// through the document whenever its pixels are needed.
    LayerMerge {
        merged: LayerId,
        opacity: FiniteF32,
        /// Where the merged layer sat in the stack before the merge, for splicing it back on undo.
        merged_index: usize,
    },
    /// While active, the hidden drawing event is excluded from replay.
    EventHide { hidden: EventId },
}

/// Fieldless mirror of [`EventKind`], used as the keyword of each event in text form.
#[derive(
    strum::AsRefStr, strum::EnumString, strum::EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug,
)]
pub enum EventTag {
    #[strum(serialize = "stroke")]
    Stroke,
    #[strum(serialize = "gradient")]
    Gradient,
    #[strum(serialize = "add")]
    LayerAdd,
    #[strum(serialize = "remove")]
    LayerRemove,
    #[strum(serialize = "move")]
    LayerMove,
    #[strum(serialize = "merge")]
    LayerMerge,
    #[strum(serialize = "hide")]
    EventHide,
}

impl EventKind {
    #[must_use]
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Stroke(_) => EventTag::Stroke,
            Self::Gradient(_) => EventTag::Gradient,
            Self::LayerAdd(_) => EventTag::LayerAdd,
            Self::LayerRemove { .. } => EventTag::LayerRemove,
            Self::LayerMove { .. } => EventTag::LayerMove,
            Self::LayerMerge { .. } => EventTag::LayerMerge,
            Self::EventHide { .. } => EventTag::EventHide,
        }
    }
    /// Does this event put pixels into its layer's bitmap?
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        matches!(
            self,
            Self::Stroke(_) | Self::Gradient(_) | Self::LayerMerge { .. }
        )
    }
    /// Does this event change the layer stack rather than pixels?
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::LayerAdd(_)
                | Self::LayerRemove { .. }
                | Self::LayerMove { .. }
                | Self::LayerMerge { .. }
        )
    }
    #[must_use]
    pub fn layer_add(&self) -> Option<&LayerAdd> {
        match self {
            Self::LayerAdd(add) => Some(add),
            _ => None,
        }
    }
    /// The id of the layer merged away by this event, if it is a merge.
    #[must_use]
    pub fn merged_layer(&self) -> Option<LayerId> {
        match self {
            Self::LayerMerge { merged, .. } => Some(*merged),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Event {
    pub id: EventId,
    /// Where in the log this event belongs, if it arrived out of order. `None` appends.
    pub insertion_point: Option<usize>,
    pub kind: EventKind,
}
impl Event {
    #[must_use]
    pub fn new(id: EventId, kind: EventKind) -> Self {
        Self {
            id,
            insertion_point: None,
            kind,
        }
    }
    #[must_use]
    pub fn inserted_at(mut self, insertion_point: usize) -> Self {
        self.insertion_point = Some(insertion_point);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn tags_roundtrip() {
        use strum::IntoEnumIterator;
        for tag in EventTag::iter() {
            assert_eq!(tag.as_ref().parse::<EventTag>().unwrap(), tag);
        }
        assert!("paint".parse::<EventTag>().is_err());
    }
    #[test]
    fn classification() {
        let merge = EventKind::LayerMerge {
            merged: LayerId(2),
            opacity: FiniteF32::ONE,
            merged_index: 0,
        };
        assert!(merge.is_drawing());
        assert!(merge.is_structural());
        assert_eq!(merge.merged_layer(), Some(LayerId(2)));
        let hide = EventKind::EventHide {
            hidden: EventId::new(1, 4),
        };
        assert!(!hide.is_drawing());
        assert!(!hide.is_structural());
        assert_eq!(hide.tag(), EventTag::EventHide);
    }
}
