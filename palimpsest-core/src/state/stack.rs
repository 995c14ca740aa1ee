//! Order of layers in the picture.
//!
//! Removal and undone creation are soft: those layers keep their slot, and are simply not drawn. Only merges
//! take a layer out of the order, parking it in the merged set until the merge is undone.

use crate::{
    commands::{CommandConsumer, CommandError, DoUndo},
    event::{EventKind, LayerId},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    /// Top = 0.
    order: Vec<LayerId>,
    /// Merged-away layers, in the order they were merged.
    merged: Vec<LayerId>,
}
impl Stack {
    pub(in crate::state) fn from_parts(order: Vec<LayerId>, merged: Vec<LayerId>) -> Self {
        Self { order, merged }
    }
    /// Layers in the stack, top first.
    #[must_use]
    pub fn order(&self) -> &[LayerId] {
        &self.order
    }
    #[must_use]
    pub fn merged(&self) -> &[LayerId] {
        &self.merged
    }
    #[must_use]
    pub fn index_of(&self, layer: LayerId) -> Option<usize> {
        self.order.iter().position(|&id| id == layer)
    }
    #[must_use]
    pub fn is_merged(&self, layer: LayerId) -> bool {
        self.merged.contains(&layer)
    }
    /// Place a new layer at `index`, clamped to the bottom. Returns where it landed.
    pub(in crate::state) fn insert(&mut self, layer: LayerId, index: usize) -> usize {
        let index = index.min(self.order.len());
        self.order.insert(index, layer);
        index
    }
    /// Every layer, stack first then merged.
    pub fn iter(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.order.iter().chain(self.merged.iter()).copied()
    }
}

impl CommandConsumer<EventKind> for Stack {
    fn apply(&mut self, command: DoUndo<'_, EventKind>) -> Result<(), CommandError> {
        match command {
            DoUndo::Do(EventKind::LayerMove { layer, to, .. })
            | DoUndo::Undo(EventKind::LayerMove {
                layer, from: to, ..
            }) => {
                let Some(current) = self.index_of(*layer) else {
                    return Err(CommandError::UnknownResource);
                };
                self.order.remove(current);
                let to = (*to).min(self.order.len());
                self.order.insert(to, *layer);
                Ok(())
            }
            DoUndo::Do(EventKind::LayerMerge { merged, .. }) => {
                let Some(current) = self.index_of(*merged) else {
                    return Err(CommandError::UnknownResource);
                };
                self.order.remove(current);
                self.merged.push(*merged);
                Ok(())
            }
            DoUndo::Undo(EventKind::LayerMerge {
                merged,
                merged_index,
                ..
            }) => {
                let Some(current) = self.merged.iter().position(|id| id == merged) else {
                    return Err(CommandError::UnknownResource);
                };
                self.merged.remove(current);
                let index = (*merged_index).min(self.order.len());
                self.order.insert(index, *merged);
                Ok(())
            }
            // Soft - the layer keeps its place either way.
            DoUndo::Do(EventKind::LayerAdd(add)) | DoUndo::Undo(EventKind::LayerAdd(add)) => {
                if self.order.contains(&add.layer) || self.merged.contains(&add.layer) {
                    Ok(())
                } else {
                    Err(CommandError::UnknownResource)
                }
            }
            DoUndo::Do(EventKind::LayerRemove { layer })
            | DoUndo::Undo(EventKind::LayerRemove { layer }) => {
                if self.order.contains(layer) || self.merged.contains(layer) {
                    Ok(())
                } else {
                    Err(CommandError::UnknownResource)
                }
            }
            // Not structural.
            DoUndo::Do(
                EventKind::Stroke(_) | EventKind::Gradient(_) | EventKind::EventHide { .. },
            )
            | DoUndo::Undo(
                EventKind::Stroke(_) | EventKind::Gradient(_) | EventKind::EventHide { .. },
            ) => Ok(()),
        }
    }
}
