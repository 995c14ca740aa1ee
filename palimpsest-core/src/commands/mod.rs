//! # Commands
//!
//! Applying, undoing, and redoing an event touches two separate pieces of state: the pixels of the layer that
//! owns it (handled by replay, see [`crate::state::layer`]) and the bookkeeping that lives outside the layer,
//! like the order of the stack. The latter is expressed as a [`CommandConsumer`] fed [`DoUndo`]s.

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
}
pub trait CommandConsumer<C> {
    /// Apply a single command. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<(), CommandError>;
}

#[derive(PartialEq, Eq, Debug)]
pub enum DoUndo<'c, T> {
    Do(&'c T),
    Undo(&'c T),
}
impl<'c, T> DoUndo<'c, T> {
    /// Apply a closure to the inner type T, maintaining the
    /// Do or Undo status. Returns None if the closure returns None.
    pub fn filter_map<Func, Return>(&self, f: Func) -> Option<DoUndo<'c, Return>>
    where
        Func: FnOnce(&'c T) -> Option<&'c Return>,
        Return: 'c,
    {
        match self {
            Self::Do(c) => Some(DoUndo::Do(f(c)?)),
            Self::Undo(c) => Some(DoUndo::Undo(f(c)?)),
        }
    }
    /// The wrapped command, regardless of direction.
    #[must_use]
    pub fn inner(&self) -> &'c T {
        match self {
            Self::Do(c) | Self::Undo(c) => c,
        }
    }
    #[must_use]
    pub fn is_undo(&self) -> bool {
        matches!(self, Self::Undo(_))
    }
}
// Derive would needlessly require T: Clone
impl<T> Clone for DoUndo<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DoUndo<'_, T> {}
