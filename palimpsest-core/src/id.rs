//! # Process IDs
//! Some things only need to be unique within this execution of the program, never persisted: open documents,
//! rasterizer backend instances keyed into the shared caches, etc. This is implemented via the `ProcessID<T>` type,
//! which generates unique IDs namespaced by the type T.
//!
//! IDs that end up in a saved picture (layers, sessions) are *not* these - see [`crate::event`].

// Next available ID by namespace.
static ID_SERVER: parking_lot::Mutex<
    std::collections::BTreeMap<std::any::TypeId, std::num::NonZeroU64>,
> = parking_lot::const_mutex(std::collections::BTreeMap::new());

/// ID that is guarunteed unique within this execution of the program.
/// IDs with different types may share a value but should not be considered equal.
pub struct ProcessID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    // Namespace marker
    _phantom: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> Clone for ProcessID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for ProcessID<T> {}
impl<T: std::any::Any> PartialEq for ProcessID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for ProcessID<T> {}
impl<T: std::any::Any> std::hash::Hash for ProcessID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T: std::any::Any> ProcessID<T> {
    /// Get the raw numeric value of this ID.
    /// IDs from differing namespaces may share the same numeric ID!
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
}
impl<T: std::any::Any> Default for ProcessID<T> {
    /// Allocate a fresh ID.
    fn default() -> Self {
        let mut server = ID_SERVER.lock();
        let next = server
            .entry(std::any::TypeId::of::<T>())
            .or_insert(std::num::NonZeroU64::MIN);
        let id = *next;
        // 2^64 allocations won't happen in the life of a painting program.
        // If it somehow does, global state is unfixably broken.
        let Some(following) = next.checked_add(1) else {
            log::error!("{} ID overflow! Aborting!", std::any::type_name::<T>());
            std::process::abort();
        };
        *next = following;
        Self {
            id,
            _phantom: std::marker::PhantomData,
        }
    }
}
impl<T: std::any::Any> std::fmt::Display for ProcessID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The rsplit will always return at least one element, even for empty strings.
        write!(
            f,
            "{}#{}",
            std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or_default(),
            self.id
        )
    }
}
impl<T: std::any::Any> std::fmt::Debug for ProcessID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::ProcessID;
    // Tests modify global shared state, as they're running in one process. :V
    // Thus they must all have their own ID namespace.

    #[test]
    fn ids_unique() {
        struct Namespace;
        type TestID = ProcessID<Namespace>;

        let mut v: Vec<_> = (0..1024).map(|_| TestID::default()).collect();
        v.sort_unstable_by_key(TestID::id);
        let length_before = v.len();
        v.dedup();
        assert_eq!(length_before, v.len(), "had duplicate ids");
    }
    #[test]
    fn namespaced_display() {
        struct Widget;
        let id = ProcessID::<Widget>::default();
        assert_eq!(id.to_string(), "Widget#1");
    }
}
