//! Process-wide cache of precomputed rasterizer tables, keyed by the backend instance that owns them.
//!
//! Lifecycle is explicit: an instance's entry is created on its first [`acquire`] and dropped by [`release`]
//! (called from [`super::Rasterizer::free`]). Nothing is memoized implicitly.

use std::sync::Arc;

/// Namespace marker for backend instance handles.
pub struct BackendInstance;
pub type BackendHandle = crate::id::ProcessID<BackendInstance>;

static TABLES: parking_lot::Mutex<Option<hashbrown::HashMap<BackendHandle, Arc<[f32]>>>> =
    parking_lot::const_mutex(None);

/// Fetch the table of `handle`, building it with `init` if this is its first use.
pub fn acquire(handle: BackendHandle, init: impl FnOnce() -> Vec<f32>) -> Arc<[f32]> {
    let mut lock = TABLES.lock();
    let tables = lock.get_or_insert_with(hashbrown::HashMap::new);
    tables
        .entry(handle)
        .or_insert_with(|| {
            log::trace!("building raster table for {handle}");
            init().into()
        })
        .clone()
}

/// Drop the table of `handle`, if any. Holders of the `Arc` keep theirs alive until they let go.
pub fn release(handle: BackendHandle) {
    let mut lock = TABLES.lock();
    if let Some(tables) = lock.as_mut() {
        if tables.remove(&handle).is_some() {
            log::trace!("released raster table for {handle}");
        }
    }
}

/// Is there a table held for `handle`?
#[must_use]
pub fn is_held(handle: BackendHandle) -> bool {
    TABLES
        .lock()
        .as_ref()
        .is_some_and(|tables| tables.contains_key(&handle))
}

/// Bytes held by the table of `handle`.
#[must_use]
pub fn held_bytes(handle: BackendHandle) -> usize {
    TABLES
        .lock()
        .as_ref()
        .and_then(|tables| tables.get(&handle))
        .map_or(0, |table| std::mem::size_of_val(&**table))
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn first_use_initializes_and_release_drops() {
        let handle = BackendHandle::default();
        assert!(!is_held(handle));
        let mut calls = 0;
        let table = acquire(handle, || {
            calls += 1;
            vec![0.5; 4]
        });
        assert_eq!(&*table, &[0.5; 4]);
        // Second acquire reuses.
        let again = acquire(handle, || unreachable!());
        assert!(Arc::ptr_eq(&table, &again));
        assert_eq!(calls, 1);
        assert_eq!(held_bytes(handle), 16);

        release(handle);
        assert!(!is_held(handle));
        // Still valid for existing holders.
        assert_eq!(table.len(), 4);
    }
}
