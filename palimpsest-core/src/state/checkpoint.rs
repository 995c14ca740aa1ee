//! Cached intermediate bitmaps of one layer.
//!
//! A checkpoint at `log_index` `k` is the layer's bitmap after replaying its first `k` events. Replaying to any
//! position starts from the nearest checkpoint at or before it, instead of from the clear color.

use crate::raster::Bitmap;

#[derive(Clone, Debug)]
pub struct Checkpoint {
    log_index: usize,
    /// Events between this checkpoint and the previous one (or the start of the log), i.e. what
    /// evicting the *previous* checkpoint would add to the replay distance of this one.
    cost: usize,
    bitmap: Bitmap,
}
impl Checkpoint {
    /// Number of leading log events this bitmap includes.
    #[must_use]
    pub fn log_index(&self) -> usize {
        self.log_index
    }
    #[must_use]
    pub fn cost(&self) -> usize {
        self.cost
    }
    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
}

/// Checkpoints of one layer, sorted by log index, never more than `budget - 1` of them.
///
/// The budget counts the layer's live bitmap too, which is not stored here and never evicted.
#[derive(Clone, Debug)]
pub struct CheckpointCache {
    checkpoints: Vec<Checkpoint>,
    budget: usize,
}
impl CheckpointCache {
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            checkpoints: Vec::new(),
            budget: budget.max(crate::config::DocumentConfig::MIN_CHECKPOINT_BUDGET),
        }
    }
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }
    /// How many checkpoints may be held at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.budget - 1
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> + '_ {
        self.checkpoints.iter()
    }
    /// The checkpoint with the greatest log index `<= log_index`.
    #[must_use]
    pub fn nearest(&self, log_index: usize) -> Option<&Checkpoint> {
        let after = self
            .checkpoints
            .partition_point(|checkpoint| checkpoint.log_index <= log_index);
        after.checked_sub(1).map(|idx| &self.checkpoints[idx])
    }
    /// Log index of the newest checkpoint.
    #[must_use]
    pub fn newest_index(&self) -> Option<usize> {
        self.checkpoints.last().map(Checkpoint::log_index)
    }
    /// Offer a snapshot of the layer after `log_index` events. Returns whether it was kept.
    ///
    /// If keeping it exceeds the budget, the cheapest checkpoint to lose is evicted, which may be the new one.
    pub fn offer(&mut self, log_index: usize, bitmap: &Bitmap) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let position = self
            .checkpoints
            .partition_point(|checkpoint| checkpoint.log_index < log_index);
        if let Some(existing) = self.checkpoints.get_mut(position) {
            if existing.log_index == log_index {
                existing.bitmap.clone_from(bitmap);
                return true;
            }
        }
        self.checkpoints.insert(
            position,
            Checkpoint {
                log_index,
                cost: 0,
                bitmap: bitmap.clone(),
            },
        );
        self.recompute_costs();
        let mut kept = true;
        while self.checkpoints.len() > self.capacity() {
            match self.evict_one() {
                Some(evicted) => kept &= evicted != log_index,
                None => break,
            }
        }
        kept
    }
    /// Drop every checkpoint covering more than `log_index` events. Returns how many were dropped.
    pub fn invalidate_after(&mut self, log_index: usize) -> usize {
        let keep = self
            .checkpoints
            .partition_point(|checkpoint| checkpoint.log_index <= log_index);
        let dropped = self.checkpoints.len() - keep;
        self.checkpoints.truncate(keep);
        dropped
    }
    /// Renumber checkpoints covering more than `log_index` events after a log edit that didn't change their
    /// pixels, such as inserting or removing an undone event.
    pub fn shift_after(&mut self, log_index: usize, delta: isize) {
        for checkpoint in &mut self.checkpoints {
            if checkpoint.log_index > log_index {
                checkpoint.log_index = checkpoint.log_index.saturating_add_signed(delta);
            }
        }
        // Shifting down can collide with the checkpoint at `log_index` itself.
        self.checkpoints
            .dedup_by(|later, earlier| later.log_index == earlier.log_index);
        self.recompute_costs();
    }
    /// Change the budget, evicting as needed. Returns how many checkpoints were evicted.
    pub fn set_budget(&mut self, budget: usize) -> usize {
        self.budget = budget.max(crate::config::DocumentConfig::MIN_CHECKPOINT_BUDGET);
        let mut evicted = 0;
        while self.checkpoints.len() > self.capacity() && self.evict_one().is_some() {
            evicted += 1;
        }
        evicted
    }
    /// Drop all checkpoints. Returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.checkpoints.len();
        self.checkpoints.clear();
        count
    }
    fn recompute_costs(&mut self) {
        let mut previous = 0;
        for checkpoint in &mut self.checkpoints {
            checkpoint.cost = checkpoint.log_index - previous;
            previous = checkpoint.log_index;
        }
    }
    /// Evict the checkpoint whose loss lengthens replay the least. Returns its log index.
    ///
    /// The newest checkpoint is only evicted when it is the only one.
    fn evict_one(&mut self) -> Option<usize> {
        let victim = match self.checkpoints.len() {
            0 => return None,
            1 => 0,
            len => (0..len - 1)
                // Losing `i` merges its span into `i + 1`'s. Ties go to the oldest.
                .min_by_key(|&i| (self.checkpoints[i].cost + self.checkpoints[i + 1].cost, i))
                .unwrap_or(0),
        };
        let evicted = self.checkpoints.remove(victim);
        log::trace!("evicted checkpoint at {}", evicted.log_index);
        self.recompute_costs();
        Some(evicted.log_index)
    }
}

#[cfg(test)]
mod test {
    use super::CheckpointCache;
    use crate::{color::Color, raster::Bitmap};

    fn bitmap() -> Bitmap {
        Bitmap::new(1, 1, Color::TRANSPARENT, true)
    }
    fn indices(cache: &CheckpointCache) -> Vec<usize> {
        cache.iter().map(super::Checkpoint::log_index).collect()
    }
    #[test]
    fn budget_counts_live_bitmap() {
        let mut cache = CheckpointCache::new(1);
        assert!(!cache.offer(4, &bitmap()));
        assert!(cache.is_empty());

        let mut cache = CheckpointCache::new(3);
        assert!(cache.offer(4, &bitmap()));
        assert!(cache.offer(8, &bitmap()));
        assert!(cache.offer(12, &bitmap()));
        assert_eq!(cache.len(), 2);
        // Newest survives.
        assert_eq!(cache.newest_index(), Some(12));
    }
    #[test]
    fn evicts_smallest_gap() {
        let mut cache = CheckpointCache::new(4);
        for index in [10, 12, 30] {
            cache.offer(index, &bitmap());
        }
        // Losing 10 leaves a 12 event span, any other loss leaves more.
        cache.offer(40, &bitmap());
        assert_eq!(indices(&cache), vec![12, 30, 40]);
    }
    #[test]
    fn nearest_and_invalidate() {
        let mut cache = CheckpointCache::new(8);
        for index in [5, 10, 15] {
            cache.offer(index, &bitmap());
        }
        assert_eq!(cache.nearest(12).map(super::Checkpoint::log_index), Some(10));
        assert_eq!(cache.nearest(10).map(super::Checkpoint::log_index), Some(10));
        assert!(cache.nearest(4).is_none());
        assert_eq!(cache.invalidate_after(10), 1);
        assert_eq!(indices(&cache), vec![5, 10]);
    }
    #[test]
    fn shift_and_shrink() {
        let mut cache = CheckpointCache::new(8);
        for index in [5, 10, 15] {
            cache.offer(index, &bitmap());
        }
        cache.shift_after(7, -1);
        assert_eq!(indices(&cache), vec![5, 9, 14]);
        assert_eq!(cache.set_budget(2), 2);
        assert_eq!(indices(&cache), vec![14]);
        // Floor of one.
        cache.set_budget(0);
        assert_eq!(cache.budget(), 1);
        assert!(cache.is_empty());
    }
}
