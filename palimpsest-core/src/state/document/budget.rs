//! Keeping resident pixels within the document's memory budget.
//!
//! Memory is reclaimed by lowering checkpoint budgets one step at a time, never by dropping history. When that
//! bottoms out, removed and merged-away layers with short logs may be freed outright, since rebuilding them
//! is cheap. If that still isn't enough, the document carries on over budget and reports [`MemoryExhausted`].

use super::Document;
use crate::{config::DocumentConfig, event::LayerId, state::layer::Layer};

#[allow(clippy::cast_precision_loss)]
pub(crate) fn bytes(count: &usize) -> String {
    human_bytes::human_bytes(*count as f64)
}

/// The budget can't be met even with every layer down to its live bitmap.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{} over the {} memory budget, with every checkpoint budget at its floor", bytes(.over), bytes(.budget))]
pub struct MemoryExhausted {
    pub budget: usize,
    pub over: usize,
}

impl Document {
    /// Bytes currently held by layer bitmaps and checkpoints.
    #[must_use]
    pub fn memory_use(&self) -> usize {
        self.memory_use
    }
    #[must_use]
    pub fn memory_budget(&self) -> usize {
        self.config.memory_budget
    }
    /// Cost of one bitmap at the current canvas size.
    #[must_use]
    pub fn bitmap_bytes(&self) -> usize {
        self.bitmap_bytes
    }
    /// Set when the last operation could not get within budget.
    #[must_use]
    pub fn budget_warning(&self) -> Option<MemoryExhausted> {
        self.budget_warning
    }
    /// Recount memory use from scratch, rather than the running total of [`Self::memory_use`].
    #[must_use]
    pub fn resident_bytes(&self) -> usize {
        self.layers
            .values()
            .map(|layer| layer.memory_bytes(self.bitmap_bytes))
            .sum()
    }
    /// Change the budget, reclaiming memory right away if it now runs over.
    /// # Errors
    /// [`MemoryExhausted`] if the new budget can't be met. The document remains usable.
    pub fn set_memory_budget(&mut self, budget: usize) -> Result<(), MemoryExhausted> {
        log::debug!("memory budget {} -> {}", bytes(&self.config.memory_budget), bytes(&budget));
        self.config.memory_budget = budget;
        self.rebalance();
        match self.budget_warning {
            Some(exhausted) => Err(exhausted),
            None => Ok(()),
        }
    }
    /// Lower checkpoint budgets until `extra` more bytes fit within the memory budget.
    /// # Errors
    /// [`MemoryExhausted`] if every budget reached its floor first. Whatever could be reclaimed has been.
    pub fn stay_within_memory_budget(&mut self, extra: usize) -> Result<(), MemoryExhausted> {
        let target = self.config.memory_budget.saturating_sub(extra);
        let start = self.memory_use;
        while self.memory_use > target {
            let Some(victim) = self.eviction_candidate() else {
                return Err(MemoryExhausted {
                    budget: self.config.memory_budget,
                    over: self.memory_use - target,
                });
            };
            let lowered = self.with_layer(victim, |layer, _| {
                let budget = layer.checkpoint_budget() - 1;
                layer.set_checkpoint_budget(budget);
                budget
            });
            match lowered {
                Ok(budget) => log::trace!("{victim} checkpoint budget lowered to {budget}"),
                Err(err) => {
                    log::error!("{err}");
                    break;
                }
            }
        }
        if start > self.memory_use {
            log::debug!("reclaimed {}", bytes(&(start - self.memory_use)));
        }
        Ok(())
    }
    /// The layer to give up a step of checkpoint budget next, if any still can.
    ///
    /// Priority is `budget - retained * weight`, plus a bonus for layers that aren't part of the picture.
    fn eviction_candidate(&self) -> Option<LayerId> {
        self.layers
            .values()
            .filter(|layer| layer.checkpoint_budget() > DocumentConfig::MIN_CHECKPOINT_BUDGET)
            .map(|layer| {
                #[allow(clippy::cast_precision_loss)]
                let mut priority = layer.checkpoint_budget() as f32
                    - layer.checkpoints().len() as f32 * self.config.eviction_weight;
                if !layer.is_present() {
                    priority += self.config.inactive_bonus;
                }
                (priority, layer.id())
            })
            // Lowest id wins ties, so eviction doesn't depend on arena order.
            .max_by(|(a, a_id), (b, b_id)| a.total_cmp(b).then_with(|| b_id.cmp(a_id)))
            .map(|(_, id)| id)
    }
    /// Free layers outside the picture with logs short enough to cheaply rebuild, until within budget.
    /// Returns how many were freed.
    fn free_inactive(&mut self) -> usize {
        let mut candidates: Vec<LayerId> = self
            .layers
            .values()
            .filter(|layer| {
                !layer.is_present()
                    && !layer.is_freed()
                    && layer.event_count() <= self.config.free_event_threshold
            })
            .map(Layer::id)
            .collect();
        candidates.sort_unstable();
        let mut freed = 0;
        for id in candidates {
            if self.memory_use <= self.config.memory_budget {
                break;
            }
            if let Ok(true) = self.with_layer(id, |layer, _| layer.free()) {
                log::debug!("freed {id}");
                freed += 1;
            }
        }
        freed
    }
    /// Make room ahead of allocating `extra` bytes. Best effort.
    pub(super) fn reserve(&mut self, extra: usize) {
        if let Err(exhausted) = self.stay_within_memory_budget(extra) {
            log::debug!("reserving {}: {exhausted}", bytes(&extra));
        }
    }
    /// Get back within budget after an operation, recording a warning if that's impossible.
    pub(super) fn rebalance(&mut self) {
        let mut result = self.stay_within_memory_budget(0);
        if result.is_err() && self.free_inactive() > 0 {
            result = self.stay_within_memory_budget(0);
        }
        match result {
            Ok(()) => self.budget_warning = None,
            Err(exhausted) => {
                if self.budget_warning != Some(exhausted) {
                    log::warn!("{exhausted}");
                }
                self.budget_warning = Some(exhausted);
            }
        }
    }
}
