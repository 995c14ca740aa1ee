//! Tunables of a document. Everything here affects performance and memory only, never the pixels produced.

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Bytes all layers' bitmaps and checkpoints may occupy together.
    pub memory_budget: usize,
    /// Events between opportunistic checkpoints.
    pub checkpoint_interval: usize,
    /// Checkpoint budget given to new layers. Counts the live bitmap, so `1` means no history is cached.
    pub default_checkpoint_budget: usize,
    /// Weight of already-retained checkpoints when choosing which layer gives up budget.
    pub eviction_weight: f32,
    /// Priority bonus of removed and merged-away layers when choosing which layer gives up budget.
    pub inactive_bonus: f32,
    /// Removed or merged-away layers with at most this many events may be freed entirely under memory pressure.
    pub free_event_threshold: usize,
    /// Refuse to undo the creation of the last remaining layer.
    pub keep_last_layer: bool,
}
impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            // 256MiB
            memory_budget: 256 * 1024 * 1024,
            checkpoint_interval: 16,
            default_checkpoint_budget: 5,
            eviction_weight: 0.5,
            inactive_bonus: 4.0,
            free_event_threshold: 64,
            keep_last_layer: true,
        }
    }
}
impl DocumentConfig {
    /// Checkpoint budgets never go below this. The live bitmap is the one slot that is never evicted.
    pub const MIN_CHECKPOINT_BUDGET: usize = 1;
}
