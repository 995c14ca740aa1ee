//! # State
//!
//! Layers, their checkpoints, and the [`Document`] that orchestrates them.

pub mod checkpoint;
pub mod document;
pub mod layer;
pub mod stack;

pub use document::{budget::MemoryExhausted, Document, DocumentError, DocumentID};
