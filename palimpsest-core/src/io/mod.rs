//! # Persistence
//!
//! Documents are stored as line-oriented text, see [`text`]. The format carries the event logs only - pixels
//! and checkpoints are always rebuilt after loading.
//!
//! Reading and writing goes through [`Picture`], a plain-data view of a document, so the format can be
//! checked for losslessness without a rasterizer.

pub mod text;

pub use text::{read, write, ParseError};

use crate::{
    config::DocumentConfig,
    event::{Event, LayerId},
    raster::Backend,
    state::{Document, DocumentError},
};

/// An event along with its undo state, as persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedEvent {
    pub event: Event,
    pub undone: bool,
}

/// Everything persisted about a document.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    /// Layer logs. Merged-away layers come first in the order they were merged, then the stack from the top.
    /// Every log starts with the layer's creation event.
    pub layers: Vec<Vec<LoggedEvent>>,
    /// Opaque lines following the `metadata` marker, if there is one.
    pub metadata: Option<Vec<String>>,
}
impl Picture {
    /// Id of each layer, in order. None for an empty log, which is never valid.
    pub fn layer_ids(&self) -> impl Iterator<Item = Option<LayerId>> + '_ {
        self.layers.iter().map(|log| {
            log.first()
                .and_then(|first| first.event.kind.layer_add())
                .map(|add| add.layer)
        })
    }
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }
}

/// Parse a document and set it up with a fresh instance of `backend`.
/// # Errors
/// Malformed text, or a backend that fails its sanity check.
pub fn read_document<R: std::io::BufRead>(
    reader: R,
    backend: Backend,
    config: DocumentConfig,
) -> Result<Document, DocumentError> {
    let picture = read(reader)?;
    log::debug!(
        "read {}x{} picture, {} layers, {} events",
        picture.width,
        picture.height,
        picture.layers.len(),
        picture.event_count()
    );
    Document::from_picture(picture, backend.create(), config)
}

/// Serialize a document's event logs.
/// # Errors
/// Errors are forwarded from `writer`.
pub fn write_document<W: std::io::Write>(document: &Document, writer: W) -> std::io::Result<()> {
    write(&document.to_picture(), writer)
}
