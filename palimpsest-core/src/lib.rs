//! # palimpsest-core
//!
//! A layered drawing document kept as per-layer event logs. Pixels are only ever a cache of replaying those
//! logs, kept fast with budgeted checkpoints and discarded under memory pressure. See [`state::Document`].

pub mod blend;
pub mod color;
pub mod commands;
pub mod config;
pub mod event;
pub mod id;
pub mod io;
pub mod playback;
pub mod raster;
pub mod state;
pub mod util;

pub use config::DocumentConfig;
pub use event::{Event, EventId, EventKind, LayerId, SessionId};
pub use raster::{Backend, Bitmap, Rasterizer};
pub use state::{Document, DocumentError};
