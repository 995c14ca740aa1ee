//! Conversion between a live [`Document`] and its persisted [`Picture`] form.

use super::{Document, DocumentError};
use crate::{
    config::DocumentConfig,
    event::LayerId,
    io::{LoggedEvent, Picture},
    raster::Rasterizer,
    state::{layer::Layer, stack::Stack},
};

impl Document {
    /// Snapshot the event logs. Merged-away layers first, in merge order, then the stack top down.
    #[must_use]
    pub fn to_picture(&self) -> Picture {
        let layers = self
            .stack
            .merged()
            .iter()
            .chain(self.stack.order())
            .filter_map(|id| self.layers.get(id))
            .map(|layer| {
                layer
                    .history()
                    .iter()
                    .map(|event| LoggedEvent {
                        event: event.event.clone(),
                        undone: event.undone(),
                    })
                    .collect()
            })
            .collect();
        Picture {
            width: self.width,
            height: self.height,
            layers,
            metadata: self.metadata.clone(),
        }
    }
    /// Rebuild a document from its event logs. Pixels are replayed for layers in the picture, everything
    /// else stays freed until needed.
    /// # Errors
    /// * [`DocumentError::RasterizerSanityFailure`] if the rasterizer is unusable.
    /// * [`DocumentError::MisplacedCreation`] if a log doesn't start with exactly one creation event.
    /// * [`DocumentError::DuplicateLayer`] and [`DocumentError::InvalidReference`] for inconsistent logs.
    pub fn from_picture(
        picture: Picture,
        rasterizer: Box<dyn Rasterizer>,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        let Picture {
            width,
            height,
            layers,
            metadata,
        } = picture;
        let mut document = Self::with_rasterizer(width, height, rasterizer, config)?;
        document.metadata = metadata;

        let mut order = Vec::with_capacity(layers.len());
        // Merged layer -> layer it was merged into.
        let mut merged_into = hashbrown::HashMap::<LayerId, LayerId>::new();
        for log in layers {
            let layer = Layer::from_events(
                log.into_iter().map(|logged| (logged.event, logged.undone)),
                width,
                height,
                document.config.default_checkpoint_budget,
                document.config.checkpoint_interval,
            )
            .ok_or(DocumentError::MisplacedCreation)?;
            let id = layer.id();
            if document.layers.contains_key(&id) {
                return Err(DocumentError::DuplicateLayer(id));
            }
            for (_, merged) in layer.history().active_merges() {
                if let Some(previous) = merged_into.insert(merged, id) {
                    log::warn!("{merged} merged into both {previous} and {id}");
                }
            }
            order.push(id);
            document.layers.insert(id, layer);
        }

        let (mut stack, mut merged) = (Vec::new(), Vec::new());
        for id in order {
            match merged_into.get(&id) {
                Some(&into) => {
                    if let Some(layer) = document.layers.get_mut(&id) {
                        layer.set_merged_into(Some(into));
                    }
                    merged.push(id);
                }
                None => stack.push(id),
            }
        }
        if let Some(missing) = merged_into
            .keys()
            .find(|id| !document.layers.contains_key(*id))
        {
            return Err(DocumentError::InvalidReference(*missing));
        }
        document.stack = Stack::from_parts(stack, merged);
        document.set_session(document.session);
        document.revive();
        document.rebalance();
        log::info!(
            "{}: loaded {} layers, {} events",
            document.id,
            document.layers.len(),
            document.event_count()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        color::Color,
        config::DocumentConfig,
        event::{LayerId, SessionId, Stroke, StrokePoint},
        raster::Backend,
        state::Document,
        util::FiniteF32,
    };

    #[test]
    fn picture_roundtrip_keeps_structure() {
        let mut document =
            Document::new(12, 12, Backend::Aliased, DocumentConfig::default()).unwrap();
        document.set_session(SessionId(7));
        for id in 0..3 {
            document.add_layer(LayerId(id), Color::WHITE, id == 0).unwrap();
        }
        let stroke = Stroke {
            points: vec![StrokePoint::new(3.0, 3.0, 0.5).unwrap()],
            radius: FiniteF32::new(3.0).unwrap(),
            color: Color::BLACK,
            opacity: FiniteF32::ONE,
            blend: crate::blend::BlendMode::Normal,
        };
        document.draw_stroke(LayerId(2), stroke).unwrap();
        document.merge_layer(0, 0.5).unwrap().unwrap();
        document.remove_layer(LayerId(0)).unwrap().unwrap();
        let composite = document.composite();

        let picture = document.to_picture();
        let mut loaded =
            Document::from_picture(picture.clone(), Backend::Aliased.create(), DocumentConfig::default())
                .unwrap();
        assert_eq!(loaded.to_picture(), picture);
        assert_eq!(loaded.stack(), document.stack());
        assert_eq!(loaded.composite(), composite);
        // Removed layers stay freed until something needs them. Merged ones are rebuilt as sources.
        assert!(loaded.layer(LayerId(0)).unwrap().is_freed());
        assert!(!loaded.layer(LayerId(2)).unwrap().is_freed());

        // Authoring continues after the loaded session's events.
        loaded.set_session(SessionId(7));
        let next = loaded.add_layer(LayerId(9), Color::TRANSPARENT, true).unwrap();
        assert_eq!(next.seq, 6);
    }
}
