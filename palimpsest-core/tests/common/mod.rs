#![allow(dead_code)]

use palimpsest_core::{
    blend::BlendMode,
    color::Color,
    config::DocumentConfig,
    event::{Gradient, Stroke, StrokePoint},
    raster::Backend,
    state::Document,
    util::FiniteF32,
};

pub const SIZE: u32 = 32;

pub fn document(config: DocumentConfig) -> Document {
    Document::new(SIZE, SIZE, Backend::Aliased, config).unwrap()
}

/// A short stroke whose placement and color are derived from `n`, so sequences of them overlap unevenly.
pub fn stroke(n: u32) -> Stroke {
    #[allow(clippy::cast_precision_loss)]
    let (x, y) = ((n * 7 % SIZE) as f32, (n * 13 % SIZE) as f32);
    #[allow(clippy::cast_precision_loss)]
    let shade = (n % 5) as f32 / 4.0;
    Stroke {
        points: vec![
            StrokePoint::new(x, y, 1.0).unwrap(),
            StrokePoint::new(y, x, 0.5).unwrap(),
        ],
        radius: FiniteF32::new(1.0 + (n % 3) as f32).unwrap(),
        color: Color::from_straight(shade, 1.0 - shade, 0.5, 1.0).unwrap(),
        opacity: FiniteF32::new(if n % 4 == 0 { 0.5 } else { 1.0 }).unwrap(),
        blend: if n % 11 == 10 {
            BlendMode::Erase
        } else {
            BlendMode::Normal
        },
    }
}

pub fn gradient() -> Gradient {
    Gradient {
        from: [FiniteF32::ZERO, FiniteF32::ZERO],
        to: [FiniteF32::new(32.0).unwrap(), FiniteF32::ZERO],
        from_color: Color::BLACK,
        to_color: Color::TRANSPARENT,
        opacity: FiniteF32::ONE,
        blend: BlendMode::Normal,
    }
}

/// Every accounting and topology invariant that must hold between operations.
pub fn assert_consistent(document: &Document) {
    assert_eq!(document.memory_use(), document.resident_bytes());
    assert!(
        document.memory_use() <= document.memory_budget() || document.budget_warning().is_some(),
        "over budget without a warning"
    );

    let stack = document.stack();
    let mut seen = std::collections::HashSet::new();
    for id in stack.order() {
        assert!(seen.insert(*id), "{id} twice in the stack");
    }
    for merged in stack.merged() {
        assert!(seen.insert(*merged), "{merged} both stacked and merged");
        let referenced = document.layers().any(|layer| {
            layer
                .history()
                .iter()
                .any(|event| event.event.kind.merged_layer() == Some(*merged))
        });
        assert!(referenced, "{merged} merged away by nothing");
    }
    for layer in document.layers() {
        if layer.is_present() {
            assert!(layer.bitmap().is_some(), "{} present but freed", layer.id());
        }
        assert!(layer.checkpoints().len() < layer.checkpoint_budget());
    }
}
