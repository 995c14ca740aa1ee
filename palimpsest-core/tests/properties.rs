mod common;

use common::{assert_consistent, document, gradient, stroke};
use palimpsest_core::{
    color::Color,
    config::DocumentConfig,
    event::{EventId, EventKind, LayerId},
    io::{self, Picture},
    raster::{Backend, Bitmap},
    state::{stack::Stack, Document},
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn present(document: &Document) -> Vec<LayerId> {
    document
        .stack()
        .order()
        .iter()
        .copied()
        .filter(|&id| document.layer(id).is_some_and(|layer| layer.is_present()))
        .collect()
}

/// Random authoring with linear undo and redo, as an editor would issue them.
fn random_document(seed: u64, steps: usize) -> Document {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut document = document(DocumentConfig {
        memory_budget: 12 * Bitmap::byte_size(common::SIZE, common::SIZE),
        checkpoint_interval: 3,
        default_checkpoint_budget: 4,
        ..Default::default()
    });
    document.add_layer(LayerId(0), Color::WHITE, false).unwrap();
    let mut redo: Vec<EventId> = vec![];

    for step in 0..steps {
        let layers = present(&document);
        let Some(&target) = layers.get(rng.gen_range(0..layers.len().max(1))) else {
            document
                .add_layer(document.fresh_layer_id(), Color::TRANSPARENT, true)
                .unwrap();
            redo.clear();
            continue;
        };
        #[allow(clippy::cast_possible_truncation)]
        let n = step as u32;
        let authored = match rng.gen_range(0..14) {
            0..=3 => Some(document.draw_stroke(target, stroke(n)).unwrap()),
            4 => Some(document.draw_gradient(target, gradient()).unwrap()),
            5 => Some(
                document
                    .add_layer(document.fresh_layer_id(), Color::TRANSPARENT, true)
                    .unwrap(),
            ),
            6 if layers.len() > 1 => document.remove_layer(target).unwrap(),
            7 => {
                let to = rng.gen_range(0..document.stack().order().len());
                document.move_layer(target, to).unwrap()
            }
            8 => {
                let index = rng.gen_range(0..document.stack().order().len());
                document.merge_layer(index, rng.gen_range(0.25..=1.0)).unwrap()
            }
            9 => {
                let strokes: Vec<EventId> = document
                    .layer(target)
                    .unwrap()
                    .history()
                    .iter_active()
                    .filter(|event| matches!(event.event.kind, EventKind::Stroke(_)))
                    .map(|event| event.event.id)
                    .collect();
                match strokes.get(rng.gen_range(0..strokes.len().max(1))) {
                    Some(&hidden) => Some(document.hide_event(hidden).unwrap()),
                    None => None,
                }
            }
            10..=11 => {
                if let Some(undone) = document.undo_latest(document.session()) {
                    redo.push(undone);
                }
                None
            }
            _ => {
                if let Some(id) = redo.pop() {
                    assert!(document.redo_event_by_session_id(id));
                }
                None
            }
        };
        if authored.is_some() {
            redo.clear();
        }
        assert_consistent(&document);
    }
    document
}

#[test]
fn replay_is_deterministic() {
    for seed in 0..6 {
        let mut document = random_document(seed, 160);
        // Loading replays every layer from scratch.
        let mut loaded = Document::from_picture(
            document.to_picture(),
            Backend::Aliased.create(),
            document.config().clone(),
        )
        .unwrap();
        assert_eq!(loaded.stack(), document.stack(), "seed {seed}");
        assert_consistent(&loaded);

        for id in present(&document) {
            let layer = document.layer(id).unwrap();
            assert_eq!(
                layer.bitmap(),
                loaded.layer(id).unwrap().bitmap(),
                "seed {seed}, {id}"
            );
            let checkpoints: Vec<(usize, Bitmap)> = layer
                .checkpoints()
                .iter()
                .map(|checkpoint| (checkpoint.log_index(), checkpoint.bitmap().clone()))
                .collect();
            for (log_index, bitmap) in checkpoints {
                assert_eq!(
                    loaded.render_layer_at(id, log_index).unwrap(),
                    bitmap,
                    "seed {seed}, {id} at {log_index}"
                );
            }
        }
        assert_eq!(loaded.composite(), document.composite(), "seed {seed}");
    }
}

type Snapshot = (Picture, Stack, Vec<(LayerId, Option<Bitmap>)>, Bitmap);

fn snapshot(document: &mut Document) -> Snapshot {
    let bitmaps = present(document)
        .into_iter()
        .map(|id| (id, document.layer(id).unwrap().bitmap().cloned()))
        .collect();
    (
        document.to_picture(),
        document.stack().clone(),
        bitmaps,
        document.composite(),
    )
}

#[test]
fn redo_inverts_undo() {
    let mut document = document(DocumentConfig {
        checkpoint_interval: 2,
        ..Default::default()
    });
    for id in 0..3 {
        document
            .add_layer(LayerId(id), Color::from_straight(0.2, 0.4, 0.6, 0.5).unwrap(), id != 0)
            .unwrap();
        for n in 0..5 {
            document.draw_stroke(LayerId(id), stroke(id * 10 + n)).unwrap();
        }
    }
    let hidden = document.draw_stroke(LayerId(1), stroke(77)).unwrap();

    type Edit = fn(&mut Document, EventId) -> Option<EventId>;
    let edits: [(&str, Edit); 7] = [
        ("stroke", |d, _| d.draw_stroke(LayerId(1), stroke(42)).ok()),
        ("gradient", |d, _| d.draw_gradient(LayerId(0), gradient()).ok()),
        ("hide", |d, hidden| d.hide_event(hidden).ok()),
        ("move", |d, _| d.move_layer(LayerId(2), 2).ok().flatten()),
        ("merge", |d, _| d.merge_layer(0, 0.5).ok().flatten()),
        ("remove", |d, _| d.remove_layer(LayerId(2)).ok().flatten()),
        ("add", |d, _| d.add_layer(LayerId(9), Color::WHITE, false).ok()),
    ];
    for (name, edit) in edits {
        let id = edit(&mut document, hidden).unwrap_or_else(|| panic!("{name} wrote nothing"));
        let done = snapshot(&mut document);
        assert!(document.undo_event_by_session_id(id), "{name}");
        assert!(!document.undo_event_by_session_id(id), "{name} undone twice");
        assert_ne!(snapshot(&mut document).0, done.0, "{name}");
        assert!(document.redo_event_by_session_id(id), "{name}");
        assert_eq!(snapshot(&mut document), done, "{name}");
        assert_consistent(&document);
    }
}

#[test]
fn text_roundtrip_is_lossless() {
    let mut document = random_document(42, 120);
    document.set_metadata(Some(vec!["title rooftops".to_owned(), String::new()]));
    // A late remote event, spliced into the middle of a log.
    let target = document.stack().order()[0];
    let remote = palimpsest_core::event::Event::new(
        EventId::new(5, 0),
        EventKind::Stroke(stroke(3)),
    )
    .inserted_at(1);
    document.push_event(target, remote).unwrap();

    let mut text = vec![];
    io::write_document(&document, &mut text).unwrap();
    let mut loaded = io::read_document(
        text.as_slice(),
        Backend::Aliased,
        document.config().clone(),
    )
    .unwrap();
    assert_eq!(loaded.to_picture(), document.to_picture());
    assert_eq!(loaded.metadata(), document.metadata());
    assert_eq!(loaded.composite(), document.composite());

    let mut again = vec![];
    io::write_document(&loaded, &mut again).unwrap();
    assert_eq!(String::from_utf8(again).unwrap(), String::from_utf8(text).unwrap());
}

#[test]
fn budget_reports_exhaustion_but_keeps_working() {
    let mut document = random_document(7, 60);
    let floor = present(&document).len() * document.bitmap_bytes();
    let result = document.set_memory_budget(floor / 2);
    assert!(result.is_err());
    assert!(document.budget_warning().is_some());
    assert_consistent(&document);
    assert!(document
        .layers()
        .filter(|layer| layer.is_present())
        .all(|layer| layer.checkpoints().is_empty()));

    // Raising it again clears the warning on the next operation.
    document.set_memory_budget(64 * document.bitmap_bytes()).unwrap();
    assert!(document.budget_warning().is_none());
    let target = present(&document)[0];
    document.draw_stroke(target, stroke(5)).unwrap();
    assert!(document.memory_use() <= document.memory_budget());
    assert_consistent(&document);
}
