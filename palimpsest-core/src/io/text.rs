//! # Text picture format
//!
//! ```text
//! picture version 1 <width> <height>
//! <keyword> <session> <seq> <undone 0|1> <insertion point|-> <params...>
//! ...
//! metadata
//! <opaque lines>
//! ```
//!
//! One line per event. An `add` line starts a new layer, and every following event belongs to that layer until
//! the next `add`. Parameters per keyword:
//!
//! | keyword    | params |
//! |------------|--------|
//! | `add`      | `layer r g b a has_alpha stack_index` |
//! | `stroke`   | `radius r g b a opacity blend n (x y pressure){n}` |
//! | `gradient` | `x0 y0 x1 y1 r g b a r g b a opacity blend` |
//! | `remove`   | `layer` |
//! | `move`     | `layer from to` |
//! | `merge`    | `merged opacity merged_index` |
//! | `hide`     | `session seq` |
//!
//! Colors are premultiplied. Floats are written in their shortest exact form, so values survive a round trip.

use std::io::{BufRead, Write};

use super::{LoggedEvent, Picture};
use crate::{
    blend::BlendMode,
    color::Color,
    event::{
        Event, EventId, EventKind, EventTag, Gradient, LayerAdd, LayerId, SessionId, Stroke,
        StrokePoint,
    },
    util::FiniteF32,
};

pub const VERSION: u32 = 1;
const HEADER: &str = "picture";
const METADATA: &str = "metadata";

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("missing `picture` header")]
    MissingHeader,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("line {line}: unknown event `{keyword}`")]
    UnknownEvent { line: usize, keyword: String },
    #[error("line {line}: expected {expected}")]
    Malformed { line: usize, expected: &'static str },
    #[error("line {line}: unexpected trailing data")]
    Trailing { line: usize },
    #[error("line {line}: event before any layer was created")]
    Orphan { line: usize },
    #[error("line {line}: event names a layer other than the one it is logged in")]
    Misplaced { line: usize },
    #[error("line {line}: {layer} created twice")]
    DuplicateLayer { line: usize, layer: LayerId },
    #[error("line {line}: event {id} appears twice")]
    DuplicateEvent { line: usize, id: EventId },
    #[error("{0} is referenced but never created")]
    DanglingLayer(LayerId),
}

/// Whitespace-separated fields of one line.
struct Fields<'a> {
    line: usize,
    tokens: std::str::SplitAsciiWhitespace<'a>,
}
impl<'a> Fields<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self {
            line,
            tokens: text.split_ascii_whitespace(),
        }
    }
    fn token(&mut self, expected: &'static str) -> Result<&'a str, ParseError> {
        self.tokens.next().ok_or(ParseError::Malformed {
            line: self.line,
            expected,
        })
    }
    fn next<T: std::str::FromStr>(&mut self, expected: &'static str) -> Result<T, ParseError> {
        self.token(expected)?
            .parse()
            .map_err(|_| ParseError::Malformed {
                line: self.line,
                expected,
            })
    }
    fn flag(&mut self, expected: &'static str) -> Result<bool, ParseError> {
        match self.token(expected)? {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(ParseError::Malformed {
                line: self.line,
                expected,
            }),
        }
    }
    fn color(&mut self) -> Result<Color, ParseError> {
        let channels = [
            self.next::<FiniteF32>("red")?,
            self.next::<FiniteF32>("green")?,
            self.next::<FiniteF32>("blue")?,
            self.next::<FiniteF32>("alpha")?,
        ];
        Color::from_array_lossy(channels.map(FiniteF32::get)).map_err(|_| ParseError::Malformed {
            line: self.line,
            expected: "color",
        })
    }
    fn finish(mut self) -> Result<(), ParseError> {
        match self.tokens.next() {
            Some(_) => Err(ParseError::Trailing { line: self.line }),
            None => Ok(()),
        }
    }
}

fn parse_event(fields: &mut Fields<'_>, tag: EventTag) -> Result<LoggedEvent, ParseError> {
    let id = EventId {
        session: SessionId(fields.next("session")?),
        seq: fields.next("sequence number")?,
    };
    let undone = fields.flag("undone flag")?;
    let insertion_point = match fields.token("insertion point")? {
        "-" => None,
        index => Some(index.parse().map_err(|_| ParseError::Malformed {
            line: fields.line,
            expected: "insertion point",
        })?),
    };
    let kind = match tag {
        EventTag::LayerAdd => EventKind::LayerAdd(LayerAdd {
            layer: LayerId(fields.next("layer id")?),
            clear_color: fields.color()?,
            has_alpha: fields.flag("alpha flag")?,
            stack_index: fields.next("stack index")?,
        }),
        EventTag::Stroke => {
            let radius = fields.next("radius")?;
            let color = fields.color()?;
            let opacity = fields.next("opacity")?;
            let blend = fields.next::<BlendMode>("blend mode")?;
            let count: usize = fields.next("point count")?;
            // Don't trust the count for allocation.
            let mut points = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                points.push(StrokePoint {
                    x: fields.next("x")?,
                    y: fields.next("y")?,
                    pressure: fields.next("pressure")?,
                });
            }
            EventKind::Stroke(Stroke {
                points,
                radius,
                color,
                opacity,
                blend,
            })
        }
        EventTag::Gradient => EventKind::Gradient(Gradient {
            from: [fields.next("x")?, fields.next("y")?],
            to: [fields.next("x")?, fields.next("y")?],
            from_color: fields.color()?,
            to_color: fields.color()?,
            opacity: fields.next("opacity")?,
            blend: fields.next("blend mode")?,
        }),
        EventTag::LayerRemove => EventKind::LayerRemove {
            layer: LayerId(fields.next("layer id")?),
        },
        EventTag::LayerMove => EventKind::LayerMove {
            layer: LayerId(fields.next("layer id")?),
            from: fields.next("from index")?,
            to: fields.next("to index")?,
        },
        EventTag::LayerMerge => EventKind::LayerMerge {
            merged: LayerId(fields.next("layer id")?),
            opacity: fields.next("opacity")?,
            merged_index: fields.next("stack index")?,
        },
        EventTag::EventHide => EventKind::EventHide {
            hidden: EventId {
                session: SessionId(fields.next("session")?),
                seq: fields.next("sequence number")?,
            },
        },
    };
    Ok(LoggedEvent {
        event: Event {
            id,
            insertion_point,
            kind,
        },
        undone,
    })
}

/// Read a whole picture. Fails as a whole - nothing partial is returned.
/// # Errors
/// Read failures, or malformed text.
pub fn read<R: BufRead>(reader: R) -> Result<Picture, ParseError> {
    let mut lines = reader.lines().enumerate().map(|(idx, line)| (idx + 1, line));

    let (width, height) = loop {
        let Some((line_number, line)) = lines.next() else {
            return Err(ParseError::MissingHeader);
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = Fields::new(line_number, &line);
        if fields.token("header")? != HEADER || fields.token("version")? != "version" {
            return Err(ParseError::MissingHeader);
        }
        let version = fields.next("version number")?;
        if version != VERSION {
            return Err(ParseError::UnsupportedVersion(version));
        }
        let size = (fields.next("width")?, fields.next("height")?);
        fields.finish()?;
        break size;
    };

    let mut picture = Picture {
        width,
        height,
        ..Default::default()
    };
    let mut layers = hashbrown::HashSet::new();
    let mut ids = hashbrown::HashSet::new();
    for (line_number, line) in lines.by_ref() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = Fields::new(line_number, &line);
        let keyword = fields.token("keyword")?;
        if keyword == METADATA {
            fields.finish()?;
            picture.metadata = Some(Vec::new());
            break;
        }
        let tag: EventTag = keyword.parse().map_err(|_| ParseError::UnknownEvent {
            line: line_number,
            keyword: keyword.to_owned(),
        })?;
        let logged = parse_event(&mut fields, tag)?;
        fields.finish()?;

        if !ids.insert(logged.event.id) {
            return Err(ParseError::DuplicateEvent {
                line: line_number,
                id: logged.event.id,
            });
        }
        if let Some(add) = logged.event.kind.layer_add() {
            if !layers.insert(add.layer) {
                return Err(ParseError::DuplicateLayer {
                    line: line_number,
                    layer: add.layer,
                });
            }
            picture.layers.push(vec![logged]);
            continue;
        }
        let Some(owner) = picture.layers.last_mut() else {
            return Err(ParseError::Orphan { line: line_number });
        };
        let owner_id = owner
            .first()
            .and_then(|first| first.event.kind.layer_add())
            .map(|add| add.layer);
        let named = match &logged.event.kind {
            EventKind::LayerRemove { layer } | EventKind::LayerMove { layer, .. } => Some(*layer),
            _ => None,
        };
        if named.is_some() && named != owner_id {
            return Err(ParseError::Misplaced { line: line_number });
        }
        owner.push(logged);
    }
    if let Some(metadata) = picture.metadata.as_mut() {
        for (_, line) in lines {
            metadata.push(line?);
        }
    }

    // Merges reference layers by id, which must resolve.
    for logged in picture.layers.iter().flatten() {
        if let Some(merged) = logged.event.kind.merged_layer() {
            if !layers.contains(&merged) {
                return Err(ParseError::DanglingLayer(merged));
            }
        }
    }
    Ok(picture)
}

fn write_color<W: Write>(writer: &mut W, color: Color) -> std::io::Result<()> {
    let [r, g, b, a] = color.as_finite_array();
    write!(writer, " {r} {g} {b} {a}")
}

fn write_event<W: Write>(writer: &mut W, logged: &LoggedEvent) -> std::io::Result<()> {
    let LoggedEvent { event, undone } = logged;
    write!(
        writer,
        "{} {} {} {}",
        event.kind.tag().as_ref(),
        event.id.session.0,
        event.id.seq,
        u8::from(*undone)
    )?;
    match event.insertion_point {
        Some(point) => write!(writer, " {point}")?,
        None => write!(writer, " -")?,
    }
    match &event.kind {
        EventKind::LayerAdd(add) => {
            write!(writer, " {}", add.layer.0)?;
            write_color(writer, add.clear_color)?;
            write!(writer, " {} {}", u8::from(add.has_alpha), add.stack_index)?;
        }
        EventKind::Stroke(stroke) => {
            write!(writer, " {}", stroke.radius)?;
            write_color(writer, stroke.color)?;
            write!(
                writer,
                " {} {} {}",
                stroke.opacity,
                stroke.blend.as_ref(),
                stroke.points.len()
            )?;
            for point in &stroke.points {
                write!(writer, " {} {} {}", point.x, point.y, point.pressure)?;
            }
        }
        EventKind::Gradient(gradient) => {
            let [x0, y0] = gradient.from;
            let [x1, y1] = gradient.to;
            write!(writer, " {x0} {y0} {x1} {y1}")?;
            write_color(writer, gradient.from_color)?;
            write_color(writer, gradient.to_color)?;
            write!(writer, " {} {}", gradient.opacity, gradient.blend.as_ref())?;
        }
        EventKind::LayerRemove { layer } => write!(writer, " {}", layer.0)?,
        EventKind::LayerMove { layer, from, to } => write!(writer, " {} {from} {to}", layer.0)?,
        EventKind::LayerMerge {
            merged,
            opacity,
            merged_index,
        } => write!(writer, " {} {opacity} {merged_index}", merged.0)?,
        EventKind::EventHide { hidden } => {
            write!(writer, " {} {}", hidden.session.0, hidden.seq)?;
        }
    }
    writeln!(writer)
}

/// Write a picture.
/// # Errors
/// Errors are forwarded from `writer`.
pub fn write<W: Write>(picture: &Picture, mut writer: W) -> std::io::Result<()> {
    writeln!(
        writer,
        "{HEADER} version {VERSION} {} {}",
        picture.width, picture.height
    )?;
    for logged in picture.layers.iter().flatten() {
        write_event(&mut writer, logged)?;
    }
    if let Some(metadata) = &picture.metadata {
        writeln!(writer, "{METADATA}")?;
        for line in metadata {
            writeln!(writer, "{line}")?;
        }
    }
    writer.flush()
}
