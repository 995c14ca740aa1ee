#![warn(clippy::pedantic)]

mod play;
mod settings;

use anyhow::{Context, Result as AnyResult};
use palimpsest_core::{io, state::Document};

const USAGE: &str = "usage: palimpsest <command> <picture> [args]

commands:
    info                  summarize layers and memory use
    render <out.png>      write the composited picture
    blame <x> <y>         list the events that painted a pixel
    play                  replay the history, ctrl+c to stop
    check                 verify the file survives a save and reload unchanged";

enum Command {
    Info,
    Render(std::path::PathBuf),
    Blame(u32, u32),
    Play,
    Check,
}
impl Command {
    fn parse(name: &str, args: &mut impl Iterator<Item = std::ffi::OsString>) -> AnyResult<Self> {
        let mut next_arg = |what: &str| {
            args.next()
                .ok_or_else(|| anyhow::anyhow!("`{name}` needs {what}\n\n{USAGE}"))
        };
        Ok(match name {
            "info" => Self::Info,
            "render" => Self::Render(next_arg("an output path")?.into()),
            "blame" => {
                let mut coordinate = |what: &str| -> AnyResult<u32> {
                    let arg = next_arg(what)?;
                    arg.to_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow::anyhow!("{what} must be a pixel coordinate, got {arg:?}"))
                };
                let x = coordinate("x")?;
                let y = coordinate("y")?;
                Self::Blame(x, y)
            }
            "play" => Self::Play,
            "check" => Self::Check,
            other => anyhow::bail!("unknown command `{other}`\n\n{USAGE}"),
        })
    }
}

fn open(path: &std::path::Path, settings: &settings::Settings) -> AnyResult<Document> {
    let file = std::fs::File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    io::read_document(
        std::io::BufReader::new(file),
        settings.backend,
        settings.document.clone(),
    )
    .with_context(|| format!("failed to load {path:?}"))
}

fn info(document: &Document) {
    println!(
        "{}x{}, {} layers, {} events",
        document.width(),
        document.height(),
        document.stack().iter().count(),
        document.event_count()
    );
    for layer in document.layers() {
        let state = if let Some(into) = layer.merged_into() {
            format!("merged into {into}")
        } else if !layer.is_created() {
            "uncreated".to_owned()
        } else if layer.is_removed() {
            "removed".to_owned()
        } else if let Some(index) = document.stack().index_of(layer.id()) {
            format!("stack #{index}")
        } else {
            "unplaced".to_owned()
        };
        println!(
            "  {}: {} events, {state}, {} checkpoints{}",
            layer.id(),
            layer.event_count(),
            layer.checkpoints().len(),
            if layer.is_freed() { ", freed" } else { "" }
        );
    }
    #[allow(clippy::cast_precision_loss)]
    let human = |bytes: usize| human_bytes::human_bytes(bytes as f64);
    println!(
        "memory: {} of {}",
        human(document.memory_use()),
        human(document.memory_budget())
    );
    if let Some(warning) = document.budget_warning() {
        println!("warning: {warning}");
    }
}

fn render(document: &mut Document, out: &std::path::Path) -> AnyResult<()> {
    let composite = document.composite();
    let image = image::RgbaImage::from_raw(
        composite.width(),
        composite.height(),
        composite.to_rgba8(),
    )
    .ok_or_else(|| anyhow::anyhow!("composite has the wrong pixel count"))?;
    image
        .save(out)
        .with_context(|| format!("failed to write {out:?}"))?;
    log::info!("wrote {out:?}, digest {}", composite.digest().to_hex());
    Ok(())
}

fn blame(document: &mut Document, x: u32, y: u32) {
    let events = document.blame(x, y);
    if events.is_empty() {
        println!("nothing drawn at ({x}, {y})");
    }
    for id in events {
        let kind = document
            .locate(id)
            .and_then(|(layer, index)| {
                let event = document.layer(layer)?.history().event(index)?;
                Some(format!("{} on {layer}", event.kind.tag().as_ref()))
            })
            .unwrap_or_default();
        println!("{id} {kind}");
    }
}

/// Write, reread, and compare. Pictures must match exactly, and so must the pixels they produce.
fn check(path: &std::path::Path, mut document: Document, settings: &settings::Settings) -> AnyResult<()> {
    let mut text = Vec::new();
    io::write_document(&document, &mut text)?;
    let mut reread = io::read_document(
        text.as_slice(),
        settings.backend,
        settings.document.clone(),
    )
    .context("failed to reread written picture")?;
    anyhow::ensure!(
        reread.to_picture() == document.to_picture(),
        "{path:?} changed when saved and reloaded"
    );
    let (before, after) = (document.composite().digest(), reread.composite().digest());
    anyhow::ensure!(
        before == after,
        "pixels changed when saved and reloaded: {} vs {}",
        before.to_hex(),
        after.to_hex()
    );
    println!("{path:?} ok, digest {}", before.to_hex());
    Ok(())
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    // Paths are OSStrings, let the system handle character encoding restrictions.
    let mut args = std::env::args_os().skip(1);
    let name = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("{USAGE}"))?
        .into_string()
        .map_err(|name| anyhow::anyhow!("unknown command {name:?}\n\n{USAGE}"))?;
    let path: std::path::PathBuf = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("missing picture path\n\n{USAGE}"))?
        .into();
    let command = Command::parse(&name, &mut args)?;

    let settings = settings::Settings::load();
    let mut document = open(&path, &settings)?;
    match command {
        Command::Info => info(&document),
        Command::Render(out) => render(&mut document, &out)?,
        Command::Blame(x, y) => blame(&mut document, x, y),
        Command::Check => check(&path, document, &settings)?,
        Command::Play => {
            let playback = document.playback(settings.backend, settings.playback.events_per_frame)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let frame = runtime.block_on(play::run(playback, settings.playback.frame_millis))?;
            if let Some(frame) = frame {
                println!("final frame digest {}", frame.digest().to_hex());
            }
        }
    }
    Ok(())
}
