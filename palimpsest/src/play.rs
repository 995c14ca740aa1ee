use palimpsest_core::{
    playback::{Playback, Tick},
    raster::Bitmap,
};

/// Drive a playback at one tick per frame until it finishes or ctrl+c is pressed.
/// Returns the final frame, or None if cancelled.
pub async fn run(mut playback: Playback, frame_millis: u64) -> anyhow::Result<Option<Bitmap>> {
    let mut frames = tokio::time::interval(std::time::Duration::from_millis(frame_millis.max(1)));
    // A slow frame delays the next, rather than bunching frames to catch up.
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let cancel = tokio::signal::ctrl_c();
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            result = &mut cancel => {
                result?;
                println!();
                log::info!("playback stopped at {}/{}", playback.applied(), playback.total());
                playback.cancel();
                return Ok(None);
            }
            _ = frames.tick() => match playback.tick() {
                Tick::Progress { applied, total } => {
                    print!("\r{applied}/{total}");
                    std::io::Write::flush(&mut std::io::stdout())?;
                }
                Tick::Finished => {
                    println!();
                    return Ok(Some(playback.frame()));
                }
            },
        }
    }
}
