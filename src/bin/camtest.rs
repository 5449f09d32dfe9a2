//! camtest - Probe USB camera indices and report which ones deliver frames.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;

use varroa_watch::ingest::device_path;
use varroa_watch::{probe_device, ProbeOutcome, SystemFrameSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe /dev/videoN cameras for usable frames")]
struct Args {
    /// Number of indices to probe, starting at 0.
    #[arg(long, env = "VARROA_MAX_CAMERA_INDEX", default_value = "10")]
    max_index: u32,

    /// Frames to read from each working camera after the probe frame.
    #[arg(long, default_value = "30")]
    frames: u32,

    #[arg(long, default_value = "640")]
    width: u32,

    #[arg(long, default_value = "480")]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut source = SystemFrameSource {
        width: args.width,
        height: args.height,
    };
    let mut working = Vec::new();

    for index in 0..args.max_index {
        let device = device_path(index);
        let mut session = match probe_device(&mut source, index) {
            ProbeOutcome::Ready(session) => session,
            ProbeOutcome::NoFrame(reason) => {
                log::warn!("{}: opened but no frame ({})", device, reason);
                continue;
            }
            ProbeOutcome::OpenFailed(reason) => {
                log::debug!("{}: not available ({})", device, reason);
                continue;
            }
        };

        let started = Instant::now();
        let mut read = 0u32;
        let mut size = None;
        for _ in 0..args.frames {
            match session.read() {
                Ok(Some(image)) => {
                    read += 1;
                    size = Some(image.dimensions());
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("{}: read failed after {} frames: {:#}", device, read, err);
                    break;
                }
            }
        }
        let elapsed = started.elapsed().as_secs_f64();
        session.release();

        let fps = if elapsed > 0.0 { read as f64 / elapsed } else { 0.0 };
        match size {
            Some((width, height)) => log::info!(
                "{}: OK {}x{}, {}/{} frames, {:.1} fps ({})",
                device,
                width,
                height,
                read,
                args.frames,
                fps,
                session.describe()
            ),
            None => log::info!("{}: OK (probe frame only)", device),
        }
        working.push(index);
    }

    if working.is_empty() {
        log::error!(
            "no working camera found on {}..{}",
            device_path(0),
            device_path(args.max_index.saturating_sub(1))
        );
        std::process::exit(1);
    }
    log::info!(
        "working cameras: {}",
        working
            .iter()
            .map(|index| device_path(*index))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
