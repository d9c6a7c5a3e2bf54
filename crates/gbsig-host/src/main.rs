mod audio;
mod config;
mod demo;
mod error;
mod snapshot;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use gbsig_core::devices::Devices;
use gbsig_core::hardware::Model;
use gbsig_core::ppu::{LINE_CYCLES, LINES_PER_FRAME};
use log::{info, warn};

use crate::audio::AudioOutput;
use crate::config::{HostConfig, HostModel};
use crate::demo::Demo;
use crate::error::HostError;

const GB_FPS: f64 = 59.7275;
const FRAME_TIME: Duration = Duration::from_nanos((1e9_f64 / GB_FPS) as u64);
const FRAME_CYCLES: u32 = LINE_CYCLES * LINES_PER_FRAME as u32;
/// Cycles per step, one machine cycle.
const STEP_CYCLES: u32 = 4;
/// Frames run without `--play` when `--frames` is not given.
const DEFAULT_FRAMES: u64 = 60;

#[derive(Parser)]
#[command(about = "Headless driver for the pixel pipeline and audio synthesis core")]
struct Args {
    /// Path to the host config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    png: Option<PathBuf>,

    /// Play audio in real time on the default output device
    #[arg(long)]
    play: bool,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Runs until the pipeline latches a finished frame, servicing VRAM-DMA at
/// each HBlank. Returns false if no frame completed within two frames'
/// worth of cycles (display disabled).
fn run_frame(dev: &mut Devices, demo: &Demo) -> bool {
    let mut budget = FRAME_CYCLES * 2;
    while !dev.ppu.frame_ready() {
        if budget < STEP_CYCLES {
            return false;
        }
        budget -= STEP_CYCLES;
        if dev.step(STEP_CYCLES) {
            dev.run_vram_dma(|addr| demo.read_staging(addr));
        }
    }
    dev.ppu.clear_frame_flag();
    // Nothing services interrupts here; keep IF from sticking.
    dev.take_interrupts();
    true
}

fn log_stream_stats(dev: &Devices, frame: u64) {
    if let Some(stats) = dev.apu.stream_stats() {
        info!(
            "frame {frame}: audio occupancy {}/{} bytes, written {}, read {}, silence {}, discarded {}",
            stats.occupancy,
            stats.capacity,
            stats.written,
            stats.read,
            stats.silence,
            stats.discarded
        );
    }
}

fn main() -> Result<(), HostError> {
    let args = Args::parse();
    init_logging(args.debug);

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    if args.write_default_config {
        config::save_to_file(&config_path, &HostConfig::default())?;
        info!("wrote default config to {}", config_path.display());
        return Ok(());
    }

    let mut cfg = config::load_from_file(&config_path);
    if args.dmg {
        cfg.model = HostModel::Dmg;
    } else if args.cgb {
        cfg.model = HostModel::Cgb;
    }
    let model = Model::from(cfg.model);

    let output = if args.play {
        Some(AudioOutput::open_default()?)
    } else {
        None
    };
    let sample_rate = output
        .as_ref()
        .map_or(cfg.sample_rate, AudioOutput::sample_rate);
    let mut dev = Devices::new(model, cfg.audio(sample_rate));
    let _stream = match &output {
        Some(out) => {
            let consumer = dev.apu.enable_output();
            Some(out.play(consumer, cfg.clamped_volume())?)
        }
        None => None,
    };

    let demo = Demo::new(model);
    demo.load(&mut dev);

    let frame_limit = match args.frames {
        Some(n) => Some(n),
        None if args.play => None,
        None => Some(DEFAULT_FRAMES),
    };
    info!("running in {model} mode at {sample_rate} Hz");

    let start = Instant::now();
    let mut next_frame = start;
    let mut frame = 0u64;
    while frame_limit.is_none_or(|max| frame < max) {
        demo.animate(&mut dev, frame);
        if !run_frame(&mut dev, &demo) {
            warn!("display is off; no frame produced");
            break;
        }
        frame += 1;

        if cfg.stats_interval_frames > 0 && frame % cfg.stats_interval_frames == 0 {
            log_stream_stats(&dev, frame);
        }

        if args.play {
            next_frame += FRAME_TIME;
            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame - now);
            } else {
                next_frame = now;
            }
        }
    }
    info!("ran {frame} frames in {:.2?}", start.elapsed());

    if let Some(path) = args.png {
        snapshot::write_png(&path, &dev.ppu.framebuffer_rgb())?;
        info!("wrote {}", path.display());
    }
    Ok(())
}
