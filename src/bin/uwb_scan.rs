use std::{
    error::Error,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use log::{info, warn};
use uwbscan::{
    AcquisitionConfig, Session,
    protocol::{CONTINUOUS_SCAN, Registry},
    storage::{trim_zero_padding, write_capture},
};

/// Runs one acquisition and writes it to a capture log.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path of the capture log to write
    output: PathBuf,
    /// Leave the radar awake afterwards
    #[arg(long)]
    no_sleep: bool,
    #[command(flatten)]
    settings: AcquisitionConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    let mut session = Session::connect(settings.peer(), Arc::new(Registry::new()))?;
    let applied = session.init_radar(&settings.radar_config()?)?.config;

    let mut frames = if settings.scan_count == CONTINUOUS_SCAN {
        session.start_scan(CONTINUOUS_SCAN, settings.scan_interval)?;
        info!("press Ctrl-C to stop");
        while running.load(Ordering::SeqCst) {
            if !session.pump_once(usize::MAX)? {
                warn!("radar stopped streaming");
                break;
            }
        }
        session.stop_scan()?;
        session.take_frames()
    } else {
        session.exec_scan(settings.scan_count, settings.scan_interval)?
    };

    if !cli.no_sleep {
        session.sleep()?;
    }

    let points = trim_zero_padding(&mut frames);
    let (start, end) = settings.capture_range(&applied);
    write_capture(&cli.output, &frames, start, end)?;
    println!(
        "{} frames of {points} samples ({start:.3} m to {end:.3} m) written to {}",
        frames.len(),
        cli.output.display()
    );

    Ok(())
}
