//! Interactive console utilities.
//!
//! [`prompt`] reads one [`Command`] from the operator and [`Console`] runs it
//! against a radar [`Session`].
use std::io::{self, BufRead, Write};

use log::info;
use thiserror::Error;

use crate::{
    command::{Command, CommandError},
    config::{AcquisitionConfig, ConfigError},
    protocol::{CONTINUOUS_SCAN, Datagram, RadarConfig},
    session::{Frame, Session, SessionError},
    storage::{StorageError, trim_zero_padding, write_capture},
};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Console IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Prompt the operator for a console command. End of input reads as
/// [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }
    s.as_str().try_into()
}

/// Session plus the settings the console applies and saves with.
pub struct Console<D: Datagram> {
    session: Session<D>,
    settings: AcquisitionConfig,
    applied: Option<RadarConfig>,
    captured: Vec<Frame>,
}

impl<D: Datagram> Console<D> {
    pub fn new(session: Session<D>, settings: AcquisitionConfig) -> Self {
        Self {
            session,
            settings,
            applied: None,
            captured: Vec::new(),
        }
    }

    pub fn session(&mut self) -> &mut Session<D> {
        &mut self.session
    }

    /// Runs `command`, writing its outcome to `out`. [`Command::Exit`] is left
    /// to the caller.
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<(), ConsoleError> {
        match command {
            Command::Exit => {}
            Command::Init => {
                let confirm = self.session.init_radar(&self.settings.radar_config()?)?;
                writeln!(out, "applied {:?}", confirm.config)?;
                self.applied = Some(confirm.config);
            }
            Command::Config => {
                let response = self.session.request_named("MRM_GET_CONFIG_REQUEST", false)?;
                writeln!(out, "{response:?}")?;
            }
            Command::Status => {
                let info = self.session.status_info()?;
                writeln!(out, "{info:?}")?;
            }
            Command::Scan(count) => {
                let frames = self.session.exec_scan(count, self.settings.scan_interval)?;
                writeln!(out, "collected {} frames", frames.len())?;
                self.captured.extend(frames);
            }
            Command::Start => {
                self.session
                    .start_scan(CONTINUOUS_SCAN, self.settings.scan_interval)?;
                writeln!(out, "scanning; use 'pump N' and 'stop'")?;
            }
            Command::Pump(frames) => {
                let target = self.session.frames().len() + frames;
                let mut ticks = 0;
                while self.session.pump_once(target)? {
                    ticks += 1;
                }
                writeln!(
                    out,
                    "{ticks} datagrams, {} frames queued",
                    self.session.frames().len()
                )?;
            }
            Command::Stop => {
                self.session.stop_scan()?;
                writeln!(out, "stopped, {} frames queued", self.session.frames().len())?;
            }
            Command::Sleep => {
                self.session.sleep()?;
                writeln!(out, "radar asleep")?;
            }
            Command::Wake => {
                self.session.wake()?;
                writeln!(out, "radar awake")?;
            }
            Command::Send(name) => {
                let response = self.session.request_named(&name, false)?;
                writeln!(out, "{response:?}")?;
            }
            Command::Frames => {
                writeln!(
                    out,
                    "{} frames captured, {} queued, {} partial scans",
                    self.captured.len(),
                    self.session.frames().len(),
                    self.session.fragments().len()
                )?;
            }
            Command::Save(path) => {
                let mut frames = std::mem::take(&mut self.captured);
                frames.extend(self.session.take_frames());
                let points = trim_zero_padding(&mut frames);
                let applied = match &self.applied {
                    Some(applied) => applied.clone(),
                    None => self.settings.radar_config()?,
                };
                let (start, end) = self.settings.capture_range(&applied);

                write_capture(&path, &frames, start, end)?;
                info!("saved capture to {}", path.display());
                writeln!(
                    out,
                    "saved {} frames of {points} samples to {}",
                    frames.len(),
                    path.display()
                )?;
            }
            Command::Reset => {
                self.captured.clear();
                self.session.reset();
                writeln!(out, "session reset")?;
            }
        }
        Ok(())
    }
}
