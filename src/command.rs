//! Console commands.
//!
//! This module defines the [`Command`] enum, the high-level operations an
//! operator can issue against a radar session from the interactive console,
//! and parses them from user-typed lines.
//!
//! # Overview
//!
//! - `init`: Apply the acquisition settings to the radar.
//! - `config` / `status`: Read back the configuration or the status block.
//! - `scan N`: Run a bounded scan of `N` scans.
//! - `start` / `pump N` / `stop`: Drive a continuous scan by hand.
//! - `sleep` / `wake`: Sleep-mode transitions.
//! - `send NAME`: Issue any registered request by its symbolic name.
//! - `frames`, `save PATH`, `reset`, `.exit`.
//!
//! # Example
//! ```rust
//! use uwbscan::Command;
//!
//! let cmd: Command = "scan 10".try_into().unwrap();
//! assert_eq!(cmd, Command::Scan(10));
//! ```
//!
//! # See Also
//! - [`cli`](crate::cli): Prompts for commands and executes them.
use std::{io, path::PathBuf};

use thiserror::Error;

/// List of possible errors while reading a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("failed to read command: {0}")]
    Io(#[from] io::Error),

    #[error("no command provided")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close the session and terminate the console.
    Exit,
    Init,
    Config,
    Status,
    Scan(u16),
    Start,
    Pump(usize),
    Stop,
    Sleep,
    Wake,
    /// Issue a request by name with default parameters.
    Send(String),
    Frames,
    Save(PathBuf),
    Reset,
}

fn argument<'a>(command: &str, parts: &[&'a str], example: &str) -> Result<&'a str, CommandError> {
    parts
        .get(1)
        .copied()
        .ok_or_else(|| CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: format!("missing argument. Example: {example}"),
        })
}

fn number<T: std::str::FromStr>(command: &str, value: &str) -> Result<T, CommandError> {
    value
        .parse::<T>()
        .map_err(|_| CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: format!("'{value}' is not a valid non-negative number"),
        })
}

impl TryInto<Command> for &str {
    type Error = CommandError;

    fn try_into(self) -> Result<Command, Self::Error> {
        let parts = self.split_whitespace().collect::<Vec<&str>>();
        let Some(name) = parts.first() else {
            return Err(CommandError::Empty);
        };

        match name.to_lowercase().as_str() {
            ".exit" | "exit" | "quit" => Ok(Command::Exit),
            "init" => Ok(Command::Init),
            "config" => Ok(Command::Config),
            "status" => Ok(Command::Status),
            "scan" => {
                let count = number(name, argument(name, &parts, "scan 10")?)?;
                Ok(Command::Scan(count))
            }
            "start" => Ok(Command::Start),
            "pump" => match parts.get(1) {
                Some(value) => Ok(Command::Pump(number(name, value)?)),
                None => Ok(Command::Pump(1)),
            },
            "stop" => Ok(Command::Stop),
            "sleep" => Ok(Command::Sleep),
            "wake" => Ok(Command::Wake),
            "send" => Ok(Command::Send(
                argument(name, &parts, "send MRM_GET_STATUSINFO_REQUEST")?.to_string(),
            )),
            "frames" => Ok(Command::Frames),
            "save" => Ok(Command::Save(PathBuf::from(argument(
                name,
                &parts,
                "save capture.bin",
            )?))),
            "reset" => Ok(Command::Reset),
            _ => Err(CommandError::UnrecognizedCommand(self.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit", Command::Exit),
            ("init", Command::Init),
            ("STATUS", Command::Status),
            ("scan 10", Command::Scan(10)),
            ("pump", Command::Pump(1)),
            ("pump 25", Command::Pump(25)),
            (
                "send MRM_REBOOT_REQUEST",
                Command::Send("MRM_REBOOT_REQUEST".to_string()),
            ),
            ("save out.bin", Command::Save(PathBuf::from("out.bin"))),
            ("  stop  ", Command::Stop),
        ];

        for (cmd, expected) in inputs {
            let command: Command = cmd.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    #[should_panic(expected = "InvalidCommandArguments")]
    fn scan_requires_count() {
        let _: Command = "scan".try_into().unwrap();
    }

    #[test]
    #[should_panic(expected = "InvalidCommandArguments")]
    fn scan_count_must_fit() {
        let _: Command = "scan 70000".try_into().unwrap();
    }

    #[test]
    #[should_panic(expected = "UnrecognizedCommand")]
    fn unknown_command() {
        let _: Command = "select".try_into().unwrap();
    }

    #[test]
    #[should_panic(expected = "Empty")]
    fn blank_line() {
        let _: Command = "   ".try_into().unwrap();
    }
}
