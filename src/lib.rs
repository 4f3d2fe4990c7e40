pub mod cli;
pub mod command;
pub mod config;
pub mod protocol;
pub mod session;
pub mod sim;
pub mod storage;

pub use cli::{Console, ConsoleError, prompt};
pub use command::{Command, CommandError};
pub use config::{AcquisitionConfig, ConfigError};
pub use session::{Frame, Session, SessionError, SessionMode};
