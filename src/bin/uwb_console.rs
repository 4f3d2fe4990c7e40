use std::{error::Error, io, sync::Arc};

use clap::Parser;
use uwbscan::{
    AcquisitionConfig, Command, CommandError, Console, ConsoleError, Session, prompt,
    protocol::Registry,
};

/// Interactive radar console.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: AcquisitionConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let session = Session::connect(cli.settings.peer(), Arc::new(Registry::new()))?;
    let mut console = Console::new(session, cli.settings);

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(CommandError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if cmd == Command::Exit {
            break;
        }

        match console.execute(cmd, &mut stdout.lock()) {
            Ok(()) => {}
            Err(ConsoleError::Session(e)) if !e.is_recoverable() => {
                eprintln!("error: {e}; use 'reset' to start over");
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
