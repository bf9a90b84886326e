use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wallet_ledger::Session;
use wallet_ledger::csv::{read_commands, write_summary};

const USAGE: &str = "usage: wallet-ledger <commands.csv> [--json]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            "warn".parse().expect("static directive is valid"),
        ))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let json = match args.next().as_deref() {
        None => false,
        Some("--json") => true,
        Some(other) => {
            eprintln!("unexpected argument '{other}'\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let commands = match read_commands(path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::default();
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if cmd_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    session.run(ReceiverStream::new(cmd_receiver)).await;

    let wallets = session.wallets();
    let written = if json {
        write_json(&wallets)
    } else {
        write_summary(wallets.iter().map(|(label, w)| (*label, w)), io::stdout().lock())
            .map_err(io::Error::from)
    };

    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to write output: {e}");
            ExitCode::FAILURE
        }
    }
}

/// One JSON snapshot per line.
fn write_json(wallets: &[(&str, wallet_ledger::Wallet)]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for (_, wallet) in wallets {
        serde_json::to_writer(&mut out, wallet)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
