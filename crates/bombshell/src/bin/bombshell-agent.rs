use clap::Parser;

use bombshell::{agent, logging};

/// Remote-side supervisor started by the bootstrap line. Speaks the relay
/// protocol on stdin/stdout; stderr stays on the inherited descriptor for
/// diagnostics.
#[derive(Parser, Debug)]
#[command(name = "bombshell-agent", version, about = "Remote peer for bombshell")]
struct Cli {
    /// Verbose diagnostic logging to stderr.
    #[arg(short = 'd')]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match agent::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
