use clap::Parser;

use bombshell::{launch, logging};

#[derive(Parser, Debug)]
#[command(
    name = "bombshell",
    version,
    about = "Run a command in another Qubes domain as if it ran locally"
)]
struct Cli {
    /// Verbose diagnostic logging to stderr.
    #[arg(short = 'd')]
    debug: bool,

    /// Target domain, passed verbatim to the transport helper.
    domain: String,

    /// Command and arguments to run in the domain.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match launch::run(&cli.domain, &cli.command, cli.debug) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
