use tracing::level_filters::LevelFilter;

/// Route diagnostics to stderr; `verbose` lifts the filter from WARN to
/// DEBUG. Called once at startup, before any relay thread exists. The
/// subscriber serializes events, so a multi-field message always lands as
/// one line even with every worker logging.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
