pub mod cli;
pub mod monitor;
mod run;

pub use run::run;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` (verbose count minus quiet
/// count) picks the level, starting from `info`.
pub fn init_tracing(verbosity: i8) {
    let level = match verbosity {
        i8::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
