use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging. `RUST_LOG` wins when set; otherwise the crate logs at
/// info, or debug with `verbose`.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "boringhannover=debug,warn"
    } else {
        "boringhannover=info,warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
