//! The `docbench` binary: installs error reporting and logging, then hands off to the CLI
//! layer. All benchmark logic lives in the library crate.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    init_tracing();

    docbench_engine::cli::run()
}

/// Routes log events to stderr (stdout belongs to rendered results), honoring `RUST_LOG` and
/// defaulting to warnings only. A TTY gets ANSI colors; a pipe does not.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let format_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer)
        .with(ErrorLayer::default())
        .init();
}
