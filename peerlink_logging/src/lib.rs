//! Logging setup shared by every peerlink crate and its tests.
//!
//! Library code logs through the `log` facade under the `peerlink` target. The
//! subscriber installed here picks those records up through `tracing`'s log bridge.
//! `RUST_LOG` takes precedence (e.g. `RUST_LOG=peerlink=trace`); without it only
//! warnings and errors from `peerlink` are shown.
pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// The log target used by every peerlink crate
pub const LOG_TARGET: &str = "peerlink";

/// Used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_DIRECTIVES: &str = "peerlink=warn";

/// Sets up the logging for any crate. A panic anywhere is logged with its location,
/// then the process exits
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(target: "peerlink", "Panic occurred at {location}: {info}");
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber only. Safe to call more than once; later calls are no-ops
pub fn setup_log_no_panic_hook() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    install(filter)
}

fn install(filter: EnvFilter) {
    let installed = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(filter)
        .finish()
        .try_init()
        .is_ok();

    if installed {
        log::trace!(target: LOG_TARGET, "Logging initialized");
    }
}
