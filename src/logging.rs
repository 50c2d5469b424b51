//! Tracing setup for the CLI.
//!
//! Diagnostics go to stderr so stdout carries only the run log.
//! Level is controlled by `RUST_LOG`, default INFO for this crate and WARN
//! for dependencies.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "qarun=debug,info" } else { "qarun=info,warn" })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
