//! Command line entry point for pvesel.
//!
//! Everything interesting lives in the library crate; this shim wires up
//! logging and error reporting and hands off to the selection pipeline.

use clap::Parser;
use color_eyre::{Report, Result};

use pvesel::select::{self, SelectOpts};

/// Install and configure the tracing/logging system.
///
/// Diagnostics go to stderr so the selected storage identifier stays the
/// only thing on stdout. Filtered by the RUST_LOG environment variable,
/// defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    select::run(SelectOpts::parse())
}
