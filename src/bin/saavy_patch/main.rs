//! saavy-patch - three-operator FM ring in the terminal
//!
//! Run with: cargo run --bin saavy-patch
//!
//! Set SAAVY_PATCH_LOG=<file> to write a debug log; the terminal itself is
//! owned by the UI.

mod app;
mod ui;

use std::{fs::File, sync::Mutex};

use color_eyre::eyre::{Result as EyreResult, WrapErr};

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    init_logging()?;

    app::run()
}

fn init_logging() -> EyreResult<()> {
    let Ok(path) = std::env::var("SAAVY_PATCH_LOG") else {
        return Ok(());
    };

    let file = File::create(&path).wrap_err_with(|| format!("failed to create log file {path}"))?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .init();

    Ok(())
}
