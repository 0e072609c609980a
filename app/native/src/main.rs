#![allow(clippy::multiple_crate_versions)]

//! Backdrop - rotates the desktop background from pluggable image sources.

use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(err) = backdrop_lib::cli::run() {
        eprintln!("backdrop: {err}");
        std::process::exit(1);
    }
}
