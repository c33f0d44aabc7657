//! ARNav CLI - Command line tools for AR walking navigation.
//!
//! This crate provides the CLI binaries:
//! - walk_route: plan a route and walk it through the navigator with a
//!   simulated GPS
//! - drape_route: drape a route over terrain and print the path as JSON

pub mod sim;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the fmt subscriber with `RUST_LOG` filtering on top of
/// `default_directive`.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .init();
    Ok(())
}
