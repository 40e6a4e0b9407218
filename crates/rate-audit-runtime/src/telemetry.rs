//! Tracing setup for embedding applications.
//!
//! The library only emits events; installing a subscriber is the host's
//! call. These helpers cover the common case.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "rate_audit_runtime=info,rate_audit_core=info";

/// Install a fmt subscriber filtered by `RUST_LOG` or [`DEFAULT_DIRECTIVE`].
///
/// Returns `Ok(false)` if a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<bool> {
    init_tracing_with(DEFAULT_DIRECTIVE)
}

/// Install a fmt subscriber filtered by `RUST_LOG` or `directive`.
pub fn init_tracing_with(directive: &str) -> anyhow::Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive)?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok();
    Ok(installed)
}
