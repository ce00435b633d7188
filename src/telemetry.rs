//! Logging setup
//!
//! The library only emits `tracing` events; binaries decide where they go.
//! `RUST_LOG` overrides the default directive, e.g.
//! `RUST_LOG=sweep_orchestrator=debug` shows every engine stdout line.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "sweep_orchestrator=info";

/// Install a compact stderr subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive`.
///
/// # Errors
///
/// Returns [`Error::Telemetry`] if the directive is invalid or a global
/// subscriber is already installed.
pub fn init(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|err| Error::Telemetry(format!("invalid directive \"{default_directive}\": {err}")))?,
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| Error::Telemetry(err.to_string()))
}
