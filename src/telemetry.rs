//! Telemetry logic.
//! Support logging and metrics descriptions.
use metrics::{Unit, describe_counter};
use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "accounts=info,tower_http=info";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling it twice is a no-op.
pub fn setup_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = installed {
        eprintln!("logger already installed: {err}");
    }
}

/// Register descriptions of every metric emitted by the crate.
pub fn describe_metrics() {
    describe_counter!(
        "accounts_users_created_total",
        Unit::Count,
        "Users created, labelled by `kind` (user, staff, superuser)."
    );
    describe_counter!(
        "accounts_authentications_total",
        Unit::Count,
        "Authentication attempts, labelled by `outcome`."
    );
}
