// Logging setup shared by binaries and tests
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directives` (e.g.
/// `"info,agora_core=debug"`) is used. Fails if a subscriber is already
/// installed, so callers that may race (tests) can ignore the error.
pub fn init_tracing(default_directives: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directives))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}
