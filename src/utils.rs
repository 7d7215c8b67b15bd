// Third Party
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Namespace Deployments are reconciled into unless configured otherwise.
pub const DEFAULT_WORKLOAD_NAMESPACE: &str = "default";
/// Selector label tying a Deployment to its pods.
pub const APP_LABEL: &str = "app";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "sheet-sync";
pub const LAST_SYNC_LABEL: &str = "sheetsync.dev/last-sync";
/// Name of the Lease the controller replicas compete for.
pub const LEASE_NAME: &str = "sheet-sync-controller";

/// Log to stdout. `RUST_LOG` takes precedence over `level` for `crate_name`.
pub fn init_tracing(crate_name: &str, level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={}",
            crate_name,
            level.to_string().to_lowercase()
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Exit the process as soon as SIGINT or SIGTERM arrives. Kubernetes sends SIGTERM on pod
/// deletion; the Lease simply expires for the next leader.
pub fn setup_exit_hooks() -> Result<(), anyhow::Error> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, exiting", signal);
            std::process::exit(0);
        }
    });
    Ok(())
}
