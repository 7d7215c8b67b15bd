// Third Party
use clap::{Parser, ValueEnum};
use tokio::time::Duration;

// Local
use crate::sheets::SHEETS_API_ENDPOINT;
use crate::utils::DEFAULT_WORKLOAD_NAMESPACE;

/// How the final status of an invocation is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StatusPolicy {
    /// One terminal write: `reconcile errors` if any app failed, `reconcile complete` otherwise.
    #[default]
    Single,
    /// `reconcile errors` if any app failed, then `reconcile complete` regardless.
    Legacy,
}

/// Settings of the convergence loop.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub workload_namespace: String,
    pub cache_ttl: Duration,
    pub requeue_after: Duration,
    /// Apps reconciled at once within one invocation.
    pub concurrency: usize,
    pub status_policy: StatusPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workload_namespace: DEFAULT_WORKLOAD_NAMESPACE.to_string(),
            cache_ttl: Duration::from_secs(60),
            requeue_after: Duration::from_secs(60),
            concurrency: 1,
            status_policy: StatusPolicy::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "sheet-sync",
    about = "Keeps Deployments in sync with the apps listed in a Google Sheet"
)]
pub struct Args {
    /// Namespace the Deployments are created and updated in.
    #[arg(long, env = "SHEETSYNC_WORKLOAD_NAMESPACE", default_value = DEFAULT_WORKLOAD_NAMESPACE)]
    pub workload_namespace: String,

    /// Seconds a read of a sheet range is reused before reading it again.
    #[arg(long, env = "SHEETSYNC_CACHE_TTL_SECS", default_value_t = 60)]
    pub cache_ttl_secs: u64,

    /// Seconds between two reconciliations of the same SheetSync, also used after errors.
    #[arg(long, env = "SHEETSYNC_REQUEUE_SECS", default_value_t = 60)]
    pub requeue_secs: u64,

    #[arg(long, env = "SHEETSYNC_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, env = "SHEETSYNC_STATUS_POLICY", value_enum, default_value_t = StatusPolicy::Single)]
    pub status_policy: StatusPolicy,

    #[arg(long, env = "SHEETSYNC_SHEETS_ENDPOINT", default_value = SHEETS_API_ENDPOINT)]
    pub sheets_endpoint: String,

    /// API key for sheets shared with "anyone with the link".
    #[arg(long, env = "GOOGLE_SHEETS_API_KEY", hide_env_values = true)]
    pub sheets_api_key: Option<String>,

    /// OAuth access token, used instead of the API key when set.
    #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,

    /// Namespace holding the leader election Lease.
    #[arg(long, env = "SHEETSYNC_LEASE_NAMESPACE", default_value = "default")]
    pub lease_namespace: String,

    #[arg(long, env = "SHEETSYNC_LEASE_TTL_SECS", default_value_t = 15)]
    pub lease_ttl_secs: u64,

    /// Identity used in the Lease, the pod name in a cluster.
    #[arg(long, env = "HOSTNAME")]
    pub holder_id: Option<String>,

    /// Print the SheetSync CustomResourceDefinition and exit.
    #[arg(long)]
    pub print_crd: bool,
}

impl Args {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            workload_namespace: self.workload_namespace.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            requeue_after: Duration::from_secs(self.requeue_secs),
            concurrency: self.concurrency.max(1),
            status_policy: self.status_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["sheet-sync"]).unwrap();
        let config = args.sync_config();
        assert_eq!(config.workload_namespace, "default");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.requeue_after, Duration::from_secs(60));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.status_policy, StatusPolicy::Single);
        assert!(!args.print_crd);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "sheet-sync",
            "--workload-namespace",
            "apps",
            "--requeue-secs",
            "10",
            "--concurrency",
            "0",
            "--status-policy",
            "legacy",
        ])
        .unwrap();
        let config = args.sync_config();
        assert_eq!(config.workload_namespace, "apps");
        assert_eq!(config.requeue_after, Duration::from_secs(10));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.status_policy, StatusPolicy::Legacy);
    }

    #[test]
    fn test_unknown_status_policy_is_rejected() {
        assert!(Args::try_parse_from(["sheet-sync", "--status-policy", "double"]).is_err());
    }
}
