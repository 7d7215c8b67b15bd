// Third Party
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Leadership over the controller Lease. Only the holder runs the convergence loop, so two
/// replicas never reconcile the same SheetSync at once.
pub struct Leadership {
    lease: LeaseLock,
    holder_id: String,
    renew_every: Duration,
}

impl Leadership {
    pub fn new(
        client: &Client,
        namespace: &str,
        lease_name: &str,
        holder_id: &str,
        lease_ttl: Duration,
    ) -> Self {
        let lease = LeaseLock::new(
            client.clone(),
            namespace,
            LeaseLockParams {
                holder_id: holder_id.to_string(),
                lease_name: lease_name.to_string(),
                lease_ttl,
            },
        );
        Self {
            lease,
            holder_id: holder_id.to_string(),
            // Renew well before `lease_ttl` runs out.
            renew_every: lease_ttl / 3,
        }
    }

    /// Attempt to acquire or renew the lease. Errors count as not being the leader.
    async fn still_leader(&self) -> bool {
        match self.lease.try_acquire_or_renew().await {
            Ok(lease_result) => lease_result.acquired_lease,
            Err(error) => {
                info!("Failed to get lease lock: {:?}", error);
                false
            }
        }
    }

    /// Wait until this replica holds the lease.
    pub async fn acquire(&self) {
        loop {
            if self.still_leader().await {
                info!("{} is now the leader", self.holder_id);
                return;
            }
            debug!("Another replica holds the lease, waiting...");
            tokio::time::sleep(self.renew_every).await;
        }
    }

    /// Keep renewing the lease. Returns once it could not be renewed.
    pub async fn hold(&self) -> anyhow::Error {
        loop {
            tokio::time::sleep(self.renew_every).await;
            if !self.still_leader().await {
                warn!("{} lost the lease", self.holder_id);
                return anyhow::anyhow!("leadership lost by {}", self.holder_id);
            }
        }
    }
}
