// Third Party
use async_trait::async_trait;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde_json::json;

// Local
use crate::crd::{SheetSync, SyncRequest, SyncStatus};

/// Persists the sync status of a request.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn set_status(&self, request: &SyncRequest, status: SyncStatus)
        -> Result<(), kube::Error>;
}

/// Writes `status.syncStatus` through the `SheetSync` status subresource.
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
        }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn set_status(
        &self,
        request: &SyncRequest,
        status: SyncStatus,
    ) -> Result<(), kube::Error> {
        let sheet_syncs: Api<SheetSync> = Api::namespaced(self.client.clone(), &request.namespace);
        sheet_syncs
            .patch_status(
                &request.name,
                &PatchParams::default(),
                &Patch::Merge(&status_patch(status)),
            )
            .await?;
        Ok(())
    }
}

fn status_patch(status: SyncStatus) -> serde_json::Value {
    json!({ "status": { "syncStatus": status.as_str() } })
}
