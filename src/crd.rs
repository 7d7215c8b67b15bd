// System
use std::fmt;
use std::str::FromStr;

// Third Party
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local
use crate::error::ReconcileError;

/// Binds one spreadsheet range to the cluster. Each data row of the range describes a Deployment
/// that should exist in the workload namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "sheetsync.dev",
    version = "v1alpha1",
    kind = "SheetSync",
    namespaced,
    status = "SheetSyncStatus",
    shortname = "ssync",
    printcolumn = r#"{"name":"Spreadsheet","type":"string","jsonPath":".spec.spreadsheetId"}"#,
    printcolumn = r#"{"name":"Range","type":"string","jsonPath":".spec.cellRange"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.syncStatus"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SheetSyncSpec {
    pub spreadsheet_id: String,
    /// A1 notation, e.g. `Sheet1!A1:C`.
    pub cell_range: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SheetSyncStatus {
    /// One of `reconciling`, `reconcile errors` or `reconcile complete`.
    pub sync_status: Option<String>,
}

/// The values persisted in `status.syncStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Reconciling,
    ReconcileErrors,
    ReconcileComplete,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Reconciling => "reconciling",
            SyncStatus::ReconcileErrors => "reconcile errors",
            SyncStatus::ReconcileComplete => "reconcile complete",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconciling" => Ok(SyncStatus::Reconciling),
            "reconcile errors" => Ok(SyncStatus::ReconcileErrors),
            "reconcile complete" => Ok(SyncStatus::ReconcileComplete),
            other => Err(format!("unknown sync status `{}`", other)),
        }
    }
}

/// The part of a `SheetSync` the convergence loop works with. Only `status` is ever changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRequest {
    pub name: String,
    pub namespace: String,
    pub spreadsheet_id: String,
    pub cell_range: String,
    pub status: Option<SyncStatus>,
}

impl SyncRequest {
    /// `<namespace>/<name>`, used for logging and as the pacing key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl TryFrom<&SheetSync> for SyncRequest {
    type Error = ReconcileError;

    fn try_from(sync: &SheetSync) -> Result<Self, Self::Error> {
        let name = sync.name_any();
        let namespace = sync
            .namespace()
            .ok_or_else(|| ReconcileError::MissingNamespace(name.clone()))?;
        let status = sync
            .status
            .as_ref()
            .and_then(|status| status.sync_status.as_deref())
            .and_then(|value| value.parse().ok());
        Ok(SyncRequest {
            name,
            namespace,
            spreadsheet_id: sync.spec.spreadsheet_id.clone(),
            cell_range: sync.spec.cell_range.clone(),
            status,
        })
    }
}
