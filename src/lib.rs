//! Keeps Kubernetes Deployments converged with the apps listed in a spreadsheet.
//!
//! A `SheetSync` resource points at a spreadsheet range whose header row is
//! `App Name | Image | Replicas`. Every reconciliation reads the range (through a TTL cache),
//! creates the Deployments that are missing, updates the ones whose image or replica count
//! drifted, and records the outcome in `status.syncStatus`.

pub mod cache;
pub mod config;
pub mod controller;
pub mod crd;
pub mod differ;
pub mod error;
pub mod leader;
pub mod reader;
pub mod sheets;
pub mod status;
pub mod utils;
pub mod workload;

#[cfg(test)]
mod testing;

pub use controller::{error_policy, reconcile, Context, ReconcileOutcome};
pub use crd::{SheetSync, SyncRequest, SyncStatus};
pub use error::{FetchError, ReconcileError};
