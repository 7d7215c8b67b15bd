//! In-memory stand-ins for the sheet, the Deployment API and the status subresource.

// System
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// Third Party
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{error::ErrorResponse, ResourceExt};

// Local
use crate::crd::{SyncRequest, SyncStatus};
use crate::reader::SheetSource;
use crate::status::StatusWriter;
use crate::workload::{Lookup, WorkloadClient};

pub fn rows(cells: &[&[&str]]) -> Vec<Vec<String>> {
    cells
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    })
}

pub fn sync_request() -> SyncRequest {
    SyncRequest {
        name: "apps".to_string(),
        namespace: "ops".to_string(),
        spreadsheet_id: "sheet-1".to_string(),
        cell_range: "Sheet1!A1:C".to_string(),
        status: None,
    }
}

pub struct StaticSheet {
    rows: Mutex<Result<Vec<Vec<String>>, String>>,
    calls: AtomicUsize,
}

impl StaticSheet {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(Ok(rows)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_rows(&self, rows: Vec<Vec<String>>) {
        *self.rows.lock().unwrap() = Ok(rows);
    }

    pub fn fail(&self, message: &str) {
        *self.rows.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetSource for StaticSheet {
    async fn values(
        &self,
        _spreadsheet_id: &str,
        _cell_range: &str,
    ) -> Result<Vec<Vec<String>>, anyhow::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .clone()
            .map_err(anyhow::Error::msg)
    }
}

/// Deployments keyed by `<namespace>/<name>`. Every successful write is appended to `writes` as
/// `(verb, name)`.
#[derive(Default)]
pub struct FakeWorkloads {
    deployments: Mutex<BTreeMap<String, Deployment>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_lookups: Mutex<HashSet<String>>,
    writes: Mutex<Vec<(&'static str, String)>>,
}

impl FakeWorkloads {
    pub fn insert(&self, namespace: &str, deployment: Deployment) {
        let key = format!("{}/{}", namespace, deployment.name_any());
        self.deployments.lock().unwrap().insert(key, deployment);
    }

    pub fn get_deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_lookups_for(&self, name: &str) {
        self.failing_lookups.lock().unwrap().insert(name.to_string());
    }

    pub fn writes(&self) -> Vec<(&'static str, String)> {
        self.writes.lock().unwrap().clone()
    }

    fn write(
        &self,
        verb: &'static str,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), kube::Error> {
        let name = deployment.name_any();
        if self.failing_writes.lock().unwrap().contains(&name) {
            return Err(api_error(500, "InternalError"));
        }
        let mut deployments = self.deployments.lock().unwrap();
        let key = format!("{}/{}", namespace, name);
        match (verb, deployments.contains_key(&key)) {
            ("create", true) => return Err(api_error(409, "AlreadyExists")),
            ("update", false) => return Err(api_error(404, "NotFound")),
            _ => {}
        }
        deployments.insert(key, deployment.clone());
        self.writes.lock().unwrap().push((verb, name));
        Ok(())
    }
}

#[async_trait]
impl WorkloadClient for FakeWorkloads {
    async fn get(&self, namespace: &str, name: &str) -> Lookup {
        if self.failing_lookups.lock().unwrap().contains(name) {
            return Lookup::Failed(api_error(503, "ServiceUnavailable"));
        }
        match self.get_deployment(namespace, name) {
            Some(deployment) => Lookup::Found(Box::new(deployment)),
            None => Lookup::NotFound,
        }
    }

    async fn create(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error> {
        self.write("create", namespace, deployment)
    }

    async fn update(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error> {
        self.write("update", namespace, deployment)
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    writes: Mutex<Vec<SyncStatus>>,
    failing: Mutex<Option<SyncStatus>>,
}

impl RecordingStatus {
    pub fn fail_on(&self, status: SyncStatus) {
        *self.failing.lock().unwrap() = Some(status);
    }

    pub fn writes(&self) -> Vec<SyncStatus> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusWriter for RecordingStatus {
    async fn set_status(
        &self,
        _request: &SyncRequest,
        status: SyncStatus,
    ) -> Result<(), kube::Error> {
        if *self.failing.lock().unwrap() == Some(status) {
            return Err(api_error(409, "Conflict"));
        }
        self.writes.lock().unwrap().push(status);
        Ok(())
    }
}
