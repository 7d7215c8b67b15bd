// System
use std::collections::BTreeMap;

// Third Party
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec, ResourceRequirements},
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
    },
};
use kube::ResourceExt;

// Local
use crate::reader::AppDesiredState;
use crate::utils::{APP_LABEL, LAST_SYNC_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

const CPU_REQUEST: &str = "100m";
const MEMORY_REQUEST: &str = "128Mi";
const CPU_LIMIT: &str = "500m";
const MEMORY_LIMIT: &str = "256Mi";

/// What the cluster currently runs for an app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveWorkload {
    pub name: String,
    /// Image of the first container, if the pod template has one.
    pub image: Option<String>,
    pub replicas: i32,
}

impl From<&Deployment> for LiveWorkload {
    fn from(deployment: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let image = spec
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.containers.first())
            .and_then(|container| container.image.clone());
        // The API server defaults an unset replica count to 1.
        let replicas = spec.and_then(|spec| spec.replicas).unwrap_or(1);
        LiveWorkload {
            name: deployment.name_any(),
            image,
            replicas,
        }
    }
}

/// A create or update, together with the labels stamped on the Deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub desired: AppDesiredState,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadAction {
    Create(Change),
    Update(Change),
    NoOp,
}

/// Decide what to do about one app. Image and replica count are the only fields compared, both
/// by exact equality.
pub fn decide(
    desired: &AppDesiredState,
    live: Option<&LiveWorkload>,
    synced_at: DateTime<Utc>,
) -> WorkloadAction {
    match live {
        None => WorkloadAction::Create(Change::new(desired, synced_at)),
        Some(live)
            if live.image.as_deref() != Some(desired.image.as_str())
                || live.replicas != desired.replicas =>
        {
            WorkloadAction::Update(Change::new(desired, synced_at))
        }
        Some(_) => WorkloadAction::NoOp,
    }
}

/// Labels stamped on every Deployment the loop creates or updates.
pub fn sync_labels(synced_at: DateTime<Utc>) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (
            LAST_SYNC_LABEL.to_string(),
            // Label values may only contain alphanumerics, `-`, `_` and `.`.
            synced_at.format("%Y%m%dT%H%M%SZ").to_string(),
        ),
    ])
}

impl Change {
    fn new(desired: &AppDesiredState, synced_at: DateTime<Utc>) -> Self {
        Self {
            desired: desired.clone(),
            labels: sync_labels(synced_at),
        }
    }

    /// A new Deployment for the app, with the default resource requests and limits.
    pub fn to_deployment(&self, namespace: &str) -> Deployment {
        let name = &self.desired.name;
        let selector = BTreeMap::from([(APP_LABEL.to_string(), name.clone())]);
        let mut labels = selector.clone();
        labels.extend(self.labels.clone());
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(self.desired.replicas),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: name.clone(),
                            image: Some(self.desired.image.clone()),
                            resources: Some(default_resources()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Apply the change to an existing Deployment. Labels are merged, the replica count and the
    /// first container's image are overwritten, everything else is left alone.
    pub fn apply_to(&self, mut deployment: Deployment) -> Deployment {
        deployment.labels_mut().extend(self.labels.clone());
        let spec = deployment.spec.get_or_insert_with(Default::default);
        spec.replicas = Some(self.desired.replicas);
        let pod = spec.template.spec.get_or_insert_with(Default::default);
        match pod.containers.first_mut() {
            Some(container) => container.image = Some(self.desired.image.clone()),
            None => pod.containers.push(Container {
                name: self.desired.name.clone(),
                image: Some(self.desired.image.clone()),
                resources: Some(default_resources()),
                ..Default::default()
            }),
        }
        deployment
    }
}

fn default_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(CPU_REQUEST.to_string())),
            ("memory".to_string(), Quantity(MEMORY_REQUEST.to_string())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(CPU_LIMIT.to_string())),
            ("memory".to_string(), Quantity(MEMORY_LIMIT.to_string())),
        ])),
        ..Default::default()
    }
}
