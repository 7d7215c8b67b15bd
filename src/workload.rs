// Third Party
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Api, PostParams},
    Client, ResourceExt,
};

/// Result of looking a Deployment up by name. A failed lookup is kept apart from a missing
/// Deployment so that an API hiccup never leads to a create.
#[derive(Debug)]
pub enum Lookup {
    Found(Box<Deployment>),
    NotFound,
    Failed(kube::Error),
}

#[async_trait]
pub trait WorkloadClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Lookup;
    async fn create(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error>;
    /// Replace an existing Deployment. `deployment` must carry the resource version it was read at.
    async fn update(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error>;
}

/// `WorkloadClient` backed by the apps/v1 Deployment API.
pub struct KubeWorkloads {
    client: Client,
}

impl KubeWorkloads {
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadClient for KubeWorkloads {
    async fn get(&self, namespace: &str, name: &str) -> Lookup {
        match self.deployments(namespace).get(name).await {
            Ok(deployment) => Lookup::Found(Box::new(deployment)),
            // 404 Not found
            Err(kube::Error::Api(kube::error::ErrorResponse { code, .. })) if code == 404 => {
                Lookup::NotFound
            }
            Err(error) => Lookup::Failed(error),
        }
    }

    async fn create(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error> {
        self.deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?;
        Ok(())
    }

    async fn update(&self, namespace: &str, deployment: &Deployment) -> Result<(), kube::Error> {
        self.deployments(namespace)
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Third Party
    use chrono::Utc;
    use kube::api::DeleteParams;
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};
    use serial_test::serial;

    // Local
    use super::*;
    use crate::differ::{decide, LiveWorkload, WorkloadAction};
    use crate::reader::AppDesiredState;

    #[tokio::test]
    #[ignore = "needs a cluster reachable through the local kubeconfig"]
    #[serial]
    async fn test_create_then_update_deployment() {
        let client = Client::try_default().await.unwrap();
        let workloads = KubeWorkloads::new(&client);
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let name = format!("sheet-sync-test-{}", suffix.to_lowercase());
        let mut desired = AppDesiredState {
            name: name.clone(),
            image: "nginx:1.25".to_string(),
            replicas: 0,
        };

        assert!(matches!(workloads.get("default", &name).await, Lookup::NotFound));
        let WorkloadAction::Create(change) = decide(&desired, None, Utc::now()) else {
            panic!("expected a create");
        };
        workloads
            .create("default", &change.to_deployment("default"))
            .await
            .unwrap();

        desired.image = "nginx:1.26".to_string();
        let Lookup::Found(existing) = workloads.get("default", &name).await else {
            panic!("deployment {} was not created", name);
        };
        let live = LiveWorkload::from(existing.as_ref());
        let WorkloadAction::Update(change) = decide(&desired, Some(&live), Utc::now()) else {
            panic!("expected an update for {:?}", live);
        };
        workloads
            .update("default", &change.apply_to(*existing))
            .await
            .unwrap();

        let Lookup::Found(updated) = workloads.get("default", &name).await else {
            panic!("deployment {} disappeared", name);
        };
        assert_eq!(
            decide(&desired, Some(&LiveWorkload::from(updated.as_ref())), Utc::now()),
            WorkloadAction::NoOp
        );

        Api::<Deployment>::namespaced(client, "default")
            .delete(&name, &DeleteParams::default())
            .await
            .unwrap();
    }
}
