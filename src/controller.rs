// System
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

// Third Party
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use kube::{runtime::controller::Action, ResourceExt};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// Local
use crate::cache::DesiredStateCache;
use crate::config::{StatusPolicy, SyncConfig};
use crate::crd::{SheetSync, SyncRequest, SyncStatus};
use crate::differ::{decide, LiveWorkload, WorkloadAction};
use crate::error::ReconcileError;
use crate::reader::{AppDesiredState, DesiredStateReader, SheetSource};
use crate::status::StatusWriter;
use crate::workload::{Lookup, WorkloadClient};

/// What happened to one app during an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemAction {
    Create,
    Update,
    NoOp,
    /// The live Deployment could not be read, so nothing was decided.
    Skipped,
}

#[derive(Debug)]
pub struct ItemReport {
    pub name: String,
    pub action: ItemAction,
    pub error: Option<ReconcileError>,
}

/// Aggregate result of one invocation that got through every app.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub any_errors: bool,
    pub final_status: SyncStatus,
    /// One report per app, in sheet order.
    pub items: Vec<ItemReport>,
}

/// Everything a reconciliation needs. Shared by all invocations of the controller.
pub struct Context {
    config: SyncConfig,
    reader: DesiredStateReader,
    cache: DesiredStateCache,
    workloads: Arc<dyn WorkloadClient>,
    status: Arc<dyn StatusWriter>,
    pacer: InvocationPacer,
}

impl Context {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SheetSource>,
        cache: DesiredStateCache,
        workloads: Arc<dyn WorkloadClient>,
        status: Arc<dyn StatusWriter>,
    ) -> Self {
        Self {
            config,
            reader: DesiredStateReader::new(source),
            cache,
            workloads,
            status,
            pacer: InvocationPacer::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one invocation of the convergence loop for `request`.
    pub async fn converge(
        &self,
        request: &mut SyncRequest,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.converge_at(request, Instant::now()).await
    }

    /// Like `converge`, with `now` used for the cache freshness check.
    pub async fn converge_at(
        &self,
        request: &mut SyncRequest,
        now: Instant,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        info!("Begin reconciliation of SheetSync {}", request.key());

        // Fetching
        self.set_status(request, SyncStatus::Reconciling).await?;
        info!(
            "Reading app settings from {} - cell range: {}",
            request.spreadsheet_id, request.cell_range
        );
        let desired = self
            .cache
            .get(
                &self.reader,
                &request.spreadsheet_id,
                &request.cell_range,
                self.config.cache_ttl,
                now,
            )
            .await?;

        // PerItemReconcile
        let synced_at = Utc::now();
        let items = self.reconcile_items(desired, synced_at).await;
        let any_errors = items.iter().any(|item| item.error.is_some());

        // Reporting
        let final_status = match (any_errors, self.config.status_policy) {
            (false, _) => SyncStatus::ReconcileComplete,
            (true, StatusPolicy::Single) => SyncStatus::ReconcileErrors,
            (true, StatusPolicy::Legacy) => {
                self.set_status(request, SyncStatus::ReconcileErrors).await?;
                SyncStatus::ReconcileComplete
            }
        };
        self.set_status(request, final_status).await?;
        info!(
            "End reconciliation of SheetSync {}: {} app(s), {}",
            request.key(),
            items.len(),
            final_status
        );
        Ok(ReconcileOutcome {
            any_errors,
            final_status,
            items,
        })
    }

    async fn set_status(
        &self,
        request: &mut SyncRequest,
        status: SyncStatus,
    ) -> Result<(), ReconcileError> {
        request.status = Some(status);
        self.status
            .set_status(request, status)
            .await
            .map_err(|source| ReconcileError::StatusWrite {
                request: request.key(),
                status,
                source,
            })
    }

    /// Converge one app. Failures are reported, never returned, so one app cannot stop the others.
    async fn reconcile_item(
        &self,
        desired: AppDesiredState,
        synced_at: DateTime<Utc>,
    ) -> ItemReport {
        let namespace = self.config.workload_namespace.as_str();
        debug!("Attempting to reconcile {}", desired.name);
        let existing = match self.workloads.get(namespace, &desired.name).await {
            Lookup::Found(deployment) => Some(deployment),
            Lookup::NotFound => None,
            Lookup::Failed(source) => {
                let error = ReconcileError::Lookup {
                    name: desired.name.clone(),
                    source,
                };
                error!("{}", error);
                return ItemReport {
                    name: desired.name,
                    action: ItemAction::Skipped,
                    error: Some(error),
                };
            }
        };
        let live = existing.as_deref().map(LiveWorkload::from);

        let (action, result) = match (decide(&desired, live.as_ref(), synced_at), existing) {
            (WorkloadAction::Create(change), _) => {
                info!("Deployment {} not found, creating it", desired.name);
                let result = self
                    .workloads
                    .create(namespace, &change.to_deployment(namespace))
                    .await;
                (ItemAction::Create, result.map_err(|source| ("create", source)))
            }
            (WorkloadAction::Update(change), Some(deployment)) => {
                info!(
                    "Deployment {} runs {:?}, updating to {} x{}",
                    desired.name, live, desired.image, desired.replicas
                );
                let result = self
                    .workloads
                    .update(namespace, &change.apply_to(*deployment))
                    .await;
                (ItemAction::Update, result.map_err(|source| ("update", source)))
            }
            // The differ only updates a live Deployment; there is nothing to replace without one.
            (WorkloadAction::Update(_), None) | (WorkloadAction::NoOp, _) => {
                debug!("Deployment {} is as expected", desired.name);
                (ItemAction::NoOp, Ok(()))
            }
        };
        let error = result.err().map(|(verb, source)| ReconcileError::Apply {
            verb,
            name: desired.name.clone(),
            source,
        });
        if let Some(error) = &error {
            error!("{}", error);
        }
        ItemReport {
            name: desired.name,
            action,
            error,
        }
    }

    /// Reconcile every app, at most `concurrency` at a time. Rows sharing a name always run one
    /// after the other in sheet order, so the last row wins and the outcome does not depend on
    /// timing. Reports come back in sheet order.
    async fn reconcile_items(
        &self,
        desired: Vec<AppDesiredState>,
        synced_at: DateTime<Utc>,
    ) -> Vec<ItemReport> {
        let mut groups: Vec<Vec<(usize, AppDesiredState)>> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for (row, app) in desired.into_iter().enumerate() {
            let group = *group_of.entry(app.name.clone()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push((row, app));
        }

        let mut reports: Vec<(usize, ItemReport)> = stream::iter(groups)
            .map(|group| async move {
                let mut reports = Vec::with_capacity(group.len());
                for (row, app) in group {
                    reports.push((row, self.reconcile_item(app, synced_at).await));
                }
                reports
            })
            .buffered(self.config.concurrency.max(1))
            .flat_map(stream::iter)
            .collect()
            .await;
        reports.sort_by_key(|(row, _)| *row);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}

#[derive(Clone, Copy, Debug)]
struct LastRun {
    generation: Option<i64>,
    started: Instant,
}

/// Limits each SheetSync to one invocation per interval unless its spec changed. Status writes
/// made by the loop itself trigger watch events, which would otherwise start the next invocation
/// right away.
#[derive(Default)]
pub struct InvocationPacer {
    runs: Mutex<HashMap<String, LastRun>>,
}

impl InvocationPacer {
    /// Returns how long to wait if the object ran less than `interval` ago at the same
    /// generation. Otherwise records a run starting at `now` and returns `None`.
    ///
    /// `key` should be the object's uid, so that a SheetSync recreated under the same name is
    /// treated as new. Runs older than `interval` are forgotten.
    pub fn hold_off(
        &self,
        key: &str,
        generation: Option<i64>,
        now: Instant,
        interval: Duration,
    ) -> Option<Duration> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.retain(|_, last| now.saturating_duration_since(last.started) < interval);
        if let Some(last) = runs.get(key) {
            if last.generation == generation {
                return Some(interval - now.saturating_duration_since(last.started));
            }
        }
        runs.insert(
            key.to_string(),
            LastRun {
                generation,
                started: now,
            },
        );
        None
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Reconciler handed to `kube::runtime::Controller`.
pub async fn reconcile(sync: Arc<SheetSync>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    reconcile_at(&sync, &ctx, Instant::now()).await
}

async fn reconcile_at(
    sync: &SheetSync,
    ctx: &Context,
    now: Instant,
) -> Result<Action, ReconcileError> {
    let mut request = SyncRequest::try_from(sync)?;
    let interval = ctx.config.requeue_after;
    let pacing_key = sync.uid().unwrap_or_else(|| request.key());
    if let Some(wait) = ctx
        .pacer
        .hold_off(&pacing_key, sync.metadata.generation, now, interval)
    {
        debug!(
            "SheetSync {} ran recently, next run in {:?}",
            request.key(),
            wait
        );
        return Ok(Action::requeue(wait));
    }
    ctx.converge_at(&mut request, now).await?;
    Ok(Action::requeue(interval))
}

/// Every failed invocation is retried after the fixed interval, without backoff.
pub fn error_policy(sync: Arc<SheetSync>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(
        "Reconciliation of SheetSync {} failed, retrying in {:?}: {}",
        sync.name_any(),
        ctx.config.requeue_after,
        error
    );
    Action::requeue(ctx.config.requeue_after)
}
