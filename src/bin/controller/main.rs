// System
use std::sync::Arc;

// Third Party
use clap::Parser;
use futures::StreamExt;
use kube::{
    api::Api,
    runtime::{watcher, Controller},
    Client, CustomResourceExt,
};
use tokio::time::Duration;
use tracing::{info, warn};

// Local
use sheet_sync_rs::{
    cache::DesiredStateCache,
    config::Args,
    error_policy,
    leader::Leadership,
    reconcile,
    sheets::{Credentials, GoogleSheetsSource},
    status::KubeStatusWriter,
    utils::{init_tracing, setup_exit_hooks, LEASE_NAME},
    workload::KubeWorkloads,
    Context, SheetSync,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&SheetSync::crd())?);
        return Ok(());
    }
    init_tracing("sheet_sync_rs", tracing::Level::INFO);
    setup_exit_hooks()?;

    let credentials = match (&args.sheets_token, &args.sheets_api_key) {
        (Some(token), _) => Credentials::BearerToken(token.clone()),
        (None, Some(key)) => Credentials::ApiKey(key.clone()),
        (None, None) => anyhow::bail!("set GOOGLE_SHEETS_TOKEN or GOOGLE_SHEETS_API_KEY"),
    };
    let source = GoogleSheetsSource::new(&args.sheets_endpoint, credentials)?;
    let holder_id = args
        .holder_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("set --holder-id or HOSTNAME"))?;

    let client = Client::try_default().await?;
    let ctx = Arc::new(Context::new(
        args.sync_config(),
        Arc::new(source),
        DesiredStateCache::new(),
        Arc::new(KubeWorkloads::new(&client)),
        Arc::new(KubeStatusWriter::new(&client)),
    ));
    info!("Starting with {:?}", ctx.config());

    let leadership = Leadership::new(
        &client,
        &args.lease_namespace,
        LEASE_NAME,
        &holder_id,
        Duration::from_secs(args.lease_ttl_secs),
    );
    leadership.acquire().await;

    let sheet_syncs: Api<SheetSync> = Api::all(client.clone());
    let controller = Controller::new(sheet_syncs, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => info!("Reconciled {}", object),
                Err(error) => warn!("Reconcile failed: {}", error),
            }
        });

    // If leadership is lost we exit and Kubernetes restarts the pod, which then waits for the
    // lease like any other replica.
    tokio::select! {
        _ = controller => {
            warn!("Controller stream ended");
            Ok(())
        }
        error = leadership.hold() => Err(error),
    }
}
