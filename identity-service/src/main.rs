use std::sync::Arc;
use std::time::Duration;

use identity_service::{
    repository::{NameIndexRepository, UserRepository},
    service::NameIndexReconciler,
    store::RedisStore,
    KeyValueStore,
};
use shared::{RedisConfig, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    shared::init_tracing("identity-service")?;

    let config = ServiceConfig::from_env()?;
    let redis_config = RedisConfig::from_env()?;

    shared::init_metrics(config.metrics_port)?;

    tracing::info!(
        redis_url = %redis_config.url,
        key_prefix = %redis_config.key_prefix,
        metrics_port = config.metrics_port,
        compensate_on_partial_failure = config.identity.compensate_on_partial_failure,
        reconcile_interval_secs = config.identity.reconcile_interval_secs,
        reconcile_dry_run = config.identity.reconcile_dry_run,
        "Configuration loaded"
    );

    tracing::info!("Connecting to Redis...");
    let redis_store = RedisStore::connect(&redis_config).await?;
    if !redis_store.health_check().await {
        tracing::warn!("Redis did not answer PING; continuing, reconciliation will retry");
    }
    tracing::info!("Connected to Redis successfully");

    let store: Arc<dyn KeyValueStore> = Arc::new(redis_store);
    let reconciler = NameIndexReconciler::new(
        UserRepository::new(store.clone()),
        NameIndexRepository::new(store),
    );

    let interval_secs = config.identity.reconcile_interval_secs.max(1);
    let dry_run = config.identity.reconcile_dry_run;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    // A pass that has started always runs to completion; shutdown is only
    // observed between passes.
    let reconcile_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            match reconciler.reconcile(dry_run).await {
                Ok(report) => {
                    if !report.is_consistent() {
                        tracing::warn!(
                            stale = report.stale_entries.len(),
                            restored = report.restored_entries.len(),
                            duplicates = report.duplicate_names.len(),
                            applied = report.applied,
                            "Name index drift detected"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Name index reconciliation failed"
                    );
                }
            }
        }
    });

    tracing::info!(interval_secs = interval_secs, "Started name index reconciliation task");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown requested, waiting for reconciliation to finish");
    shutdown_tx.send(true)?;
    reconcile_task.await?;

    tracing::info!("Identity service shut down");

    Ok(())
}
