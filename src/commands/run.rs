use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerts::{Evaluator, Notifier, RuleCatalog, TemplateRenderer};
use crate::config::Config;
use crate::metrics::PrometheusClient;
use crate::notify::NotificationClient;
use crate::platform::CloudFoundryClient;
use crate::scan::{NodeIdentity, ScanOrchestrator, ScanScheduler};
use crate::server;

/// Wire the adapters together from configuration.
pub fn build_orchestrator(config: &Config, catalog: RuleCatalog) -> Result<ScanOrchestrator> {
    config.validate().context("Invalid configuration")?;

    let inventory = CloudFoundryClient::new(
        config.api_url()?,
        config.platform_credentials()?,
        Duration::from_secs(config.platform.timeout_secs),
    )
    .context("Failed to create platform client")?;

    let api_key = Some(config.prometheus.api_key.clone());
    let metrics = PrometheusClient::new(
        &config.prometheus_url()?,
        api_key,
        Duration::from_secs(config.prometheus.timeout_secs),
    )
    .context("Failed to create Prometheus client")?;

    let dispatcher = NotificationClient::new(
        &config.notification_url()?,
        config.notification.username.clone(),
        config.notification.password.clone(),
        Duration::from_secs(config.notification.timeout_secs),
    )
    .context("Failed to create notification client")?;

    let templates = Arc::new(TemplateRenderer::new());
    let evaluator = Evaluator::new(Arc::new(metrics), templates.clone(), config.call_timeout());
    let notifier = Notifier::new(
        Arc::new(dispatcher),
        templates,
        config.notification.environment.clone(),
        config.call_timeout(),
    );

    Ok(ScanOrchestrator::new(
        NodeIdentity {
            app_guid: config.platform.app_guid.clone(),
            replica_index: config.platform.instance_index,
        },
        Arc::new(inventory),
        Arc::new(catalog),
        evaluator,
        notifier,
        config.scan.concurrency,
        config.call_timeout(),
    ))
}

pub async fn handle_run_command(config: Config) -> Result<()> {
    let rules_path = Path::new(&config.rules.path);
    let catalog = RuleCatalog::load(rules_path)
        .with_context(|| format!("Failed to load rules from {}", rules_path.display()))?;
    info!(
        path = %rules_path.display(),
        service_types = catalog.labels().len(),
        rules = catalog.rule_count(),
        "loaded alert rules"
    );

    let orchestrator = build_orchestrator(&config, catalog)?;
    info!(
        replica_index = config.platform.instance_index,
        app_guid = %config.platform.app_guid,
        environment = %config.notification.environment,
        "starting service alerter"
    );

    let shutdown = CancellationToken::new();
    let scheduler = ScanScheduler::new(Arc::new(orchestrator), config.scan_interval())
        .start_with_token(shutdown.clone());
    let mut server = tokio::spawn(server::serve(
        config.server.port,
        scheduler.status(),
        shutdown.clone(),
    ));

    // The status server exiting on its own (e.g. the port is taken) stops
    // the alerter too.
    let server_exit = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown requested");
            None
        }
        result = &mut server => Some(result),
    };
    shutdown.cancel();

    scheduler
        .join()
        .await
        .context("scan scheduler task failed")?;
    let server_result = match server_exit {
        Some(result) => result,
        None => server.await,
    };
    server_result.context("status server task failed")??;

    info!("service alerter stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM; only Ctrl-C will stop the alerter");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
