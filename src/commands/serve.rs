use crate::api::{self, Ledger};
use crate::commands::{authorizer, Out};
use crate::metrics::LedgerMetrics;
use crate::{Config, Mode, Result};
use anyhow::{bail, Context};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Handles `ledger-exporter serve`, the default command.
///
/// The metrics endpoint is bound and started before anything else so that the exporter can be
/// scraped even while it waits for credentials. Then the ledger is exported once per interval
/// until Ctrl-C is received.
///
/// # Errors
/// - The metrics port cannot be bound, or the endpoint stops.
/// - There is no usable token and none can be authorized.
/// - A cycle fails and `keep_going` is off.
pub async fn serve(config: &Config, mode: Mode) -> Result<Out<()>> {
    let metrics = Arc::new(LedgerMetrics::new()?);
    let listener = TcpListener::bind(config.metrics_addr())
        .await
        .with_context(|| {
            format!(
                "Unable to bind the metrics endpoint to {}",
                config.metrics_addr()
            )
        })?;
    info!(
        "Serving metrics on http://{}/metrics",
        listener.local_addr()?
    );
    let mut server = tokio::spawn(metrics.clone().serve(listener));

    let exporting = async {
        let sheet = api::sheet(config, mode, authorizer(config).as_ref()).await?;
        let mut ledger = api::ledger(config, sheet);
        export_loop(config, ledger.as_mut(), &metrics, shutdown_signal()).await
    };

    tokio::select! {
        result = exporting => result?,
        joined = &mut server => {
            match joined {
                Ok(Ok(())) => bail!("The metrics endpoint stopped"),
                Ok(Err(e)) => return Err(e.context("The metrics endpoint failed")),
                Err(e) => bail!("The metrics endpoint panicked: {e}"),
            }
        }
    }
    server.abort();
    Ok(Out::new_message("Shutting down"))
}

/// Runs export cycles, sleeping for the configured interval between them, until `shutdown`
/// completes. A failed cycle ends the loop with its error unless `keep_going` is set.
async fn export_loop<F>(
    config: &Config,
    ledger: &mut (dyn Ledger + Send),
    metrics: &LedgerMetrics,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        match export_once(ledger, metrics).await {
            Ok(count) => info!("Exported {count} transactions"),
            Err(e) if config.keep_going() => {
                metrics.record_failure();
                error!("Export failed, keeping the previous metrics: {e:#}");
            }
            Err(e) => {
                metrics.record_failure();
                return Err(e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval()) => {}
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                return Ok(());
            }
        }
    }
}

/// One cycle: read the ledger and publish what it holds now.
async fn export_once(ledger: &mut (dyn Ledger + Send), metrics: &LedgerMetrics) -> Result<usize> {
    let transactions = ledger
        .transactions(Utc::now())
        .await
        .context("Unable to read the ledger")?;
    metrics.publish(&transactions).await?;
    Ok(transactions.len())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await
    }
}
