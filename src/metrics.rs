//! Prometheus metrics for the exported transactions, and the endpoint that serves them.

use crate::model::Transaction;
use crate::Result;
use anyhow::Context;
use chrono::Utc;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, trace, warn};

const TIMESTAMP_NAME: &str = "transaction_timestamp_epoch_seconds";
const AMOUNT_NAME: &str = "transaction_amount_cents";
const LABELS: &[&str] = &["account", "name", "category", "date"];

const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILURE: &str = "failure";

/// The metrics registry of the exporter. Descriptors are registered once, in `new`. Each
/// `publish` replaces the transaction label sets as a whole.
pub struct LedgerMetrics {
    registry: Registry,
    timestamps: GaugeVec,
    amounts: GaugeVec,
    cycles: IntCounterVec,
    last_success: Gauge,
    transactions: Gauge,
    // Held for writing while a publish is in progress, and for reading while encoding.
    lock: RwLock<()>,
}

impl LedgerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let timestamps = GaugeVec::new(
            Opts::new(TIMESTAMP_NAME, "When transactions occurred"),
            LABELS,
        )?;
        let amounts = GaugeVec::new(Opts::new(AMOUNT_NAME, "The transaction value"), LABELS)?;
        let cycles = IntCounterVec::new(
            Opts::new(
                "ledger_exporter_cycles_total",
                "Export cycles by outcome",
            ),
            &["outcome"],
        )?;
        let last_success = Gauge::new(
            "ledger_exporter_last_success_timestamp_seconds",
            "When the last successful export cycle finished",
        )?;
        let transactions = Gauge::new(
            "ledger_exporter_transactions",
            "Label sets published by the last successful export cycle",
        )?;

        registry.register(Box::new(timestamps.clone()))?;
        registry.register(Box::new(amounts.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(transactions.clone()))?;

        Ok(Self {
            registry,
            timestamps,
            amounts,
            cycles,
            last_success,
            transactions,
            lock: RwLock::new(()),
        })
    }

    /// Replaces the published transactions with `transactions`. Label sets of transactions that
    /// are no longer present are removed. When two transactions share a label set, the later one
    /// wins, and `ledger_exporter_transactions` counts them once.
    ///
    /// Nothing is changed if any amount cannot be expressed in cents.
    pub async fn publish(&self, transactions: &[Transaction]) -> Result<()> {
        let mut points = Vec::with_capacity(transactions.len());
        for t in transactions {
            let cents = t.amount().to_cents().with_context(|| {
                format!("Unable to publish '{}' from '{}'", t.name(), t.account())
            })?;
            points.push((t, t.timestamp(), cents));
        }

        let series: HashSet<_> = points
            .iter()
            .map(|(t, timestamp, _)| (t.account(), t.name(), t.category(), *timestamp))
            .collect();

        let _guard = self.lock.write().await;
        self.timestamps.reset();
        self.amounts.reset();
        for (t, timestamp, cents) in &points {
            let date = timestamp.to_string();
            let labels = [t.account(), t.name(), t.category(), date.as_str()];
            trace!("{labels:?} = {cents}");
            self.timestamps
                .with_label_values(&labels)
                .set(*timestamp as f64);
            self.amounts.with_label_values(&labels).set(*cents as f64);
        }
        self.cycles.with_label_values(&[OUTCOME_SUCCESS]).inc();
        self.last_success.set(Utc::now().timestamp() as f64);
        self.transactions.set(series.len() as f64);
        debug!(
            "Published {} transactions as {} series",
            transactions.len(),
            series.len()
        );
        Ok(())
    }

    /// Counts a failed cycle. The previously published transactions are left in place.
    pub fn record_failure(&self) {
        self.cycles.with_label_values(&[OUTCOME_FAILURE]).inc();
    }

    /// The text exposition of every metric, and its content type.
    pub async fn encode(&self) -> Result<(Vec<u8>, String)> {
        let families = {
            let _guard = self.lock.read().await;
            self.registry.gather()
        };
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .context("Unable to encode the metrics")?;
        Ok((buffer, encoder.format_type().to_string()))
    }

    async fn handle_metrics(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        trace!("{} {}", req.method(), req.uri());
        let response = match self.encode().await {
            Ok((body, content_type)) => Response::builder()
                .header(CONTENT_TYPE, content_type)
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                error!("{e:#}");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from_static(b"unable to encode metrics\n")))
            }
        };
        Ok(response.unwrap_or_else(|_| {
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }))
    }

    /// Answers every request on `listener` with the text exposition. Runs until accepting fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer) = listener
                .accept()
                .await
                .context("Unable to accept a metrics connection")?;
            trace!("Metrics connection from {peer}");
            let io = TokioIo::new(socket);
            let metrics = self.clone();
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { metrics.handle_metrics(req).await }
            });
            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!("Error serving metrics connection: {err}");
                }
            });
        }
    }
}
