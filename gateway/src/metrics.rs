//! # Prometheus Metrics
//!
//! Relay counters, scraped at `GET /metrics`. Everything is registered in a
//! dedicated [`prometheus::Registry`] under the `ilede` prefix.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metric handles shared by the relay handlers.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    /// Account lookups served.
    pub account_reads_total: IntCounter,
    /// Relayed submissions by outcome: `accepted`, `duplicate`, `rejected`,
    /// `invalid` or `error`.
    pub submissions_total: IntCounterVec,
    /// Time spent handing an envelope to the ledger, retries included.
    pub submission_latency_seconds: Histogram,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ilede".into()), None)?;

        let account_reads_total =
            IntCounter::new("account_reads_total", "Account lookups served")?;
        registry.register(Box::new(account_reads_total.clone()))?;

        let submissions_total = IntCounterVec::new(
            Opts::new("submissions_total", "Relayed envelope submissions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let submission_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "submission_latency_seconds",
                "Ledger submission latency in seconds, retries included",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(submission_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            account_reads_total,
            submissions_total,
            submission_latency_seconds,
        })
    }

    pub fn record_submission(&self, outcome: &str) {
        self.submissions_total.with_label_values(&[outcome]).inc();
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<GatewayMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.account_reads_total.inc();
        metrics.record_submission("accepted");
        metrics.record_submission("accepted");

        let text = metrics.encode().unwrap();
        assert!(text.contains("ilede_account_reads_total 1"));
        assert!(text.contains(r#"ilede_submissions_total{outcome="accepted"} 2"#));
    }
}
