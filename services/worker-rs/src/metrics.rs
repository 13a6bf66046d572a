//! Prometheus metrics for the consumer, exposed as a text-exposition
//! endpoint on a side port rather than folded into the AMQP channel.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

pub struct WorkerMetrics {
    registry: Registry,
    jobs_processed_total: IntCounterVec,
    job_duration_seconds: Histogram,
}

/// The stable `status` label set for `worker_jobs_processed_total`. A
/// duplicate-shortcode ack counts as `Success`: the message reached a
/// terminal, non-retried outcome, same as a fresh insert.
pub enum JobOutcome {
    Success,
    Error,
    Retry,
    Dlq,
}

impl JobOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Error => "error",
            JobOutcome::Retry => "retry",
            JobOutcome::Dlq => "dlq",
        }
    }
}

impl WorkerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_processed_total = IntCounterVec::new(
            Opts::new(
                "worker_jobs_processed_total",
                "Messages processed by the worker, by terminal status and shard",
            ),
            &["status", "shard"],
        )?;
        let job_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "worker_job_duration_seconds",
            "Time spent processing a single message end to end",
        ))?;

        registry.register(Box::new(jobs_processed_total.clone()))?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            jobs_processed_total,
            job_duration_seconds,
        })
    }

    pub fn record(&self, outcome: JobOutcome, shard: &str, elapsed_seconds: f64) {
        self.jobs_processed_total
            .with_label_values(&[outcome.as_label(), shard])
            .inc();
        self.job_duration_seconds.observe(elapsed_seconds);
    }
}

/// Spawns the `/metrics` HTTP server and returns immediately; the server
/// runs for the lifetime of the process.
pub fn serve(metrics: Arc<WorkerMetrics>, addr: String) {
    tokio::spawn(async move {
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    use prometheus::Encoder;
                    let encoder = prometheus::TextEncoder::new();
                    let mut buf = Vec::new();
                    if let Err(err) = encoder.encode(&metrics.registry.gather(), &mut buf) {
                        tracing::error!(%err, "failed to encode metrics");
                        return String::new();
                    }
                    String::from_utf8(buf).unwrap_or_default()
                }
            }),
        );

        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics server listening");
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!(%err, "metrics server exited");
                }
            }
            Err(err) => tracing::error!(%err, %addr, "failed to bind metrics server"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_increment_counters_without_panicking() {
        let metrics = WorkerMetrics::new().expect("metrics registration");
        metrics.record(JobOutcome::Success, "shard-0", 0.01);
        metrics.record(JobOutcome::Dlq, "shard-1", 0.02);

        let families = metrics.registry.gather();
        let total: u64 = families
            .iter()
            .find(|f| f.get_name() == "worker_jobs_processed_total")
            .expect("counter family registered")
            .get_metric()
            .iter()
            .map(|m| m.get_counter().get_value() as u64)
            .sum();
        assert_eq!(total, 2);
    }
}
