//! The per-message state machine. One task is spawned per delivery so a
//! slow shard never blocks the rest of the prefetch window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use urlshort_core::{RepoError, RepositoryFactory, UrlRecord};

use crate::metrics::{JobOutcome, WorkerMetrics};
use crate::retry::{headers_with_retry_count, is_infrastructure_error, read_retry_count};
use crate::topology::MAIN_QUEUE;

/// Requeue-without-incrementing delay for infrastructure failures: gives a
/// flapping shard or broker a moment to recover before the redelivery.
const INFRA_BACKOFF: Duration = Duration::from_secs(5);

pub async fn run(
    channel: Channel,
    factory: Arc<RepositoryFactory>,
    metrics: Arc<WorkerMetrics>,
    max_retries: u32,
    consumer_tag: &str,
) -> anyhow::Result<()> {
    let mut consumer = channel
        .basic_consume(
            MAIN_QUEUE,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut shutdown = shutdown_signal()?;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, draining in-flight work");
                break;
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!("consumer stream ended");
                    break;
                };
                let delivery = delivery?;
                let channel = channel.clone();
                let factory = Arc::clone(&factory);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_delivery(delivery, &channel, &factory, &metrics, max_retries).await
                    {
                        tracing::error!(%err, "failed to settle delivery");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_delivery(
    delivery: lapin::message::Delivery,
    channel: &Channel,
    factory: &RepositoryFactory,
    metrics: &WorkerMetrics,
    max_retries: u32,
) -> anyhow::Result<()> {
    let started = Instant::now();

    let record: UrlRecord = match serde_json::from_slice(&delivery.data) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(%err, "undecodable message, dead-lettering");
            delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await?;
            metrics.record(JobOutcome::Dlq, "unknown", started.elapsed().as_secs_f64());
            return Ok(());
        }
    };

    let shard = factory.shard_label(&record.shortcode);
    let retries = read_retry_count(delivery.properties.headers().as_ref());
    let result = factory
        .execute_transaction(&record.shortcode, |repo| {
            let record = record.clone();
            async move { repo.save(&record).await }
        })
        .await;

    match result {
        Ok(()) => {
            delivery.ack(BasicAckOptions::default()).await?;
            metrics.record(JobOutcome::Success, &shard, started.elapsed().as_secs_f64());
        }
        Err(RepoError::IntegrityViolation(_)) => {
            tracing::info!(shortcode = %record.shortcode, "duplicate shortcode, acking");
            delivery.ack(BasicAckOptions::default()).await?;
            metrics.record(JobOutcome::Success, &shard, started.elapsed().as_secs_f64());
        }
        // Retry budget exhaustion is checked before error classification:
        // a message that has already burned through its retries must
        // reach the DLQ even if its latest failure looks infrastructural,
        // or a permanently down backend would back off on it forever.
        Err(err) if retries >= max_retries => {
            tracing::error!(%err, retries, "retry budget exhausted, dead-lettering");
            delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await?;
            metrics.record(JobOutcome::Dlq, &shard, started.elapsed().as_secs_f64());
        }
        Err(err) if is_infrastructure_error(&err) => {
            tracing::warn!(%err, "infrastructure error, requeueing without incrementing retries");
            tokio::time::sleep(INFRA_BACKOFF).await;
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await?;
            metrics.record(JobOutcome::Error, &shard, started.elapsed().as_secs_f64());
        }
        Err(_) => match republish(channel, &delivery.data, retries + 1).await {
            Ok(()) => {
                delivery.ack(BasicAckOptions::default()).await?;
                metrics.record(JobOutcome::Retry, &shard, started.elapsed().as_secs_f64());
            }
            Err(publish_err) => {
                tracing::warn!(%publish_err, "republish failed, requeueing original");
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?;
                metrics.record(JobOutcome::Error, &shard, started.elapsed().as_secs_f64());
            }
        },
    }

    Ok(())
}

async fn republish(channel: &Channel, body: &[u8], retries: u32) -> anyhow::Result<()> {
    let properties = BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type("application/json".into())
        .with_headers(headers_with_retry_count(retries));

    channel
        .basic_publish(
            "",
            MAIN_QUEUE,
            BasicPublishOptions::default(),
            body,
            properties,
        )
        .await?
        .await?;
    Ok(())
}

fn shutdown_signal() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("caught SIGTERM"),
            _ = sigint.recv() => tracing::info!("caught SIGINT"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_backoff_is_five_seconds() {
        assert_eq!(INFRA_BACKOFF, Duration::from_secs(5));
    }
}
