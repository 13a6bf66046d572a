//! Queue publisher repository: durably publishes a save request to the
//! main queue, falling back to synchronous persistence on the wrapped
//! fallback repository when the broker is unreachable. Reads never cross
//! the queue — `find` always delegates to the fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};

use crate::error::RepoError;
use crate::model::UrlRecord;
use crate::repository::Repository;

pub const MAIN_QUEUE: &str = "urls_queue";
const PUBLISH_DEADLINE: Duration = Duration::from_secs(5);

/// The broker-facing half of [`QueuePublisherRepository`], split out as a
/// trait so the decorator's delegation behavior can be unit-tested without
/// a live `lapin::Channel`, which only a connected broker can produce.
#[async_trait]
pub(crate) trait Publisher: Send + Sync {
    async fn publish(&self, body: Vec<u8>) -> anyhow::Result<()>;
}

#[async_trait]
impl Publisher for Channel {
    async fn publish(&self, body: Vec<u8>) -> anyhow::Result<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_content_type("application/json".into());

        tokio::time::timeout(
            PUBLISH_DEADLINE,
            self.basic_publish(
                "",
                MAIN_QUEUE,
                BasicPublishOptions::default(),
                &body,
                properties,
            ),
        )
        .await??
        .await?;
        Ok(())
    }
}

pub struct QueuePublisherRepository {
    publisher: Arc<dyn Publisher>,
    fallback: Arc<dyn Repository>,
}

impl QueuePublisherRepository {
    pub fn new(channel: Arc<Channel>, fallback: Arc<dyn Repository>) -> Self {
        Self {
            publisher: channel,
            fallback,
        }
    }
}

#[async_trait]
impl Repository for QueuePublisherRepository {
    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError> {
        let body = match serde_json::to_vec(record) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    shortcode = %record.shortcode,
                    error = %e,
                    "encode failed, falling back to direct write"
                );
                return self.fallback.save(record).await;
            }
        };

        match self.publisher.publish(body).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    shortcode = %record.shortcode,
                    error = %e,
                    "publish failed, falling back to direct write"
                );
                self.fallback.save(record).await
            }
        }
    }

    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError> {
        self.fallback.find(shortcode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MockRepository;

    mockall::mock! {
        pub Publisher {}

        #[async_trait]
        impl Publisher for Publisher {
            async fn publish(&self, body: Vec<u8>) -> anyhow::Result<()>;
        }
    }

    #[tokio::test]
    async fn find_always_delegates_to_fallback() {
        let mut fallback = MockRepository::new();
        fallback
            .expect_find()
            .withf(|code| code == "abc123")
            .times(1)
            .returning(|_| Ok(UrlRecord::new("https://example.com", "abc123")));

        let repo = QueuePublisherRepository {
            publisher: Arc::new(MockPublisher::new()),
            fallback: Arc::new(fallback),
        };

        let record = repo.find("abc123").await.unwrap();
        assert_eq!(record.shortcode, "abc123");
    }

    #[tokio::test]
    async fn save_falls_back_when_publish_fails() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("broker unreachable")));

        let mut fallback = MockRepository::new();
        fallback
            .expect_save()
            .withf(|record| record.shortcode == "abc123")
            .times(1)
            .returning(|_| Ok(()));

        let repo = QueuePublisherRepository {
            publisher: Arc::new(publisher),
            fallback: Arc::new(fallback),
        };

        repo.save(&UrlRecord::new("https://example.com", "abc123"))
            .await
            .unwrap();
    }
}
