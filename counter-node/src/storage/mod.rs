use async_trait::async_trait;

use crate::counting::FrameCounts;

pub mod pg_client;
pub mod tables;

pub use pg_client::PgClient;

/// Receives the aggregated counts the tracking loop emits.
#[async_trait]
pub trait DetectionSink: Send + Sync {
    async fn insert_detection(&self, counts: FrameCounts);
}
