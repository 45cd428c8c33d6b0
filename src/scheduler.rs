use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::ingest::run_ingestion;
use crate::provider::ProviderGateway;
use crate::types::IngestionCounters;

/// Background task that takes a provider snapshot on a fixed interval.
/// The first run happens immediately on startup.
pub struct SnapshotScheduler {
    gateway: Arc<ProviderGateway>,
    store: SnapshotStore,
    health: Arc<HealthState>,
    interval: Duration,
}

impl SnapshotScheduler {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        store: SnapshotStore,
        health: Arc<HealthState>,
        interval: Duration,
    ) -> Self {
        Self { gateway, store, health, interval }
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Snapshot scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Scheduled snapshot failed: {e}");
            }
        }
    }

    async fn tick(&self) -> Result<IngestionCounters> {
        let counters = run_ingestion(&self.gateway, &self.store, Utc::now().date_naive()).await?;
        self.health.record_ingestion(Utc::now(), counters);
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(store: SnapshotStore, token: Option<&str>) -> SnapshotScheduler {
        let gateway = ProviderGateway::with_settings(
            "http://127.0.0.1:9/".to_string(),
            "partnermatic".to_string(),
            token.map(str::to_string),
            Duration::from_millis(500),
        )
        .unwrap();
        SnapshotScheduler::new(
            Arc::new(gateway),
            store,
            Arc::new(HealthState::new()),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn tick_ingests_and_records_health() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let sched = scheduler(store, Some("t"));

        let counters = sched.tick().await.unwrap();
        assert_eq!(counters.offers_inserted, 3);
        assert_eq!(sched.health.ingest_runs(), 1);

        let counters = sched.tick().await.unwrap();
        assert_eq!(counters.snapshots_updated, 3);
        assert_eq!(sched.health.ingest_runs(), 2);
    }

    #[tokio::test]
    async fn failed_tick_is_not_recorded() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let sched = scheduler(store, None);
        assert!(sched.tick().await.is_err());
        assert_eq!(sched.health.ingest_runs(), 0);
    }
}
