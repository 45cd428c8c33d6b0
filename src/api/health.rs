//! Shared health state for the /api/health endpoint.
//! Updated by the ingestion route and the snapshot scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::IngestionCounters;

/// Ingestion bookkeeping. Writers record, the API reads.
#[derive(Default)]
pub struct HealthState {
    /// Number of successful ingestion runs since startup.
    ingest_runs: AtomicU64,
    last_ingest: Mutex<Option<(DateTime<Utc>, IngestionCounters)>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ingest_runs: u64,
    pub last_ingest_at: Option<DateTime<Utc>>,
    pub last_ingest: Option<IngestionCounters>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingestion(&self, at: DateTime<Utc>, counters: IngestionCounters) {
        self.ingest_runs.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_ingest.lock() {
            *last = Some((at, counters));
        }
    }

    pub fn ingest_runs(&self) -> u64 {
        self.ingest_runs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthResponse {
        let last = self.last_ingest.lock().ok().and_then(|l| *l);
        HealthResponse {
            status: "ok",
            ingest_runs: self.ingest_runs(),
            last_ingest_at: last.map(|(at, _)| at),
            last_ingest: last.map(|(_, c)| c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let health = HealthState::new();
        let snap = health.snapshot();
        assert_eq!(snap.status, "ok");
        assert_eq!(snap.ingest_runs, 0);
        assert!(snap.last_ingest_at.is_none());
    }

    #[test]
    fn keeps_latest_run() {
        let health = HealthState::new();
        let first = IngestionCounters { offers_processed: 3, ..Default::default() };
        let second = IngestionCounters { offers_processed: 5, ..Default::default() };
        health.record_ingestion(Utc::now(), first);
        health.record_ingestion(Utc::now(), second);

        let snap = health.snapshot();
        assert_eq!(snap.ingest_runs, 2);
        assert_eq!(snap.last_ingest, Some(second));
    }
}
