use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_MOVER_WINDOW, HISTORY_WINDOWS, MOVER_WINDOWS,
};
use crate::db::models::OfferRow;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One provider row after coercion. Built by `ingest::parse_record`.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRecord {
    pub offer_id: String,
    pub offer_name: Option<String>,
    pub category: Option<String>,
    pub geo: Option<String>,
    pub payout_type: Option<String>,
    pub payout_value: Option<String>,
    pub acceptance_rate: Option<f64>,
    pub cookie_days: Option<i64>,
    pub listing_date: Option<String>,
    pub epc: EpcObservation,
}

/// EPC values observed for one offer on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpcObservation {
    pub epc_current: f64,
    pub epc_7d: Option<f64>,
    pub epc_30d: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCounters {
    pub offers_processed: u64,
    pub offers_inserted: u64,
    pub offers_updated: u64,
    pub snapshots_inserted: u64,
    pub snapshots_updated: u64,
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A validated trailing window of N days ending on (and including) `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDays(u32);

impl WindowDays {
    pub fn for_movers(days: Option<u32>) -> Result<Self> {
        Self::checked(days.unwrap_or(DEFAULT_MOVER_WINDOW), MOVER_WINDOWS)
    }

    pub fn for_history(days: Option<u32>) -> Result<Self> {
        Self::checked(days.unwrap_or(DEFAULT_HISTORY_WINDOW), HISTORY_WINDOWS)
    }

    fn checked(days: u32, allowed: &[u32]) -> Result<Self> {
        if allowed.contains(&days) {
            Ok(Self(days))
        } else {
            Err(AppError::Validation(format!("window must be one of {allowed:?}")))
        }
    }

    pub fn days(self) -> u32 {
        self.0
    }

    /// First day of the inclusive range `[start_date, today]`.
    pub fn start_date(self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.0.saturating_sub(1))))
            .unwrap_or(NaiveDate::MIN)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    /// Largest percentage change first.
    #[default]
    Percent,
    /// Largest absolute EPC change first.
    Absolute,
    /// Highest EPC at the end of the window first.
    Current,
}

impl FromStr for SortMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pct" | "percent" => Ok(SortMode::Percent),
            "abs" | "absolute" => Ok(SortMode::Absolute),
            "current" => Ok(SortMode::Current),
            other => Err(AppError::Validation(format!(
                "sortMode must be one of pct, abs, current (got {other:?})"
            ))),
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SortMode::Percent => "pct",
            SortMode::Absolute => "abs",
            SortMode::Current => "current",
        };
        write!(f, "{s}")
    }
}

/// An offer together with its EPC movement over a window.
#[derive(Debug, Clone, Serialize)]
pub struct Mover {
    #[serde(flatten)]
    pub offer: OfferRow,
    /// EPC of the earliest snapshot in the window
    pub epc_start: f64,
    /// EPC of the latest snapshot in the window
    pub epc_end: f64,
    pub delta_abs: f64,
    pub delta_pct: f64,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub epc: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferHistory {
    #[serde(flatten)]
    pub offer: OfferRow,
    pub history: Vec<HistoryPoint>,
}
