//! Database row types matching `migrations/0001_offers_and_snapshots.sql`.
//! Used by sqlx for typed queries.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct OfferRow {
    pub offer_id: String,
    pub offer_name: String,
    pub category: Option<String>,
    pub geo: Option<String>,
    pub payout_type: Option<String>,
    pub payout_value: Option<String>,
    pub acceptance_rate: Option<f64>,
    pub cookie_days: Option<i64>,
    pub listing_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub offer_id: String,
    pub date: NaiveDate,
    pub epc_current: f64,
    pub epc_7d: Option<f64>,
    pub epc_30d: Option<f64>,
}
