use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::UNKNOWN_OFFER_NAME;
use crate::db::models::OfferRow;
use crate::db::store::{self, SnapshotStore};
use crate::error::{AppError, Result};
use crate::provider::ProviderGateway;
use crate::types::{EpcObservation, IngestionCounters, OfferRecord};

/// Fetch the provider's current offers and merge them as today's snapshot.
pub async fn run_ingestion(
    gateway: &ProviderGateway,
    store: &SnapshotStore,
    today: NaiveDate,
) -> Result<IngestionCounters> {
    let records = gateway.fetch().await?;
    merge(store, &records, today).await
}

/// Upsert a batch of raw provider records into the store, keyed on `today`.
///
/// Every record is coerced before anything is written, so a validation
/// failure leaves the store untouched. The writes themselves happen in one
/// transaction: either the whole batch is visible or none of it is.
/// Re-running with the same input and `today` overwrites in place.
pub async fn merge(
    store: &SnapshotStore,
    records: &[Value],
    today: NaiveDate,
) -> Result<IngestionCounters> {
    let mut counters = IngestionCounters::default();
    let mut parsed = Vec::with_capacity(records.len());
    for raw in records {
        counters.offers_processed += 1;
        match parse_record(raw)? {
            Some(record) => parsed.push(record),
            None => debug!("Skipping provider row without offer_id: {raw}"),
        }
    }
    let skipped = records.len() - parsed.len();

    let mut batch = store.begin_write().await?;
    for record in &parsed {
        let existing = store::find_offer(batch.conn(), &record.offer_id).await?;
        let offer = merged_offer(record, existing.as_ref());
        if existing.is_some() {
            store::update_offer(batch.conn(), &offer).await?;
            counters.offers_updated += 1;
        } else {
            store::insert_offer(batch.conn(), &offer).await?;
            counters.offers_inserted += 1;
        }

        match store::find_snapshot(batch.conn(), &record.offer_id, today).await? {
            Some(snapshot) => {
                store::update_snapshot(batch.conn(), snapshot.id, &record.epc).await?;
                counters.snapshots_updated += 1;
            }
            None => {
                store::insert_snapshot(batch.conn(), &record.offer_id, today, &record.epc).await?;
                counters.snapshots_inserted += 1;
            }
        }
    }
    batch.commit().await?;

    info!(
        %today,
        processed = counters.offers_processed,
        skipped,
        offers_inserted = counters.offers_inserted,
        offers_updated = counters.offers_updated,
        snapshots_inserted = counters.snapshots_inserted,
        snapshots_updated = counters.snapshots_updated,
        "Snapshot merge complete: {} offers, +{} new, {} updated",
        counters.offers_processed,
        counters.offers_inserted,
        counters.offers_updated,
    );

    Ok(counters)
}

/// Latest attributes for an offer. Only the name survives from the stored row
/// when the provider omits it; every other absent attribute becomes NULL.
fn merged_offer(record: &OfferRecord, existing: Option<&OfferRow>) -> OfferRow {
    let offer_name = record
        .offer_name
        .clone()
        .or_else(|| existing.map(|o| o.offer_name.clone()))
        .unwrap_or_else(|| UNKNOWN_OFFER_NAME.to_string());

    OfferRow {
        offer_id: record.offer_id.clone(),
        offer_name,
        category: record.category.clone(),
        geo: record.geo.clone(),
        payout_type: record.payout_type.clone(),
        payout_value: record.payout_value.clone(),
        acceptance_rate: record.acceptance_rate,
        cookie_days: record.cookie_days,
        listing_date: record.listing_date.clone(),
    }
}

// ---------------------------------------------------------------------------
// Raw record coercion
// ---------------------------------------------------------------------------

/// Coerce one provider row. `Ok(None)` means the row has no usable `offer_id`
/// and should be dropped; `Err` means a numeric field could not be parsed.
pub fn parse_record(v: &Value) -> Result<Option<OfferRecord>> {
    let Some(offer_id) = text_field(v, "offer_id").filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let acceptance_rate = float_field(v, "acceptance_rate", &offer_id)?;
    if let Some(rate) = acceptance_rate {
        if !(0.0..=100.0).contains(&rate) {
            return Err(AppError::Validation(format!(
                "offer {offer_id}: acceptance_rate {rate} is outside 0-100"
            )));
        }
    }

    let epc = EpcObservation {
        epc_current: float_field(v, "epc_current", &offer_id)?.unwrap_or(0.0),
        epc_7d: float_field(v, "epc_7d", &offer_id)?,
        epc_30d: float_field(v, "epc_30d", &offer_id)?,
    };

    Ok(Some(OfferRecord {
        cookie_days: cookie_days_field(v, &offer_id)?,
        offer_name: text_field(v, "offer_name"),
        category: text_field(v, "category"),
        geo: text_field(v, "geo"),
        payout_type: text_field(v, "payout_type"),
        payout_value: text_field(v, "payout_value"),
        listing_date: text_field(v, "listing_date"),
        acceptance_rate,
        epc,
        offer_id,
    }))
}

/// Scalars are stringified; null, absent and nested values are treated as absent.
fn text_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn float_field(v: &Value, key: &str, offer_id: &str) -> Result<Option<f64>> {
    let parsed = match v.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok(Some(x)),
        _ => Err(not_numeric(offer_id, key, v)),
    }
}

fn cookie_days_field(v: &Value, offer_id: &str) -> Result<Option<i64>> {
    const KEY: &str = "cookie_days";
    let parsed = match v.get(KEY) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|x| x.is_finite()).map(|x| x.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(days) if days >= 0 => Ok(Some(days)),
        Some(days) => Err(AppError::Validation(format!(
            "offer {offer_id}: cookie_days must not be negative (got {days})"
        ))),
        None => Err(not_numeric(offer_id, KEY, v)),
    }
}

fn not_numeric(offer_id: &str, key: &str, v: &Value) -> AppError {
    let raw = v.get(key).map(Value::to_string).unwrap_or_default();
    AppError::Validation(format!("offer {offer_id}: {key} must be numeric (got {raw})"))
}
