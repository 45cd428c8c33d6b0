use chrono::NaiveDate;

use crate::db::store::{self, SnapshotStore};
use crate::error::{AppError, Result};
use crate::types::{HistoryPoint, OfferHistory, WindowDays};

/// EPC series for one offer over the trailing window, oldest first.
/// Days without a snapshot are absent, not zero-filled.
pub async fn history(
    store: &SnapshotStore,
    offer_id: &str,
    window: WindowDays,
    today: NaiveDate,
) -> Result<OfferHistory> {
    let mut tx = store.begin_read().await?;
    let offer = store::find_offer(&mut tx, offer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Offer not found".to_string()))?;
    let snapshots = store::offer_snapshots(&mut tx, offer_id, window.start_date(today), today).await?;

    let history = snapshots
        .into_iter()
        .map(|s| HistoryPoint {
            date: s.date,
            epc: s.epc_current,
        })
        .collect();

    Ok(OfferHistory { offer, history })
}
