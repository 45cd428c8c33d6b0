use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::EPC_DIVISOR_FLOOR;
use crate::db::store::{self, SnapshotStore};
use crate::error::Result;
use crate::types::{Mover, SortMode, WindowDays};

/// Rank offers by how much their EPC moved over the trailing window.
///
/// `epc_start`/`epc_end` are the first and last snapshots observed inside
/// `[start_date, today]`; days without a snapshot are simply skipped. Offers
/// with no snapshot in the window are left out. Ties keep `offer_id` order.
pub async fn rank(
    store: &SnapshotStore,
    window: WindowDays,
    sort_mode: SortMode,
    name_filter: Option<&str>,
    today: NaiveDate,
) -> Result<Vec<Mover>> {
    let start_date = window.start_date(today);

    let mut tx = store.begin_read().await?;
    let offers = store::list_offers(&mut tx, name_filter).await?;
    let snapshots = store::window_snapshots(&mut tx, start_date, today, name_filter).await?;
    drop(tx);

    // (first, last) epc_current per offer; rows arrive ordered by date.
    let mut bounds: HashMap<&str, (f64, f64)> = HashMap::new();
    for snap in &snapshots {
        bounds
            .entry(snap.offer_id.as_str())
            .and_modify(|(_, last)| *last = snap.epc_current)
            .or_insert((snap.epc_current, snap.epc_current));
    }

    let mut movers: Vec<Mover> = offers
        .into_iter()
        .filter_map(|offer| {
            let (epc_start, epc_end) = *bounds.get(offer.offer_id.as_str())?;
            Some(Mover {
                offer,
                epc_start,
                epc_end,
                delta_abs: epc_end - epc_start,
                delta_pct: percent_change(epc_start, epc_end),
            })
        })
        .collect();

    sort_movers(&mut movers, sort_mode);

    debug!(
        window_days = window.days(),
        %sort_mode,
        filter = name_filter.unwrap_or(""),
        movers = movers.len(),
        "ranked movers"
    );
    Ok(movers)
}

/// Percentage change from `start` to `end`. The divisor is floored at
/// `EPC_DIVISOR_FLOOR`, so a zero (or negative) start stays finite.
pub fn percent_change(start: f64, end: f64) -> f64 {
    (end - start) / start.max(EPC_DIVISOR_FLOOR) * 100.0
}

/// Descending by the key the mode selects. Stable, so equal keys keep their
/// incoming order.
pub fn sort_movers(movers: &mut [Mover], mode: SortMode) {
    let key = |m: &Mover| match mode {
        SortMode::Percent => m.delta_pct,
        SortMode::Absolute => m.delta_abs,
        SortMode::Current => m.epc_end,
    };
    movers.sort_by(|a, b| descending(key(a), key(b)));
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
