use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::db::models::{OfferRow, SnapshotRow};
use crate::error::Result;
use crate::types::EpcObservation;

/// Durable offer + snapshot storage. Cheap to clone; all clones share one pool.
///
/// Writers go through [`SnapshotStore::begin_write`], which serializes batches
/// in-process and wraps each one in a single SQLite transaction. Readers go
/// through [`SnapshotStore::begin_read`] so a multi-query read sees one
/// consistent snapshot of the data.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

/// An open write transaction holding the store's write lock.
/// Dropping it without `commit` rolls the batch back and releases the lock.
pub struct WriteBatch {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteBatch {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open (creating if needed) the database file and apply migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for as long as the pool exists.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn begin_write(&self) -> Result<WriteBatch> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteBatch { tx, _guard: guard })
    }

    pub async fn begin_read(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

pub async fn find_offer(conn: &mut SqliteConnection, offer_id: &str) -> Result<Option<OfferRow>> {
    let row = sqlx::query_as::<_, OfferRow>(
        r#"
        SELECT offer_id, offer_name, category, geo, payout_type, payout_value,
               acceptance_rate, cookie_days, listing_date
        FROM offers
        WHERE offer_id = ?
        "#,
    )
    .bind(offer_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn insert_offer(conn: &mut SqliteConnection, offer: &OfferRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO offers (
            offer_id, offer_name, category, geo, payout_type, payout_value,
            acceptance_rate, cookie_days, listing_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&offer.offer_id)
    .bind(&offer.offer_name)
    .bind(&offer.category)
    .bind(&offer.geo)
    .bind(&offer.payout_type)
    .bind(&offer.payout_value)
    .bind(offer.acceptance_rate)
    .bind(offer.cookie_days)
    .bind(&offer.listing_date)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_offer(conn: &mut SqliteConnection, offer: &OfferRow) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE offers SET
            offer_name = ?, category = ?, geo = ?, payout_type = ?, payout_value = ?,
            acceptance_rate = ?, cookie_days = ?, listing_date = ?
        WHERE offer_id = ?
        "#,
    )
    .bind(&offer.offer_name)
    .bind(&offer.category)
    .bind(&offer.geo)
    .bind(&offer.payout_type)
    .bind(&offer.payout_value)
    .bind(offer.acceptance_rate)
    .bind(offer.cookie_days)
    .bind(&offer.listing_date)
    .bind(&offer.offer_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// All offers, or those whose name or geo contains `filter` (case-insensitive).
/// Ordered by `offer_id`.
pub async fn list_offers(conn: &mut SqliteConnection, filter: Option<&str>) -> Result<Vec<OfferRow>> {
    let pattern = like_pattern(filter);
    let rows = sqlx::query_as::<_, OfferRow>(
        r#"
        SELECT offer_id, offer_name, category, geo, payout_type, payout_value,
               acceptance_rate, cookie_days, listing_date
        FROM offers
        WHERE ? IS NULL
           OR LOWER(offer_name) LIKE ? ESCAPE '\'
           OR LOWER(COALESCE(geo, '')) LIKE ? ESCAPE '\'
        ORDER BY offer_id ASC
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

pub async fn find_snapshot(
    conn: &mut SqliteConnection,
    offer_id: &str,
    date: NaiveDate,
) -> Result<Option<SnapshotRow>> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT id, offer_id, date, epc_current, epc_7d, epc_30d
        FROM offer_epc_snapshots
        WHERE offer_id = ? AND date = ?
        "#,
    )
    .bind(offer_id)
    .bind(date)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn insert_snapshot(
    conn: &mut SqliteConnection,
    offer_id: &str,
    date: NaiveDate,
    epc: &EpcObservation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO offer_epc_snapshots (offer_id, date, epc_current, epc_7d, epc_30d)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(offer_id)
    .bind(date)
    .bind(epc.epc_current)
    .bind(epc.epc_7d)
    .bind(epc.epc_30d)
    .execute(conn)
    .await?;
    Ok(())
}

/// Overwrites all three EPC fields, including to NULL.
pub async fn update_snapshot(
    conn: &mut SqliteConnection,
    snapshot_id: i64,
    epc: &EpcObservation,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE offer_epc_snapshots
        SET epc_current = ?, epc_7d = ?, epc_30d = ?
        WHERE id = ?
        "#,
    )
    .bind(epc.epc_current)
    .bind(epc.epc_7d)
    .bind(epc.epc_30d)
    .bind(snapshot_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Snapshots of one offer within `[start, end]`, oldest first.
pub async fn offer_snapshots(
    conn: &mut SqliteConnection,
    offer_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SnapshotRow>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT id, offer_id, date, epc_current, epc_7d, epc_30d
        FROM offer_epc_snapshots
        WHERE offer_id = ? AND date >= ? AND date <= ?
        ORDER BY date ASC
        "#,
    )
    .bind(offer_id)
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Snapshots of every offer within `[start, end]`, optionally limited to offers
/// whose name or geo contains `filter`. Ordered by offer, then date ascending.
pub async fn window_snapshots(
    conn: &mut SqliteConnection,
    start: NaiveDate,
    end: NaiveDate,
    filter: Option<&str>,
) -> Result<Vec<SnapshotRow>> {
    let pattern = like_pattern(filter);
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT s.id, s.offer_id, s.date, s.epc_current, s.epc_7d, s.epc_30d
        FROM offer_epc_snapshots s
        JOIN offers o ON o.offer_id = s.offer_id
        WHERE s.date >= ? AND s.date <= ?
          AND (? IS NULL
               OR LOWER(o.offer_name) LIKE ? ESCAPE '\'
               OR LOWER(COALESCE(o.geo, '')) LIKE ? ESCAPE '\')
        ORDER BY s.offer_id ASC, s.date ASC
        "#,
    )
    .bind(start)
    .bind(end)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(conn)
    .await?;
    debug!(rows = rows.len(), %start, %end, "window scan");
    Ok(rows)
}

/// `%needle%` with LIKE wildcards escaped. Blank filters are no filter.
///
/// Only ASCII is lowercased so the needle folds exactly like SQLite's `LOWER()`
/// folds the column; non-ASCII letters must match case-for-case.
fn like_pattern(filter: Option<&str>) -> Option<String> {
    let needle = filter.map(str::trim).filter(|s| !s.is_empty())?;
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_ascii_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn offer(id: &str, name: &str, geo: Option<&str>) -> OfferRow {
        OfferRow {
            offer_id: id.to_string(),
            offer_name: name.to_string(),
            category: None,
            geo: geo.map(str::to_string),
            payout_type: None,
            payout_value: None,
            acceptance_rate: None,
            cookie_days: None,
            listing_date: None,
        }
    }

    fn epc(current: f64) -> EpcObservation {
        EpcObservation {
            epc_current: current,
            epc_7d: None,
            epc_30d: None,
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(Some(" Uk ")), Some("%uk%".to_string()));
        assert_eq!(like_pattern(Some("50%_off")), Some("%50\\%\\_off%".to_string()));
    }

    #[tokio::test]
    async fn offer_and_snapshot_round_trip_through_a_batch() {
        let store = SnapshotStore::in_memory().await.unwrap();

        let mut batch = store.begin_write().await.unwrap();
        insert_offer(batch.conn(), &offer("1", "MOYU UK", Some("UK"))).await.unwrap();
        insert_snapshot(batch.conn(), "1", day(1), &epc(12.5)).await.unwrap();
        batch.commit().await.unwrap();

        let mut tx = store.begin_read().await.unwrap();
        let found = find_offer(&mut tx, "1").await.unwrap().unwrap();
        assert_eq!(found.offer_name, "MOYU UK");
        let snap = find_snapshot(&mut tx, "1", day(1)).await.unwrap().unwrap();
        assert_eq!(snap.epc_current, 12.5);
        assert!(find_snapshot(&mut tx, "1", day(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_batch_rolls_back() {
        let store = SnapshotStore::in_memory().await.unwrap();
        {
            let mut batch = store.begin_write().await.unwrap();
            insert_offer(batch.conn(), &offer("1", "A", None)).await.unwrap();
        }
        let mut tx = store.begin_read().await.unwrap();
        assert!(find_offer(&mut tx, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_snapshot_day_is_rejected_by_schema() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let mut batch = store.begin_write().await.unwrap();
        insert_offer(batch.conn(), &offer("1", "A", None)).await.unwrap();
        insert_snapshot(batch.conn(), "1", day(1), &epc(1.0)).await.unwrap();
        assert!(insert_snapshot(batch.conn(), "1", day(1), &epc(2.0)).await.is_err());
    }

    #[tokio::test]
    async fn deleting_an_offer_cascades_to_snapshots() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let mut batch = store.begin_write().await.unwrap();
        insert_offer(batch.conn(), &offer("1", "A", None)).await.unwrap();
        insert_snapshot(batch.conn(), "1", day(1), &epc(1.0)).await.unwrap();
        insert_snapshot(batch.conn(), "1", day(2), &epc(2.0)).await.unwrap();
        sqlx::query("DELETE FROM offers WHERE offer_id = ?")
            .bind("1")
            .execute(batch.conn())
            .await
            .unwrap();
        let remaining = offer_snapshots(batch.conn(), "1", day(1), day(31)).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn window_scan_filters_by_range_and_name_or_geo() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let mut batch = store.begin_write().await.unwrap();
        insert_offer(batch.conn(), &offer("a", "Zenify Sleep", Some("US"))).await.unwrap();
        insert_offer(batch.conn(), &offer("b", "MOYU", Some("UK"))).await.unwrap();
        for (id, d, v) in [("a", 1, 1.0), ("a", 5, 2.0), ("a", 9, 3.0), ("b", 5, 4.0)] {
            insert_snapshot(batch.conn(), id, day(d), &epc(v)).await.unwrap();
        }
        batch.commit().await.unwrap();

        let mut tx = store.begin_read().await.unwrap();
        let all = window_snapshots(&mut tx, day(2), day(9), None).await.unwrap();
        let keys: Vec<_> = all.iter().map(|s| (s.offer_id.as_str(), s.date)).collect();
        assert_eq!(keys, vec![("a", day(5)), ("a", day(9)), ("b", day(5))]);

        let uk = window_snapshots(&mut tx, day(1), day(9), Some("uk")).await.unwrap();
        assert_eq!(uk.len(), 1);
        assert_eq!(uk[0].offer_id, "b");

        let sleep = list_offers(&mut tx, Some("SLEEP")).await.unwrap();
        assert_eq!(sleep.len(), 1);
        assert_eq!(sleep[0].offer_id, "a");
        assert_eq!(list_offers(&mut tx, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_ascii_names_match_their_own_spelling() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let mut batch = store.begin_write().await.unwrap();
        insert_offer(batch.conn(), &offer("1", "CAFÉ DEALS", None)).await.unwrap();
        insert_snapshot(batch.conn(), "1", day(3), &epc(1.0)).await.unwrap();
        batch.commit().await.unwrap();

        let mut tx = store.begin_read().await.unwrap();
        for needle in ["CAFÉ", "caFÉ", "É DEALS"] {
            let hits = list_offers(&mut tx, Some(needle)).await.unwrap();
            assert_eq!(hits.len(), 1, "{needle}");
            let snaps = window_snapshots(&mut tx, day(1), day(9), Some(needle)).await.unwrap();
            assert_eq!(snaps.len(), 1, "{needle}");
        }
    }
}
