//! Entry CRUD operations.
//!
//! Entries are keyed by `(partition, normalized URL)`. Every write stamps a fresh
//! insertion timestamp and a monotonically increasing sequence number, so the
//! sequence order is the insertion order used by FIFO trimming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use crate::Error;

/// A response as held in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        Self { status, content_type, headers: Vec::new(), body: body.into() }
    }
}

/// A cached response with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key_hash: String,
    pub partition: String,
    pub url: String,
    pub response: StoredResponse,
    /// Rule-level max-age override, in seconds.
    pub max_age_secs: Option<u64>,
    pub inserted_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub seq: i64,
}

impl CacheEntry {
    /// Time since insertion (or last revalidation).
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.inserted_at
    }

    /// Whether the entry has outlived its max-age. A max-age of 0 never expires.
    ///
    /// The entry override wins over `partition_max_age_secs`.
    pub fn is_stale(&self, partition_max_age_secs: u64, now: DateTime<Utc>) -> bool {
        let max_age = self.max_age_secs.unwrap_or(partition_max_age_secs);
        if max_age == 0 {
            return false;
        }
        self.age(now).num_milliseconds() > clamp_secs(max_age).saturating_mul(1000)
    }
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

impl CacheDb {
    /// Insert or replace the entry for `url` in `partition`.
    ///
    /// Replacing an entry refreshes its insertion timestamp and moves it to the
    /// back of the FIFO order.
    pub async fn put_entry(
        &self, partition: &str, url: &str, response: &StoredResponse, max_age_secs: Option<u64>,
    ) -> Result<(), Error> {
        self.put_entry_at(partition, url, response, max_age_secs, Utc::now()).await
    }

    /// Insert or replace an entry with an explicit insertion timestamp.
    #[doc(hidden)]
    pub async fn put_entry_at(
        &self, partition: &str, url: &str, response: &StoredResponse, max_age_secs: Option<u64>,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.write_entry(partition, url, response, max_age_secs, inserted_at, false)
            .await
    }

    /// Insert or replace a precached entry. Pinned entries are skipped by
    /// trimming and the expiry sweep, and stay pinned when a later write
    /// replaces them.
    pub async fn put_pinned_entry(&self, partition: &str, url: &str, response: &StoredResponse) -> Result<(), Error> {
        self.write_entry(partition, url, response, None, Utc::now(), true)
            .await
    }

    async fn write_entry(
        &self, partition: &str, url: &str, response: &StoredResponse, max_age_secs: Option<u64>,
        inserted_at: DateTime<Utc>, pinned: bool,
    ) -> Result<(), Error> {
        let key_hash = compute_entry_key(partition, url);
        let partition = partition.to_string();
        let url = url.to_string();
        let response = response.clone();
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let inserted_ms = inserted_at.timestamp_millis();
        let max_age = max_age_secs.map(clamp_secs);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                        key_hash, partition, url, status_code, content_type, headers_json, body,
                        max_age_secs, inserted_at, last_access_at, seq, pinned
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9,
                        (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries), ?10)
                    ON CONFLICT(key_hash) DO UPDATE SET
                        status_code = excluded.status_code,
                        content_type = excluded.content_type,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        max_age_secs = excluded.max_age_secs,
                        inserted_at = excluded.inserted_at,
                        last_access_at = excluded.last_access_at,
                        seq = excluded.seq,
                        pinned = MAX(entries.pinned, excluded.pinned)",
                    params![
                        key_hash,
                        partition,
                        url,
                        response.status,
                        response.content_type,
                        headers_json,
                        response.body,
                        max_age,
                        inserted_ms,
                        pinned,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry for `url` in `partition`, refreshing its last-access timestamp.
    ///
    /// Returns None if the entry doesn't exist. Staleness is not checked here.
    pub async fn get_entry(&self, partition: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let key_hash = compute_entry_key(partition, url);
        let now_ms = Utc::now().timestamp_millis();

        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, partition, url, status_code, content_type, headers_json, body,
                        max_age_secs, inserted_at, last_access_at, seq
                    FROM entries WHERE key_hash = ?1",
                )?;

                let result = stmt.query_row(params![key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(10)?,
                    ))
                });

                let (key_hash, partition, url, status, content_type, headers_json, body, max_age, inserted, seq) =
                    match result {
                        Ok(row) => row,
                        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    };

                conn.execute(
                    "UPDATE entries SET last_access_at = ?1 WHERE key_hash = ?2",
                    params![now_ms, key_hash],
                )?;

                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
                    .map_err(|e| Error::CorruptEntry(format!("{url}: {e}")))?;

                Ok(Some(CacheEntry {
                    key_hash,
                    partition,
                    url,
                    response: StoredResponse { status, content_type, headers, body },
                    max_age_secs: max_age.map(|s| s.max(0) as u64),
                    inserted_at: millis_to_datetime(inserted),
                    last_access_at: millis_to_datetime(now_ms),
                    seq,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a single entry. Returns whether a row was removed.
    pub async fn delete_entry(&self, partition: &str, url: &str) -> Result<bool, Error> {
        let key_hash = compute_entry_key(partition, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM entries WHERE key_hash = ?1", params![key_hash])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries held by `partition`.
    pub async fn count_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs held by `partition`, oldest insertion first.
    pub async fn list_entry_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY seq ASC")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Clear the pin on every entry of `partition`. Returns the number of unpinned entries.
    pub async fn unpin_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "UPDATE entries SET pinned = 0 WHERE partition = ?1 AND pinned = 1",
                    params![partition],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of the pinned entries of `partition`, oldest insertion first.
    pub async fn list_pinned_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM entries WHERE partition = ?1 AND pinned = 1 ORDER BY seq ASC")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry in `partition`. Returns the number of deleted entries.
    pub async fn delete_partition_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE partition = ?1", params![partition])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete oldest-inserted entries of `partition` until count <= max_entries.
    ///
    /// Pinned entries count toward the bound but are never deleted. Returns the
    /// number of deleted entries.
    pub async fn trim_entries(&self, partition: &str, max_entries: usize) -> Result<u64, Error> {
        let partition = partition.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE key_hash IN (
                        SELECT key_hash FROM entries
                        WHERE partition = ?1 AND pinned = 0
                        ORDER BY seq ASC LIMIT ?2
                    )",
                    params![partition, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of `partition` older than their max-age at `now`.
    ///
    /// Entries without an override use `default_max_age_secs`; a max-age of 0 never
    /// expires. Pinned entries are kept.
    pub async fn purge_expired_entries(
        &self, partition: &str, default_max_age_secs: u64, now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let partition = partition.to_string();
        let default_max_age = clamp_secs(default_max_age_secs);
        let now_ms = now.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries
                    WHERE partition = ?1
                    AND pinned = 0
                    AND COALESCE(max_age_secs, ?2) > 0
                    AND COALESCE(max_age_secs, ?2) * 1000 < ?3 - inserted_at",
                    params![partition, default_max_age, now_ms],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Approximate bytes held by all entries.
    pub async fn storage_usage(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let usage: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(length(body) + length(url) + length(headers_json)), 0) FROM entries",
                    [],
                    |row| row.get(0),
                )?;
                Ok(usage.max(0) as u64)
            })
            .await
            .map_err(Error::from)
    }
}
