//! Partition catalog.
//!
//! Records which partitions exist in the backing store so that a newer
//! configuration can find and delete the ones it no longer names.

use chrono::Utc;
use tokio_rusqlite::params;

use super::connection::CacheDb;
use crate::Error;

impl CacheDb {
    /// Record a partition as created by configuration `version`.
    ///
    /// Existing rows are left untouched.
    pub async fn register_partition(&self, name: &str, version: &str) -> Result<(), Error> {
        let name = name.to_string();
        let version = version.to_string();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO partitions (name, version, created_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(name) DO NOTHING",
                    params![name, version, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every partition present in the store, sorted.
    ///
    /// Includes partitions that only exist through their entries.
    pub async fn stored_partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM partitions
                    UNION
                    SELECT DISTINCT partition FROM entries
                    ORDER BY 1",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all of its entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn drop_partition(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let deleted = tx.execute("DELETE FROM entries WHERE partition = ?1", params![name])?;
                tx.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoredResponse;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.register_partition("static", "v1").await.unwrap();
        db.register_partition("static", "v2").await.unwrap();

        assert_eq!(db.stored_partition_names().await.unwrap(), vec!["static".to_string()]);
    }

    #[tokio::test]
    async fn test_names_include_entry_only_partitions() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.register_partition("pages", "v1").await.unwrap();
        db.put_entry("legacy", "https://example.com/", &StoredResponse::new(200, None, b"x".to_vec()), None)
            .await
            .unwrap();

        assert_eq!(
            db.stored_partition_names().await.unwrap(),
            vec!["legacy".to_string(), "pages".to_string()]
        );
    }

    #[tokio::test]
    async fn test_drop_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.register_partition("old", "v1").await.unwrap();
        db.register_partition("keep", "v1").await.unwrap();
        let body = StoredResponse::new(200, None, b"x".to_vec());
        db.put_entry("old", "https://example.com/1", &body, None).await.unwrap();
        db.put_entry("keep", "https://example.com/1", &body, None).await.unwrap();

        assert_eq!(db.drop_partition("old").await.unwrap(), 1);
        assert_eq!(db.stored_partition_names().await.unwrap(), vec!["keep".to_string()]);
        assert_eq!(db.count_entries("keep").await.unwrap(), 1);
        assert_eq!(db.drop_partition("old").await.unwrap(), 0);
    }
}
