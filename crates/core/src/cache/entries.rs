//! SQLite-backed cache instances and their entries.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheDb;
use super::hash::RequestKey;
use super::registry::CacheRegistry;
use crate::exchange::{headers_from_json, headers_to_json};
use crate::{EdgeResponse, Error};

/// Overview of one cache instance.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheSummary {
    pub name: String,
    pub created_at: String,
    pub entries: u64,
}

/// Row shape shared by the lookup queries.
type EntryRow = (u16, String, Vec<u8>);

fn decode_entry((status, headers_json, body): EntryRow) -> Result<EdgeResponse, Error> {
    let status = StatusCode::from_u16(status).map_err(|e| Error::CorruptEntry(format!("status {status}: {e}")))?;
    let headers = headers_from_json(&headers_json)?;
    Ok(EdgeResponse { status, headers, body: Bytes::from(body) })
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn ensure_cache(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO caches (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[async_trait]
impl CacheRegistry for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_cache(conn, &name)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, EdgeResponse)>) -> Result<(), Error> {
        let name = name.to_string();
        let stored_at = chrono::Utc::now().to_rfc3339();

        let mut rows = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let headers_json = headers_to_json(&response.headers)?;
            rows.push((
                key.hash(),
                key.method().to_string(),
                key.url().to_string(),
                response.status.as_u16(),
                headers_json,
                response.body.to_vec(),
            ));
        }

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                ensure_cache(&tx, &name)?;
                for (key_hash, method, url, status, headers_json, body) in &rows {
                    tx.execute(
                        "INSERT INTO entries (cache_name, key_hash, method, url, status, headers_json, body, stored_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        ON CONFLICT(cache_name, key_hash) DO UPDATE SET
                            method = excluded.method,
                            url = excluded.url,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![name, key_hash, method, url, status, headers_json, body, stored_at],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        let name = name.to_string();
        let key_hash = key.hash();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT status, headers_json, body FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                        params![name, key_hash],
                        read_entry,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(decode_entry).transpose()
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        let key_hash = key.hash();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT e.status, e.headers_json, e.body
                        FROM entries e JOIN caches c ON c.name = e.cache_name
                        WHERE e.key_hash = ?1
                        ORDER BY c.rowid ASC
                        LIMIT 1",
                        params![key_hash],
                        read_entry,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(decode_entry).transpose()
    }
}

impl CacheDb {
    /// List every cache instance with its entry count, oldest first.
    pub async fn cache_summaries(&self) -> Result<Vec<CacheSummary>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheSummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT c.name, c.created_at, COUNT(e.key_hash)
                    FROM caches c LEFT JOIN entries e ON e.cache_name = c.name
                    GROUP BY c.name
                    ORDER BY c.rowid ASC",
                )?;
                let summaries = stmt
                    .query_map([], |row| {
                        Ok(CacheSummary {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                            entries: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(summaries)
            })
            .await
            .map_err(Error::from)
    }

    /// Request identities stored in one instance, as `METHOD url`.
    ///
    /// Returns `Error::CacheMiss` if the instance does not exist.
    pub async fn entry_keys(&self, name: &str) -> Result<Vec<String>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                if !exists {
                    return Err(Error::CacheMiss(name));
                }

                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE cache_name = ?1 ORDER BY url ASC")?;
                let keys = stmt
                    .query_map(params![name], |row| {
                        let method: String = row.get(0)?;
                        let url: String = row.get(1)?;
                        Ok(format!("{method} {url}"))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, header};
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("https://site.example/").unwrap().join(path).unwrap())
    }

    fn html(body: &str) -> EdgeResponse {
        EdgeResponse::new(StatusCode::OK, body.to_string())
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
    }

    #[tokio::test]
    async fn test_put_all_and_match_in() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_all("waystation-v1", vec![(key("/maintenance.html"), html("<h1>down</h1>"))])
            .await
            .unwrap();

        let found = db.match_in("waystation-v1", &key("/maintenance.html")).await.unwrap().unwrap();
        assert_eq!(found.status, StatusCode::OK);
        assert_eq!(found.body_text(), "<h1>down</h1>");
        assert_eq!(found.header(header::CONTENT_TYPE), Some("text/html; charset=utf-8"));

        assert!(db.match_in("waystation-v1", &key("/404.html")).await.unwrap().is_none());
        assert!(db.match_in("waystation-v0", &key("/maintenance.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_creates_empty_instance() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("waystation-v1").await.unwrap();
        db.open("waystation-v1").await.unwrap();

        assert_eq!(db.list().await.unwrap(), vec!["waystation-v1".to_string()]);
        assert!(db.entry_keys("waystation-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_all_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let batch = || vec![(key("/maintenance.html"), html("m")), (key("/404.html"), html("n"))];

        db.put_all("waystation-v1", batch()).await.unwrap();
        db.put_all("waystation-v1", batch()).await.unwrap();

        let summaries = db.cache_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].entries, 2);
        assert_eq!(
            db.entry_keys("waystation-v1").await.unwrap(),
            vec!["GET https://site.example/404.html", "GET https://site.example/maintenance.html"]
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_all("waystation-v1", vec![(key("/maintenance.html"), html("m"))]).await.unwrap();

        assert!(db.delete("waystation-v1").await.unwrap());
        assert!(!db.delete("waystation-v1").await.unwrap());
        assert!(db.match_any(&key("/maintenance.html")).await.unwrap().is_none());
        assert!(matches!(db.entry_keys("waystation-v1").await, Err(Error::CacheMiss(_))));
    }

    #[tokio::test]
    async fn test_match_any_searches_all_instances() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_all("other-app", vec![(key("/logo.png"), EdgeResponse::new(StatusCode::OK, "png"))])
            .await
            .unwrap();
        db.put_all("waystation-v1", vec![(key("/maintenance.html"), html("m"))]).await.unwrap();

        let found = db.match_any(&key("/logo.png")).await.unwrap().unwrap();
        assert_eq!(found.body_text(), "png");
        assert!(db.match_any(&key("/missing.css")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("waystation-v1").await.unwrap();
        db.open("waystation-v2").await.unwrap();
        db.open("another").await.unwrap();

        assert_eq!(db.list().await.unwrap(), vec!["waystation-v1", "waystation-v2", "another"]);
    }
}
