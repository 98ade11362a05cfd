//! SQLite-backed vector store.
//!
//! Records live in the `documents` table; ranking is done in SQL with
//! sqlite-vec's `vec_distance_cosine`. All access goes through one connection
//! behind a mutex, so `add` and `search` never interleave.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{l2_norm, ScoredDocument, VectorStore, MIN_NORM};
use crate::db;
use crate::error::{RagentError, Result};

pub struct SqliteVectorStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

/// Encode an f32 vector as the little-endian blob sqlite-vec expects.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`, recording which embedding model
    /// produced its vectors.
    pub fn open(path: impl AsRef<Path>, embedding_model: &str) -> Result<Self> {
        let conn = db::open_database(path).map_err(|e| RagentError::Storage(format!("{e:#}")))?;

        match db::schema::get_embedding_model(&conn)? {
            Some(stored) if stored != embedding_model => {
                tracing::warn!(
                    stored = %stored,
                    configured = %embedding_model,
                    "embedding model changed, re-ingest the knowledge base to refresh vectors"
                );
            }
            Some(_) => {}
            None => db::schema::set_embedding_model(&conn, embedding_model)?,
        }

        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-initialized connection (see [`db::open_memory_database`]).
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| RagentError::Storage(format!("db lock poisoned: {e}")))?;
            match guard.as_mut() {
                Some(conn) => f(conn),
                None => Err(RagentError::NotReady {
                    component: "vector store",
                    state: "closed",
                }),
            }
        })
        .await?
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_with_source(
        &self,
        vector: Vec<f32>,
        text: String,
        source: Option<String>,
    ) -> Result<()> {
        if vector.is_empty() {
            return Err(RagentError::InvalidInput("cannot store an empty vector".into()));
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            match db::schema::get_dimensions(&tx)? {
                Some(expected) if expected != vector.len() => {
                    return Err(RagentError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => db::schema::set_dimensions(&tx, vector.len())?,
            }
            tx.execute(
                "INSERT INTO documents (content, source, embedding, norm, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    text,
                    source,
                    vector_to_blob(&vector),
                    f64::from(l2_norm(&vector)),
                    chrono::Utc::now().to_rfc3339()
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = query.to_vec();
        self.with_conn(move |conn| {
            let limit = i64::try_from(top_k).unwrap_or(i64::MAX);

            if let Some(expected) = db::schema::get_dimensions(conn)? {
                if expected != query.len() {
                    return Err(RagentError::DimensionMismatch {
                        expected,
                        actual: query.len(),
                    });
                }
            }

            // A zero query has no direction: every record scores 0 and keeps
            // insertion order.
            if l2_norm(&query) < MIN_NORM {
                let mut stmt = conn
                    .prepare("SELECT content, source FROM documents ORDER BY id ASC LIMIT ?1")?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok(ScoredDocument {
                        text: row.get(0)?,
                        score: 0.0,
                        source: row.get(1)?,
                    })
                })?;
                return Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?);
            }

            let mut stmt = conn.prepare(
                r#"
                SELECT content,
                       source,
                       CASE WHEN norm < ?2 THEN 0.0
                            ELSE 1.0 - vec_distance_cosine(embedding, ?1)
                       END AS score
                FROM documents
                ORDER BY score DESC, id ASC
                LIMIT ?3
                "#,
            )?;
            let rows = stmt.query_map(
                params![vector_to_blob(&query), f64::from(MIN_NORM), limit],
                |row| {
                    Ok(ScoredDocument {
                        text: row.get(0)?,
                        score: row.get::<_, f64>(2)? as f32,
                        source: row.get(1)?,
                    })
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            conn.lock()
                .map_err(|e| RagentError::Storage(format!("db lock poisoned: {e}")))
                .map(|mut guard| guard.take())
        })
        .await??;

        if let Some(conn) = closed {
            conn.close()
                .map_err(|(_, err)| RagentError::Storage(err.to_string()))?;
            tracing::debug!("sqlite vector store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::from_connection(db::open_memory_database().unwrap())
    }

    #[test]
    fn blob_is_little_endian_f32() {
        let blob = vector_to_blob(&[1.0, -2.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(&blob[4..], &(-2.5f32).to_le_bytes());
    }

    #[tokio::test]
    async fn ranks_by_cosine_with_insertion_tie_break() {
        let store = store();
        store.add(vec![0.0, 1.0], "orthogonal".into()).await.unwrap();
        store.add(vec![2.0, 0.0], "first match".into()).await.unwrap();
        store.add(vec![1.0, 0.0], "second match".into()).await.unwrap();

        let results = store.search(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first match", "second match", "orthogonal"]);
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn rejects_dimension_change() {
        let store = store();
        store.add(vec![1.0, 0.0], "a".into()).await.unwrap();
        let err = store.add(vec![1.0, 0.0, 0.0], "b".into()).await.unwrap_err();
        assert!(matches!(
            err,
            RagentError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn zero_query_keeps_insertion_order() {
        let store = store();
        store.add(vec![0.0, 1.0], "a".into()).await.unwrap();
        store.add(vec![1.0, 0.0], "b".into()).await.unwrap();
        let results = store.search(&[0.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "a");
        assert!(results.iter().all(|d| d.score == 0.0));
    }

    #[tokio::test]
    async fn source_is_stored_and_returned() {
        let store = store();
        store
            .add_with_source(vec![1.0, 0.0], "cited".into(), Some("guide.md".into()))
            .await
            .unwrap();
        store.add(vec![0.0, 1.0], "anonymous".into()).await.unwrap();

        let results = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].source.as_deref(), Some("guide.md"));
        assert_eq!(results[1].source, None);
    }

    #[tokio::test]
    async fn query_of_wrong_length_is_rejected() {
        let store = store();
        store.add(vec![1.0, 0.0], "a".into()).await.unwrap();
        for query in [vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]] {
            assert!(matches!(
                store.search(&query, 1).await,
                Err(RagentError::DimensionMismatch { expected: 2, actual: 3 })
            ));
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_use() {
        let store = store();
        store.close().await.unwrap();
        store.close().await.unwrap();
        let err = store.len().await.unwrap_err();
        assert!(matches!(err, RagentError::NotReady { .. }));
    }
}
