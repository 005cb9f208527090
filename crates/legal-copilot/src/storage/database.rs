//! SQLite database for durable pipeline state
//!
//! Stores documents, passages with their vectors, stage results, pipeline state, and
//! the progress event log. Every state change is written together with its stage
//! result and event in a single transaction so a restart never observes a state
//! without the result that produced it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    Document, Passage, PipelineState, ProgressEvent, StageKind, StagePayload, StageResult,
};

/// A pipeline as persisted, used to rebuild in-memory state on startup
#[derive(Debug, Clone)]
pub struct StoredPipeline {
    pub document: Document,
    pub state: PipelineState,
    pub failure_reason: Option<String>,
    pub results: Vec<StageResult>,
    pub events: Vec<ProgressEvent>,
}

/// Pipeline counts by outcome
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineDbStats {
    pub documents: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
}

/// SQLite-based pipeline store
pub struct PipelineDb {
    conn: Arc<Mutex<Connection>>,
}

impl PipelineDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                state TEXT NOT NULL,
                failure_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_state ON documents(state);

            CREATE TABLE IF NOT EXISTS passages (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                passage_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                UNIQUE(document_id, passage_index)
            );

            -- One immutable result per stage per document
            CREATE TABLE IF NOT EXISTS stage_results (
                document_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (document_id, stage),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS events (
                document_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                event_json TEXT NOT NULL,
                PRIMARY KEY (document_id, sequence),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
        "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    /// Persist a new document in its initial state together with its first event
    pub fn insert_document(&self, document: &Document, event: &ProgressEvent) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            r#"
            INSERT INTO documents (
                id, title, content_hash, raw_text, state, failure_reason, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)
            "#,
            params![
                document.id.to_string(),
                document.title,
                document.content_hash,
                document.raw_text,
                event.state.as_str(),
                document.created_at.to_rfc3339(),
                now,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to insert document: {}", e)))?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO passages (
                    id, document_id, passage_index, start_offset, end_offset, text, embedding
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for passage in &document.passages {
                stmt.execute(params![
                    passage.id.to_string(),
                    passage.document_id.to_string(),
                    passage.index as i64,
                    passage.start as i64,
                    passage.end as i64,
                    passage.text,
                    passage.embedding.as_deref().map(encode_embedding_blob),
                ])?;
            }
        }

        insert_event(&tx, event)?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Store passage vectors produced by the indexer
    pub fn save_passage_vectors(&self, document_id: Uuid, passages: &[Passage]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx.prepare(
                "UPDATE passages SET embedding = ?1 WHERE document_id = ?2 AND passage_index = ?3",
            )?;
            for passage in passages {
                let Some(vector) = passage.embedding.as_deref() else {
                    continue;
                };
                stmt.execute(params![
                    encode_embedding_blob(vector),
                    document_id.to_string(),
                    passage.index as i64,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Record a completed stage, the new state, and its event atomically
    pub fn commit_transition(
        &self,
        document_id: Uuid,
        result: &StageResult,
        to: PipelineState,
        event: &ProgressEvent,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            r#"
            INSERT INTO stage_results (document_id, stage, payload_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                document_id.to_string(),
                result.stage.as_str(),
                serde_json::to_string(&result.payload)?,
                result.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to record stage result: {}", e)))?;

        update_state(&tx, document_id, to, None)?;
        insert_event(&tx, event)?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Move a pipeline to Failed with its sanitized reason and terminal event
    pub fn mark_failed(&self, document_id: Uuid, reason: &str, event: &ProgressEvent) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        update_state(&tx, document_id, PipelineState::Failed, Some(reason))?;
        insert_event(&tx, event)?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Current persisted state of a document
    pub fn get_state(&self, document_id: Uuid) -> Result<Option<PipelineState>> {
        let conn = self.conn.lock();

        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM documents WHERE id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        state.map(|s| parse_state(&s)).transpose()
    }

    /// Load every persisted pipeline, oldest first
    pub fn load_pipelines(&self) -> Result<Vec<StoredPipeline>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, content_hash, raw_text, state, failure_reason, created_at
            FROM documents ORDER BY created_at ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content_hash: row.get(2)?,
                    raw_text: row.get(3)?,
                    state: row.get(4)?,
                    failure_reason: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut pipelines = Vec::with_capacity(rows.len());
        for row in rows {
            let document_id = parse_uuid(&row.id)?;
            let document = Document {
                id: document_id,
                title: row.title,
                content_hash: row.content_hash,
                raw_text: row.raw_text,
                passages: load_passages(&conn, document_id)?,
                created_at: parse_time(&row.created_at),
            };

            pipelines.push(StoredPipeline {
                state: parse_state(&row.state)?,
                failure_reason: row.failure_reason,
                results: load_results(&conn, document_id)?,
                events: load_events(&conn, document_id)?,
                document,
            });
        }

        Ok(pipelines)
    }

    /// Pipeline counts
    pub fn get_stats(&self) -> Result<PipelineDbStats> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM documents GROUP BY state")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stats = PipelineDbStats::default();
        for (state, count) in counts {
            let count = count as usize;
            stats.documents += count;
            match PipelineState::parse(&state) {
                Some(PipelineState::Completed) => stats.completed += count,
                Some(PipelineState::Failed) => stats.failed += count,
                _ => stats.in_progress += count,
            }
        }

        Ok(stats)
    }
}

struct DocumentRow {
    id: String,
    title: String,
    content_hash: String,
    raw_text: String,
    state: String,
    failure_reason: Option<String>,
    created_at: String,
}

fn update_state(
    tx: &rusqlite::Transaction<'_>,
    document_id: Uuid,
    state: PipelineState,
    failure_reason: Option<&str>,
) -> Result<()> {
    let updated = tx
        .execute(
            "UPDATE documents SET state = ?2, failure_reason = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                document_id.to_string(),
                state.as_str(),
                failure_reason,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to update state: {}", e)))?;

    if updated == 0 {
        return Err(Error::DocumentNotFound(document_id));
    }
    Ok(())
}

fn insert_event(tx: &rusqlite::Transaction<'_>, event: &ProgressEvent) -> Result<()> {
    tx.execute(
        "INSERT INTO events (document_id, sequence, event_json) VALUES (?1, ?2, ?3)",
        params![
            event.document_id.to_string(),
            event.sequence as i64,
            serde_json::to_string(event)?,
        ],
    )
    .map_err(|e| Error::Storage(format!("Failed to append event: {}", e)))?;
    Ok(())
}

fn load_passages(conn: &Connection, document_id: Uuid) -> Result<Vec<Passage>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT passage_index, start_offset, end_offset, text, embedding
        FROM passages WHERE document_id = ?1 ORDER BY passage_index ASC
        "#,
    )?;

    let passages = stmt
        .query_map(params![document_id.to_string()], |row| {
            let index: i64 = row.get(0)?;
            let start: i64 = row.get(1)?;
            let end: i64 = row.get(2)?;
            let text: String = row.get(3)?;
            let blob: Option<Vec<u8>> = row.get(4)?;

            let mut passage =
                Passage::new(document_id, index as u32, start as usize, end as usize, text);
            passage.embedding = blob.as_deref().and_then(decode_embedding_blob);
            Ok(passage)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(passages)
}

fn load_results(conn: &Connection, document_id: Uuid) -> Result<Vec<StageResult>> {
    let mut stmt = conn.prepare(
        "SELECT stage, payload_json, recorded_at FROM stage_results WHERE document_id = ?1",
    )?;

    let rows = stmt
        .query_map(params![document_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut results = Vec::with_capacity(rows.len());
    for (stage, payload, recorded_at) in rows {
        let stage = StageKind::parse(&stage)
            .ok_or_else(|| Error::Storage(format!("Unknown stage '{}' in database", stage)))?;
        let payload: StagePayload = serde_json::from_str(&payload)?;
        results.push(StageResult {
            stage,
            payload,
            recorded_at: parse_time(&recorded_at),
        });
    }
    results.sort_by_key(|r| r.stage);

    Ok(results)
}

fn load_events(conn: &Connection, document_id: Uuid) -> Result<Vec<ProgressEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_json FROM events WHERE document_id = ?1 ORDER BY sequence ASC",
    )?;

    let rows = stmt
        .query_map(params![document_id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(Error::from))
        .collect()
}

fn parse_state(label: &str) -> Result<PipelineState> {
    PipelineState::parse(label)
        .ok_or_else(|| Error::Storage(format!("Unknown pipeline state '{}' in database", label)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Storage(format!("Invalid id '{}': {}", value, e)))
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Little-endian f32 encoding of a vector
pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Inverse of [`encode_embedding_blob`]; `None` for empty or truncated blobs
pub fn decode_embedding_blob(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }

    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentSummary, IndexSummary};

    fn document() -> Document {
        let id = Uuid::new_v4();
        let text = "Either party may terminate. Fees are due monthly.".to_string();
        let passages = vec![
            Passage::new(id, 0, 0, 27, text[0..27].to_string()),
            Passage::new(id, 1, 28, 49, text[28..49].to_string()),
        ];
        Document::new(id, "contract.txt".to_string(), text, passages)
    }

    fn event(document_id: Uuid, sequence: u64, state: PipelineState) -> ProgressEvent {
        let mut event = ProgressEvent::state(document_id, state);
        event.sequence = sequence;
        event
    }

    #[test]
    fn test_insert_and_load() {
        let db = PipelineDb::in_memory().unwrap();
        let doc = document();
        db.insert_document(&doc, &event(doc.id, 0, PipelineState::Uploaded))
            .unwrap();

        let loaded = db.load_pipelines().unwrap();
        assert_eq!(loaded.len(), 1);
        let stored = &loaded[0];
        assert_eq!(stored.state, PipelineState::Uploaded);
        assert_eq!(stored.document.passages, doc.passages);
        assert_eq!(stored.events.len(), 1);
        assert!(stored.results.is_empty());
        assert_eq!(db.get_state(doc.id).unwrap(), Some(PipelineState::Uploaded));
    }

    #[test]
    fn test_commit_transition_and_vectors() {
        let db = PipelineDb::in_memory().unwrap();
        let doc = document();
        db.insert_document(&doc, &event(doc.id, 0, PipelineState::Uploaded))
            .unwrap();

        let embedded: Vec<Passage> = doc
            .passages
            .iter()
            .map(|p| p.with_embedding(vec![0.5, -0.25, 1.0]))
            .collect();
        db.save_passage_vectors(doc.id, &embedded).unwrap();

        let result = StageResult::new(
            StageKind::Index,
            StagePayload::Indexed(IndexSummary {
                passage_count: 2,
                dimensions: 3,
            }),
        );
        db.commit_transition(
            doc.id,
            &result,
            PipelineState::Parsed,
            &event(doc.id, 1, PipelineState::Parsed),
        )
        .unwrap();

        let stored = db.load_pipelines().unwrap().remove(0);
        assert_eq!(stored.state, PipelineState::Parsed);
        assert_eq!(stored.results.len(), 1);
        assert_eq!(stored.results[0].stage, StageKind::Index);
        assert_eq!(stored.events.len(), 2);
        assert_eq!(
            stored.document.passages[1].embedding.as_deref(),
            Some(&[0.5, -0.25, 1.0][..])
        );
    }

    #[test]
    fn test_stage_results_are_write_once() {
        let db = PipelineDb::in_memory().unwrap();
        let doc = document();
        db.insert_document(&doc, &event(doc.id, 0, PipelineState::Uploaded))
            .unwrap();

        let result = StageResult::new(
            StageKind::Summarize,
            StagePayload::Summary(DocumentSummary {
                summary: "Short.".to_string(),
                key_points: Vec::new(),
                detailed_explanation: String::new(),
                unclear_points: Vec::new(),
            }),
        );
        db.commit_transition(
            doc.id,
            &result,
            PipelineState::Summarized,
            &event(doc.id, 1, PipelineState::Summarized),
        )
        .unwrap();
        assert!(db
            .commit_transition(
                doc.id,
                &result,
                PipelineState::Summarized,
                &event(doc.id, 2, PipelineState::Summarized),
            )
            .is_err());

        // The failed transaction left nothing behind
        let stored = db.load_pipelines().unwrap().remove(0);
        assert_eq!(stored.events.len(), 2);
    }

    #[test]
    fn test_mark_failed_and_stats() {
        let db = PipelineDb::in_memory().unwrap();
        let doc = document();
        db.insert_document(&doc, &event(doc.id, 0, PipelineState::Uploaded))
            .unwrap();

        let failed = ProgressEvent {
            sequence: 1,
            ..ProgressEvent::failed(doc.id, None, "Processing was cancelled".to_string())
        };
        db.mark_failed(doc.id, "Processing was cancelled", &failed)
            .unwrap();

        let stored = db.load_pipelines().unwrap().remove(0);
        assert_eq!(stored.state, PipelineState::Failed);
        assert_eq!(
            stored.failure_reason.as_deref(),
            Some("Processing was cancelled")
        );

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_embedding_blob() {
        let values = vec![1.5_f32, -2.0, 0.0];
        let blob = encode_embedding_blob(&values);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_embedding_blob(&blob), Some(values));
        assert_eq!(decode_embedding_blob(&blob[..5]), None);
        assert_eq!(decode_embedding_blob(&[]), None);
    }
}
