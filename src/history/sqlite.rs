//! SQLite-backed history store

use super::schema::init_schema;
use super::{HistoryFilter, PublicationRecord, WorkflowHistoryStore};
use crate::error::FlowError;
use crate::publish::PublishFormat;
use crate::workflow::WorkflowExecution;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FlowError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FlowError::storage(format!("bad timestamp '{}': {}", raw, e)))
}

impl SqliteHistory {
    /// Open or create a history database
    pub fn open(path: &Path) -> Result<Self, FlowError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::storage(format!("creating {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "Opened history database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, FlowError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, FlowError> {
        self.conn
            .lock()
            .map_err(|_| FlowError::storage("history connection lock poisoned"))
    }
}

impl WorkflowHistoryStore for SqliteHistory {
    fn record(&self, execution: WorkflowExecution) -> Result<(), FlowError> {
        let payload = serde_json::to_string(&execution)?;
        self.conn()?.execute(
            "INSERT INTO executions (id, template_id, period, status, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                template_id = excluded.template_id,
                period = excluded.period,
                status = excluded.status,
                created_at = excluded.created_at,
                payload = excluded.payload",
            params![
                execution.id,
                execution.template_id,
                execution.period,
                execution.status.as_str(),
                timestamp(&execution.created_at),
                payload,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<WorkflowExecution>, FlowError> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM executions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(FlowError::from))
            .transpose()
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<WorkflowExecution>, FlowError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM executions
             WHERE (?1 IS NULL OR period = ?1) AND (?2 IS NULL OR template_id = ?2)
             ORDER BY created_at DESC, id ASC",
        )?;

        let payloads = stmt
            .query_map(params![filter.period, filter.template_id], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let executions = payloads
            .iter()
            .map(|p| serde_json::from_str::<WorkflowExecution>(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(executions)
    }

    fn delete(&self, id: &str) -> Result<(), FlowError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM executions WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(FlowError::not_found(id));
        }
        Ok(())
    }

    fn record_publication(&self, record: PublicationRecord) -> Result<(), FlowError> {
        self.conn()?.execute(
            "INSERT INTO publications (content_id, format, external_url, published_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.content_id,
                record.format.as_str(),
                record.external_url,
                timestamp(&record.published_at),
            ],
        )?;
        Ok(())
    }

    fn publications(&self) -> Result<Vec<PublicationRecord>, FlowError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT content_id, format, external_url, published_at
             FROM publications
             ORDER BY published_at DESC, id DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(content_id, format, external_url, published_at)| -> Result<_, FlowError> {
                Ok(PublicationRecord {
                    content_id,
                    format: format
                        .parse::<PublishFormat>()
                        .map_err(FlowError::storage)?,
                    external_url,
                    published_at: parse_timestamp(&published_at)?,
                })
            })
            .collect()
    }
}
