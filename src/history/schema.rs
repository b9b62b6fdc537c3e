//! Database schema for execution history

use rusqlite::Connection;

/// Initialize the database schema
///
/// Only correlation keys get columns; the execution itself is a JSON payload.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL,
            period TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_executions_period ON executions(period);
        CREATE INDEX IF NOT EXISTS idx_executions_template ON executions(template_id);
        CREATE INDEX IF NOT EXISTS idx_executions_created ON executions(created_at);

        CREATE TABLE IF NOT EXISTS publications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id TEXT NOT NULL,
            format TEXT NOT NULL,
            external_url TEXT,
            published_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_publications_published ON publications(published_at);
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        // Idempotent
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"executions".to_string()));
        assert!(tables.contains(&"publications".to_string()));
    }
}
