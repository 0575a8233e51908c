use anyhow::Result;

use crate::config::StoreBackend;
use crate::db::{self, DbConnection};

const MYSQL_SCHEMA: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS federal_documents (
        document_number VARCHAR(64) NOT NULL PRIMARY KEY,
        title TEXT,
        agency TEXT,
        publication_date DATE NULL,
        document_url TEXT,
        content MEDIUMTEXT NULL,
        INDEX idx_federal_documents_publication_date (publication_date)
    ) DEFAULT CHARSET = utf8mb4
    "#];

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS federal_documents (
        document_number TEXT PRIMARY KEY,
        title TEXT,
        agency TEXT,
        publication_date TEXT,
        document_url TEXT,
        content TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_federal_documents_publication_date \
     ON federal_documents(publication_date DESC)",
];

/// Create the `federal_documents` table (and its date index) if missing.
///
/// Idempotent: safe to run on every start.
pub async fn run_migrations(backend: &StoreBackend) -> Result<()> {
    let conn = db::connect(backend).await?;

    let conn = match conn {
        DbConnection::MySql(mut conn) => {
            for ddl in MYSQL_SCHEMA {
                sqlx::query(ddl).execute(&mut conn).await?;
            }
            DbConnection::MySql(conn)
        }
        DbConnection::Sqlite(mut conn) => {
            for ddl in SQLITE_SCHEMA {
                sqlx::query(ddl).execute(&mut conn).await?;
            }
            DbConnection::Sqlite(conn)
        }
    };

    conn.close().await?;
    tracing::info!(store = %backend.describe(), "schema ready");
    Ok(())
}
