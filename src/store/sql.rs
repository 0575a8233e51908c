//! SQL-backed [`DocumentStore`] for MySQL and SQLite.
//!
//! Both dialects share the read statement built by [`search_statement`]
//! (`?` placeholders, `LOWER(..) LIKE ? ESCAPE '!'`). Only the upsert
//! differs: MySQL uses `ON DUPLICATE KEY UPDATE`, SQLite `ON CONFLICT`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{ColumnIndex, Decode, Row, Type};

use super::{DocumentFilter, DocumentStore, StoreSession};
use crate::config::StoreBackend;
use crate::db::{self, DbConnection};
use crate::models::Document;

pub const TABLE: &str = "federal_documents";

const COLUMNS: &str = "document_number, title, agency, publication_date, document_url, content";

const UPSERT_MYSQL: &str = r#"
    INSERT INTO federal_documents (document_number, title, agency, publication_date, document_url, content)
    VALUES (?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        title = VALUES(title),
        agency = VALUES(agency),
        publication_date = VALUES(publication_date),
        document_url = VALUES(document_url),
        content = VALUES(content)
"#;

const UPSERT_SQLITE: &str = r#"
    INSERT INTO federal_documents (document_number, title, agency, publication_date, document_url, content)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(document_number) DO UPDATE SET
        title = excluded.title,
        agency = excluded.agency,
        publication_date = excluded.publication_date,
        document_url = excluded.document_url,
        content = excluded.content
"#;

/// A positional bind value for a built statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Date(NaiveDate),
    Int(i64),
}

/// Parameterized SQL plus its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Build the filtered read for `filter`.
///
/// User text only ever reaches the database as a bind value.
pub fn search_statement(filter: &DocumentFilter) -> Statement {
    let mut sql = format!("SELECT {} FROM {} WHERE 1=1", COLUMNS, TABLE);
    let mut params = Vec::new();

    if let Some(ref q) = filter.query {
        let pattern = like_pattern(q);
        sql.push_str(
            " AND (LOWER(title) LIKE ? ESCAPE '!' OR LOWER(content) LIKE ? ESCAPE '!')",
        );
        params.push(SqlParam::Text(pattern.clone()));
        params.push(SqlParam::Text(pattern));
    }
    if let Some(ref agency) = filter.agency {
        sql.push_str(" AND LOWER(agency) LIKE ? ESCAPE '!'");
        params.push(SqlParam::Text(like_pattern(agency)));
    }
    if let Some(start) = filter.start_date {
        sql.push_str(" AND publication_date >= ?");
        params.push(SqlParam::Date(start));
    }
    if let Some(end) = filter.end_date {
        sql.push_str(" AND publication_date <= ?");
        params.push(SqlParam::Date(end));
    }

    sql.push_str(" ORDER BY publication_date DESC, document_number ASC LIMIT ?");
    params.push(SqlParam::Int(filter.limit as i64));

    Statement { sql, params }
}

/// `%term%`, ASCII-lowercased, with LIKE wildcards in `term` escaped by `!`.
/// Only ASCII is folded, as with SQLite's `LOWER`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.to_ascii_lowercase().chars() {
        if matches!(ch, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut q = $query;
        for p in $params {
            q = match p {
                SqlParam::Text(s) => q.bind(s.clone()),
                SqlParam::Date(d) => q.bind(*d),
                SqlParam::Int(n) => q.bind(*n),
            };
        }
        q
    }};
}

fn row_to_document<'r, R>(row: &'r R) -> Result<Document>
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(Document {
        document_number: row.try_get("document_number")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        agency: row.try_get::<Option<String>, _>("agency")?.unwrap_or_default(),
        publication_date: row.try_get("publication_date")?,
        document_url: row
            .try_get::<Option<String>, _>("document_url")?
            .unwrap_or_default(),
        content: row.try_get("content")?,
    })
}

/// Store over MySQL or SQLite, selected by [`StoreBackend`].
#[derive(Debug, Clone)]
pub struct SqlStore {
    backend: StoreBackend,
}

impl SqlStore {
    pub fn new(backend: StoreBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DocumentStore for SqlStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>> {
        let conn = db::connect(&self.backend).await?;
        Ok(Box::new(SqlSession { conn }))
    }

    fn describe(&self) -> String {
        self.backend.describe()
    }
}

struct SqlSession {
    conn: DbConnection,
}

#[async_trait]
impl StoreSession for SqlSession {
    async fn upsert_document(&mut self, doc: &Document) -> Result<()> {
        match &mut self.conn {
            DbConnection::MySql(conn) => {
                sqlx::query(UPSERT_MYSQL)
                    .bind(&doc.document_number)
                    .bind(&doc.title)
                    .bind(&doc.agency)
                    .bind(doc.publication_date)
                    .bind(&doc.document_url)
                    .bind(&doc.content)
                    .execute(&mut *conn)
                    .await?;
            }
            DbConnection::Sqlite(conn) => {
                sqlx::query(UPSERT_SQLITE)
                    .bind(&doc.document_number)
                    .bind(&doc.title)
                    .bind(&doc.agency)
                    .bind(doc.publication_date)
                    .bind(&doc.document_url)
                    .bind(&doc.content)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn find_documents(&mut self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let stmt = search_statement(filter);
        tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "executing search");

        match &mut self.conn {
            DbConnection::MySql(conn) => {
                let rows = bind_params!(sqlx::query(&stmt.sql), &stmt.params)
                    .fetch_all(&mut *conn)
                    .await?;
                rows.iter().map(row_to_document).collect()
            }
            DbConnection::Sqlite(conn) => {
                let rows = bind_params!(sqlx::query(&stmt.sql), &stmt.params)
                    .fetch_all(&mut *conn)
                    .await?;
                rows.iter().map(row_to_document).collect()
            }
        }
    }

    async fn get_document(&mut self, document_number: &str) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE document_number = ?",
            COLUMNS, TABLE
        );
        match &mut self.conn {
            DbConnection::MySql(conn) => {
                let row = sqlx::query(&sql)
                    .bind(document_number)
                    .fetch_optional(&mut *conn)
                    .await?;
                row.as_ref().map(row_to_document).transpose()
            }
            DbConnection::Sqlite(conn) => {
                let row = sqlx::query(&sql)
                    .bind(document_number)
                    .fetch_optional(&mut *conn)
                    .await?;
                row.as_ref().map(row_to_document).transpose()
            }
        }
    }

    async fn count_documents(&mut self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", TABLE);
        let count = match &mut self.conn {
            DbConnection::MySql(conn) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .fetch_one(&mut *conn)
                    .await?
            }
            DbConnection::Sqlite(conn) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .fetch_one(&mut *conn)
                    .await?
            }
        };
        Ok(count)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await
    }
}
