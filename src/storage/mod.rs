//! Data storage and persistence


use crate::catalog::Sequence;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;

/// A job the analysis pipeline has finished
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedJob {
    pub jid: u64,
    pub request_ids: Vec<u64>,
    pub done: bool,
    pub processed_at: DateTime<Utc>,
}

/// Bookkeeping for one variable star: the jobs it appeared in and its
/// comparison sequence once AAVSO provided one
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VarStarEntry {
    pub name: String,
    pub jobs: BTreeSet<u64>,
    pub sequence: Option<Sequence>,
}

impl VarStarEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Database for processed jobs and variable-star state
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_url(&db_url).await
    }

    /// Connect to a database URL; `sqlite::memory:` keeps a single connection
    /// so every query sees the same in-memory database
    pub async fn connect_url(db_url: &str) -> Result<Self> {
        let max = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect(db_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_jobs (
                jid INTEGER PRIMARY KEY,
                request_ids TEXT NOT NULL,
                done INTEGER NOT NULL,
                processed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS variable_stars (
                name TEXT PRIMARY KEY,
                jobs TEXT NOT NULL,
                sequence TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn is_processed(&self, jid: u64) -> Result<bool> {
        Ok(self.processed_job(jid).await?.is_some_and(|j| j.done))
    }

    pub async fn processed_job(&self, jid: u64) -> Result<Option<ProcessedJob>> {
        let row = sqlx::query_as::<_, ProcessedRow>(
            r#"
            SELECT jid, request_ids, done, processed_at
            FROM processed_jobs
            WHERE jid = ?
            "#,
        )
        .bind(jid as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProcessedJob::try_from).transpose()
    }

    /// Record a finished job (replaces an earlier record)
    pub async fn mark_processed(&self, jid: u64, request_ids: &[u64]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO processed_jobs (jid, request_ids, done, processed_at)
            VALUES (?, ?, 1, ?)
            "#,
        )
        .bind(jid as i64)
        .bind(serde_json::to_string(request_ids)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn variable_star(&self, name: &str) -> Result<Option<VarStarEntry>> {
        let row = sqlx::query_as::<_, StarRow>(
            r#"
            SELECT name, jobs, sequence
            FROM variable_stars
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VarStarEntry::try_from).transpose()
    }

    pub async fn save_variable_star(&self, entry: &VarStarEntry) -> Result<()> {
        let sequence = entry.sequence.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO variable_stars (name, jobs, sequence, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&entry.name)
        .bind(serde_json::to_string(&entry.jobs)?)
        .bind(sequence)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All stars, sorted by name
    pub async fn variable_stars(&self) -> Result<Vec<VarStarEntry>> {
        let rows = sqlx::query_as::<_, StarRow>(
            r#"
            SELECT name, jobs, sequence
            FROM variable_stars
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VarStarEntry::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedRow {
    jid: i64,
    request_ids: String,
    done: bool,
    processed_at: String,
}

impl TryFrom<ProcessedRow> for ProcessedJob {
    type Error = crate::error::ScopeError;

    fn try_from(row: ProcessedRow) -> Result<Self> {
        let processed_at = DateTime::parse_from_rfc3339(&row.processed_at)
            .map_err(|e| crate::error::ScopeError::Internal(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        Ok(ProcessedJob {
            jid: row.jid as u64,
            request_ids: serde_json::from_str(&row.request_ids)?,
            done: row.done,
            processed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StarRow {
    name: String,
    jobs: String,
    sequence: Option<String>,
}

impl TryFrom<StarRow> for VarStarEntry {
    type Error = crate::error::ScopeError;

    fn try_from(row: StarRow) -> Result<Self> {
        Ok(VarStarEntry {
            name: row.name,
            jobs: serde_json::from_str(&row.jobs)?,
            sequence: row.sequence.as_deref().map(serde_json::from_str).transpose()?,
        })
    }
}
