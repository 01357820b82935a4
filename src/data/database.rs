//! SQLite triple store
//!
//! All persistent graph access goes through this module.
//! Uses SQLx with embedded migrations.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};

use super::triple::{TripleStore, TypedRdfTriple};
use crate::error::AppError;
use crate::metrics::{TRIPLE_OPERATIONS_TOTAL, observe_db_query};

/// Row shape of the `triples` table
#[derive(Debug, sqlx::FromRow)]
struct TripleRow {
    subject: String,
    predicate: String,
    object: String,
    object_type: String,
}

impl From<TripleRow> for TypedRdfTriple {
    fn from(row: TripleRow) -> Self {
        Self {
            subject: Some(row.subject),
            predicate: Some(row.predicate),
            object: Some(row.object),
            object_type: (!row.object_type.is_empty()).then_some(row.object_type),
        }
    }
}

/// Columns of a fully specified triple; untyped objects use `''`
fn columns(triple: &TypedRdfTriple) -> Result<(&str, &str, &str, &str), AppError> {
    let (subject, predicate, object) = triple.parts()?;
    Ok((
        subject,
        predicate,
        object,
        triple.object_type().unwrap_or(""),
    ))
}

/// [`TripleStore`] over a SQLite connection pool
pub struct SqliteTripleStore {
    pool: Pool<Sqlite>,
}

impl SqliteTripleStore {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Triple store connected and migrated successfully");
        Ok(Self { pool })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Number of stored triples
    pub async fn count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM triples")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

const INSERT_TRIPLE: &str = r#"
    INSERT OR IGNORE INTO triples (subject, predicate, object, object_type)
    VALUES (?, ?, ?, ?)
"#;

const DELETE_TRIPLE: &str = r#"
    DELETE FROM triples
    WHERE subject = ? AND predicate = ? AND object = ? AND object_type = ?
"#;

#[async_trait]
impl TripleStore for SqliteTripleStore {
    async fn store_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError> {
        let (subject, predicate, object, object_type) = columns(triple)?;
        let started = Instant::now();

        sqlx::query(INSERT_TRIPLE)
            .bind(subject)
            .bind(predicate)
            .bind(object)
            .bind(object_type)
            .execute(&self.pool)
            .await?;

        observe_db_query("store", started.elapsed());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["store", "sqlite"])
            .inc();
        Ok(())
    }

    async fn delete_triple(&self, triple: &TypedRdfTriple) -> Result<(), AppError> {
        let (subject, predicate, object, object_type) = columns(triple)?;
        let started = Instant::now();

        sqlx::query(DELETE_TRIPLE)
            .bind(subject)
            .bind(predicate)
            .bind(object)
            .bind(object_type)
            .execute(&self.pool)
            .await?;

        observe_db_query("delete", started.elapsed());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["delete", "sqlite"])
            .inc();
        Ok(())
    }

    async fn select(&self, pattern: &TypedRdfTriple) -> Result<Vec<TypedRdfTriple>, AppError> {
        let started = Instant::now();
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT subject, predicate, object, object_type FROM triples WHERE 1 = 1",
        );

        for (column, value) in [
            ("subject", pattern.subject.as_deref()),
            ("predicate", pattern.predicate.as_deref()),
            ("object", pattern.object.as_deref()),
            ("object_type", pattern.object_type()),
        ] {
            if let Some(value) = value {
                query
                    .push(format!(" AND {} = ", column))
                    .push_bind(value.to_string());
            }
        }

        let rows = query
            .build_query_as::<TripleRow>()
            .fetch_all(&self.pool)
            .await?;

        observe_db_query("select", started.elapsed());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["select", "sqlite"])
            .inc();
        Ok(rows.into_iter().map(TypedRdfTriple::from).collect())
    }

    /// Batch insert in one transaction
    async fn store_triples(&self, triples: &[TypedRdfTriple]) -> Result<(), AppError> {
        let rows = triples
            .iter()
            .map(columns)
            .collect::<Result<Vec<_>, _>>()?;
        let started = Instant::now();

        let mut tx = self.pool.begin().await?;
        for (subject, predicate, object, object_type) in rows {
            sqlx::query(INSERT_TRIPLE)
                .bind(subject)
                .bind(predicate)
                .bind(object)
                .bind(object_type)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        observe_db_query("store_batch", started.elapsed());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["store_batch", "sqlite"])
            .inc();
        Ok(())
    }

    /// Batch delete in one transaction
    async fn delete_triples(&self, triples: &[TypedRdfTriple]) -> Result<(), AppError> {
        let rows = triples
            .iter()
            .map(columns)
            .collect::<Result<Vec<_>, _>>()?;
        let started = Instant::now();

        let mut tx = self.pool.begin().await?;
        for (subject, predicate, object, object_type) in rows {
            sqlx::query(DELETE_TRIPLE)
                .bind(subject)
                .bind(predicate)
                .bind(object)
                .bind(object_type)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        observe_db_query("delete_batch", started.elapsed());
        TRIPLE_OPERATIONS_TOTAL
            .with_label_values(&["delete_batch", "sqlite"])
            .inc();
        Ok(())
    }
}
