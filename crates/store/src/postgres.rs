use std::collections::HashMap;

use async_trait::async_trait;
use common::MedicineId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Document, DocumentQuery, Result, StoreError, Version,
    store::{DocumentStore, PutOptions, StockChange, StockLedger, plan_adjustments},
};

/// Name of the unique index guarding order numbers.
const ORDER_NUMBER_INDEX: &str = "idx_orders_order_number";

/// PostgreSQL-backed document store and stock ledger.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            collection: row.try_get("collection")?,
            id: row.try_get("id")?,
            owner: row.try_get("owner")?,
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_write_error(document: &Document, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.constraint() == Some(ORDER_NUMBER_INDEX)
        {
            let key = document
                .state
                .get("order_number")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return StoreError::DuplicateKey {
                collection: document.collection.clone(),
                key,
            };
        }
        StoreError::Database(err)
    }

    async fn current_version(&self, collection: &str, id: &str) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(Version::new(version.unwrap_or(0)))
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn put(&self, document: Document, options: PutOptions) -> Result<Version> {
        let written: Option<i64> = match options.expected_version {
            Some(expected) if expected == Version::initial() => sqlx::query_scalar(
                r#"
                INSERT INTO documents (collection, id, owner, version, state, created_at, updated_at)
                VALUES ($1, $2, $3, 1, $4, $5, NOW())
                ON CONFLICT (collection, id) DO NOTHING
                RETURNING version
                "#,
            )
            .bind(&document.collection)
            .bind(&document.id)
            .bind(&document.owner)
            .bind(&document.state)
            .bind(document.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::map_write_error(&document, e))?,
            Some(expected) => sqlx::query_scalar(
                r#"
                UPDATE documents
                SET owner = $3, state = $4, version = version + 1, updated_at = NOW()
                WHERE collection = $1 AND id = $2 AND version = $5
                RETURNING version
                "#,
            )
            .bind(&document.collection)
            .bind(&document.id)
            .bind(&document.owner)
            .bind(&document.state)
            .bind(expected.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::map_write_error(&document, e))?,
            None => sqlx::query_scalar(
                r#"
                INSERT INTO documents (collection, id, owner, version, state, created_at, updated_at)
                VALUES ($1, $2, $3, 1, $4, $5, NOW())
                ON CONFLICT (collection, id) DO UPDATE
                SET owner = EXCLUDED.owner,
                    state = EXCLUDED.state,
                    version = documents.version + 1,
                    updated_at = NOW()
                RETURNING version
                "#,
            )
            .bind(&document.collection)
            .bind(&document.id)
            .bind(&document.owner)
            .bind(&document.state)
            .bind(document.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::map_write_error(&document, e))?,
        };

        match written {
            Some(version) => Ok(Version::new(version)),
            None => {
                let actual = self
                    .current_version(&document.collection, &document.id)
                    .await?;
                Err(StoreError::conflict(
                    document.collection,
                    document.id,
                    options.expected_version.unwrap_or(Version::initial()),
                    actual,
                ))
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, owner, version, state, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let limit = query.limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let offset = query.offset.unwrap_or(0) as i64;

        let rows = sqlx::query(
            r#"
            SELECT collection, id, owner, version, state, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND ($2::TEXT IS NULL OR owner = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&query.collection)
        .bind(&query.owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn stock_level(&self, medicine_id: &MedicineId) -> Result<Option<u32>> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM medicine_stock WHERE medicine_id = $1")
                .bind(medicine_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(stock.map(clamp_level))
    }

    async fn set_stock(&self, medicine_id: &MedicineId, quantity: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO medicine_stock (medicine_id, stock, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (medicine_id) DO UPDATE SET stock = EXCLUDED.stock, updated_at = NOW()
            "#,
        )
        .bind(medicine_id.as_str())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust(&self, medicine_id: &MedicineId, delta: i64) -> Result<u32> {
        // Check and update in one statement so concurrent callers cannot oversell.
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE medicine_stock
            SET stock = stock + $2, updated_at = NOW()
            WHERE medicine_id = $1 AND stock + $2 >= 0
            RETURNING stock
            "#,
        )
        .bind(medicine_id.as_str())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(stock) => Ok(clamp_level(stock)),
            None => match self.stock_level(medicine_id).await? {
                Some(available) => Err(StoreError::InsufficientStock {
                    medicine_id: medicine_id.clone(),
                    requested: delta.unsigned_abs(),
                    available,
                }),
                None => Err(StoreError::UnknownMedicine(medicine_id.clone())),
            },
        }
    }

    #[tracing::instrument(skip(self, changes), fields(changes = changes.len()))]
    async fn adjust_all(&self, changes: &[StockChange]) -> Result<Vec<u32>> {
        let mut tx = self.pool.begin().await?;

        // Lock the touched rows in a stable order to avoid deadlocks.
        let mut ids: Vec<&str> = changes.iter().map(|c| c.medicine_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();

        let rows = sqlx::query(
            r#"
            SELECT medicine_id, stock FROM medicine_stock
            WHERE medicine_id = ANY($1)
            ORDER BY medicine_id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut levels = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("medicine_id")?;
            let stock: i64 = row.try_get("stock")?;
            levels.insert(MedicineId::new(id), clamp_level(stock));
        }

        let (planned, results) = plan_adjustments(levels, changes)?;

        for (medicine_id, stock) in &planned {
            sqlx::query(
                "UPDATE medicine_stock SET stock = $2, updated_at = NOW() WHERE medicine_id = $1",
            )
            .bind(medicine_id.as_str())
            .bind(i64::from(*stock))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(results)
    }
}

fn clamp_level(stock: i64) -> u32 {
    u32::try_from(stock.max(0)).unwrap_or(u32::MAX)
}
