//! Postgres-backed fact store.
//!
//! Every invoice generation reads through one [`PostgresSnapshot`]: a
//! `REPEATABLE READ, READ ONLY` transaction, so all tenant, category and fact
//! queries of a period observe the same state.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | `Connection` |
//! | ColumnDecode / ColumnNotFound / Decode | `Decode` |
//! | Other | `Query` |

use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::{Span, instrument};

use meterbill_core::{BillingPeriod, Category, CategoryId, ProductId, QueryId, QueryKind, Tenant, TenantId};
use meterbill_invoicing::{BillableFact, FactSnapshot, ProductRef, StoreError};

use crate::check::{DimensionTable, Missing, MissingField};

/// Postgres fact store; hands out read-only snapshots.
#[derive(Debug, Clone)]
pub struct PostgresFactStore {
    pool: PgPool,
}

impl PostgresFactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a read-only, repeatable-read transaction.
    #[instrument(skip(self), err)]
    pub async fn snapshot(&self) -> Result<PostgresSnapshot, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_transaction", e))?;

        Ok(PostgresSnapshot { tx: Mutex::new(tx) })
    }
}

/// One read-only transaction against the fact store.
///
/// Queries are serialized on the transaction's connection.
pub struct PostgresSnapshot {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PostgresSnapshot {
    /// End the transaction. Nothing was written, so it is rolled back.
    pub async fn close(self) -> Result<(), StoreError> {
        self.tx
            .into_inner()
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }

    /// Dimension rows lacking a field required for invoicing.
    #[instrument(skip(self), err)]
    pub async fn missing_fields(&self) -> Result<Vec<Missing>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(
            r#"
            SELECT 'categories' AS dimension, id, source, 'target' AS field FROM categories WHERE target IS NULL OR target = ''
            UNION ALL
            SELECT 'tenants', id, source, 'target' FROM tenants WHERE target IS NULL OR target = ''
            UNION ALL
            SELECT 'products', id, source, 'target' FROM products WHERE target IS NULL OR target = ''
            UNION ALL
            SELECT 'products', id, source, 'amount' FROM products WHERE amount = 0
            UNION ALL
            SELECT 'products', id, source, 'unit' FROM products WHERE unit IS NULL OR btrim(unit) = ''
            "#,
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("missing_fields", e))?;

        let mut missing = rows
            .iter()
            .map(|row| -> Result<Missing, sqlx::Error> {
                let dimension: String = row.try_get("dimension")?;
                let field: String = row.try_get("field")?;
                let table = DimensionTable::parse(&dimension)
                    .ok_or_else(|| sqlx::Error::Decode(format!("unknown table {dimension}").into()))?;
                let field = MissingField::parse(&field)
                    .ok_or_else(|| sqlx::Error::Decode(format!("unknown field {field}").into()))?;
                Ok(Missing {
                    table,
                    id: row.try_get("id")?,
                    source: row.try_get("source")?,
                    field,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("missing_fields", e))?;

        missing.sort_by(|a, b| {
            a.table
                .cmp(&b.table)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.field.cmp(&b.field))
        });
        Ok(missing)
    }
}

#[async_trait::async_trait]
impl FactSnapshot for PostgresSnapshot {
    #[instrument(skip(self), fields(period = %period, tenant_count = tracing::field::Empty), err)]
    async fn tenants_for_period(&self, period: BillingPeriod) -> Result<Vec<Tenant>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT tenants.id, tenants.source, tenants.target
            FROM tenants
                INNER JOIN facts ON (facts.tenant_id = tenants.id)
                INNER JOIN date_times ON (facts.date_time_id = date_times.id)
            WHERE date_times.year = $1 AND date_times.month = $2
            ORDER BY tenants.source, tenants.id
            "#,
        )
        .bind(period.year())
        .bind(period.month() as i32)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("tenants_for_period", e))?;

        let tenants = rows
            .iter()
            .map(|row| -> Result<Tenant, sqlx::Error> {
                Ok(Tenant {
                    id: TenantId::from_uuid(row.try_get("id")?),
                    source: row.try_get("source")?,
                    target: row.try_get("target")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("tenants_for_period", e))?;

        Span::current().record("tenant_count", tenants.len());
        Ok(tenants)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    async fn categories_for_tenant(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<Vec<Category>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT categories.id, categories.source, categories.target
            FROM categories
                INNER JOIN facts ON (facts.category_id = categories.id)
                INNER JOIN date_times ON (facts.date_time_id = date_times.id)
            WHERE date_times.year = $1 AND date_times.month = $2
                AND facts.tenant_id = $3
            ORDER BY categories.source, categories.id
            "#,
        )
        .bind(period.year())
        .bind(period.month() as i32)
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("categories_for_tenant", e))?;

        rows.iter()
            .map(|row| -> Result<Category, sqlx::Error> {
                Ok(Category {
                    id: CategoryId::from_uuid(row.try_get("id")?),
                    source: row.try_get("source")?,
                    target: row.try_get("target")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("categories_for_tenant", e))
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, category_id = %category_id, period = %period),
        err
    )]
    async fn billable_facts(
        &self,
        tenant_id: TenantId,
        category_id: CategoryId,
        period: BillingPeriod,
    ) -> Result<Vec<BillableFact>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query(
            r#"
            SELECT
                queries.id AS query_id,
                queries.parent_id AS query_parent_id,
                queries.description,
                products.id AS product_id,
                products.source AS product_source,
                products.target AS product_target,
                products.unit,
                products.amount,
                discounts.discount,
                facts.quantity
            FROM facts
                INNER JOIN queries    ON (facts.query_id = queries.id)
                INNER JOIN products   ON (facts.product_id = products.id)
                INNER JOIN discounts  ON (facts.discount_id = discounts.id)
                INNER JOIN date_times ON (facts.date_time_id = date_times.id)
            WHERE date_times.year = $1 AND date_times.month = $2
                AND facts.tenant_id = $3
                AND facts.category_id = $4
            ORDER BY date_times.timestamp, facts.id
            "#,
        )
        .bind(period.year())
        .bind(period.month() as i32)
        .bind(tenant_id.as_uuid())
        .bind(category_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("billable_facts", e))?;

        let facts = rows
            .iter()
            .map(BillableFactRow::from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("billable_facts", e))?;

        Ok(facts.into_iter().map(Into::into).collect())
    }
}

// SQLx row types

#[derive(Debug)]
struct BillableFactRow {
    query_id: uuid::Uuid,
    query_parent_id: Option<uuid::Uuid>,
    description: String,
    product_id: uuid::Uuid,
    product_source: String,
    product_target: Option<String>,
    unit: String,
    amount: f64,
    discount: f64,
    quantity: f64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BillableFactRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(BillableFactRow {
            query_id: row.try_get("query_id")?,
            query_parent_id: row.try_get("query_parent_id")?,
            description: row.try_get("description")?,
            product_id: row.try_get("product_id")?,
            product_source: row.try_get("product_source")?,
            product_target: row.try_get("product_target")?,
            unit: row.try_get("unit")?,
            amount: row.try_get("amount")?,
            discount: row.try_get("discount")?,
            quantity: row.try_get("quantity")?,
        })
    }
}

impl From<BillableFactRow> for BillableFact {
    fn from(row: BillableFactRow) -> Self {
        let query_kind = match row.query_parent_id {
            Some(parent) => QueryKind::SubqueryOf(QueryId::from_uuid(parent)),
            None => QueryKind::TopLevel,
        };
        BillableFact {
            query_id: QueryId::from_uuid(row.query_id),
            query_kind,
            description: row.description,
            product: ProductRef {
                id: ProductId::from_uuid(row.product_id),
                source: row.product_source,
                target: row.product_target,
            },
            unit: row.unit,
            price_per_unit: row.amount,
            discount: row.discount,
            quantity: row.quantity,
        }
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Query(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring connection in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {}: {}", operation, e)),
        sqlx::Error::ColumnNotFound(column) => {
            StoreError::Decode(format!("column {} not found in {}", column, operation))
        }
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            StoreError::Decode(format!("{} in {}", e, operation))
        }
        _ => StoreError::Query(format!("sqlx error in {}: {}", operation, err)),
    }
}
