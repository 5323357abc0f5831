//! Read boundary towards the fact store.
//!
//! The engine never talks to a database directly. It reads through a
//! [`FactSnapshot`]: a consistent, read-only view of the store that lives for
//! one generation call and is passed explicitly to every component.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use meterbill_core::{BillingPeriod, Category, CategoryId, QueryId, QueryKind, Tenant, TenantId};

use crate::invoice::ProductRef;

/// A fact joined to its query, product, discount and time dimensions.
///
/// Price and discount are the values the store resolved for the fact's
/// timestamp; the engine does no validity-interval logic of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillableFact {
    pub query_id: QueryId,
    pub query_kind: QueryKind,
    pub description: String,
    pub product: ProductRef,
    pub unit: String,
    pub price_per_unit: f64,
    pub discount: f64,
    pub quantity: f64,
}

/// Fact store read failure.
///
/// These are infrastructure errors; the engine wraps them with the tenant,
/// category and period that was being read.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

/// Read-only snapshot of the fact store.
///
/// Implementations must answer every call from the same consistent state
/// (one read transaction, or an immutable copy).
///
/// Facts whose query, product or discount rows cannot be resolved are left
/// out of `billable_facts` (inner-join semantics). Operators are expected to
/// run the data-completeness check before invoicing.
#[async_trait::async_trait]
pub trait FactSnapshot: Send + Sync {
    /// Tenants with at least one fact in `period`.
    async fn tenants_for_period(&self, period: BillingPeriod) -> Result<Vec<Tenant>, StoreError>;

    /// Categories with at least one fact of `tenant_id` in `period`.
    async fn categories_for_tenant(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<Vec<Category>, StoreError>;

    /// Joined facts of one tenant and category in `period`, in a stable order.
    async fn billable_facts(
        &self,
        tenant_id: TenantId,
        category_id: CategoryId,
        period: BillingPeriod,
    ) -> Result<Vec<BillableFact>, StoreError>;
}

#[async_trait::async_trait]
impl<S> FactSnapshot for Arc<S>
where
    S: FactSnapshot + ?Sized,
{
    async fn tenants_for_period(&self, period: BillingPeriod) -> Result<Vec<Tenant>, StoreError> {
        (**self).tenants_for_period(period).await
    }

    async fn categories_for_tenant(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<Vec<Category>, StoreError> {
        (**self).categories_for_tenant(tenant_id, period).await
    }

    async fn billable_facts(
        &self,
        tenant_id: TenantId,
        category_id: CategoryId,
        period: BillingPeriod,
    ) -> Result<Vec<BillableFact>, StoreError> {
        (**self).billable_facts(tenant_id, category_id, period).await
    }
}
