//! Period resolution: which tenants and categories a month is invoiced for.

use std::collections::HashSet;

use tracing::instrument;

use meterbill_core::{BillingPeriod, Category, Named, Tenant};

use crate::error::InvoicingError;
use crate::store::FactSnapshot;

/// Tenants with at least one fact in `period`, ordered by source name.
#[instrument(skip(snapshot), fields(period = %period), err)]
pub async fn resolve_tenants<S>(snapshot: &S, period: BillingPeriod) -> Result<Vec<Tenant>, InvoicingError>
where
    S: FactSnapshot + ?Sized,
{
    let tenants = snapshot
        .tenants_for_period(period)
        .await
        .map_err(|source| InvoicingError::Tenants { period, source })?;
    Ok(ordered_by_source(tenants))
}

/// Categories with at least one fact of `tenant` in `period`, ordered by source name.
#[instrument(skip(snapshot, tenant), fields(tenant = %tenant.source, period = %period), err)]
pub async fn resolve_categories<S>(
    snapshot: &S,
    tenant: &Tenant,
    period: BillingPeriod,
) -> Result<Vec<Category>, InvoicingError>
where
    S: FactSnapshot + ?Sized,
{
    let categories = snapshot
        .categories_for_tenant(tenant.id, period)
        .await
        .map_err(|source| InvoicingError::Categories {
            tenant: tenant.source.clone(),
            period,
            source,
        })?;
    Ok(ordered_by_source(categories))
}

/// Drop repeated ids and sort by source name (stable for equal names).
fn ordered_by_source<T: Named>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut rows: Vec<T> = rows
        .into_iter()
        .filter(|row| seen.insert(row.id().clone()))
        .collect();
    rows.sort_by(|a, b| a.source().cmp(b.source()));
    rows
}
