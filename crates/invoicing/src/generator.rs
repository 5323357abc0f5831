//! Invoice assembly: tenants → categories → items, with rollup totals.

use tracing::{debug, info, instrument};

use meterbill_core::{BillingPeriod, Tenant};

use crate::aggregator::aggregate;
use crate::error::InvoicingError;
use crate::invoice::{Invoice, InvoiceCategory};
use crate::resolver::{resolve_categories, resolve_tenants};
use crate::store::FactSnapshot;

/// Generate the invoices of every tenant with usage in `period`.
///
/// No data is written; `snapshot` may be a read-only transaction. Invoices are
/// ordered by tenant source name. Any failed read aborts the whole call: there
/// are no partial results, callers retry the full period.
#[instrument(skip(snapshot), fields(period = %period), err)]
pub async fn generate<S>(snapshot: &S, period: BillingPeriod) -> Result<Vec<Invoice>, InvoicingError>
where
    S: FactSnapshot + ?Sized,
{
    let tenants = resolve_tenants(snapshot, period).await?;

    let mut invoices = Vec::with_capacity(tenants.len());
    for tenant in &tenants {
        invoices.push(invoice_for_tenant(snapshot, tenant, period).await?);
    }

    info!(invoices = invoices.len(), "generated invoices");
    Ok(invoices)
}

async fn invoice_for_tenant<S>(
    snapshot: &S,
    tenant: &Tenant,
    period: BillingPeriod,
) -> Result<Invoice, InvoicingError>
where
    S: FactSnapshot + ?Sized,
{
    let categories = resolve_categories(snapshot, tenant, period).await?;

    let mut sections = Vec::with_capacity(categories.len());
    for category in &categories {
        let items = aggregate(snapshot, tenant, category, period).await?;
        debug!(
            tenant = %tenant.source,
            category = %category.source,
            items = items.len(),
            "aggregated category"
        );
        sections.push(InvoiceCategory::new(category, items));
    }

    Ok(Invoice::new(tenant, period, sections))
}
