use thiserror::Error;

use meterbill_core::BillingPeriod;

use crate::store::StoreError;

/// Invoice generation failure, carrying the context of the failed read.
#[derive(Debug, Error)]
pub enum InvoicingError {
    #[error("failed to load tenants for {period}: {source}")]
    Tenants {
        period: BillingPeriod,
        source: StoreError,
    },

    #[error("failed to load categories for {tenant:?} at {period}: {source}")]
    Categories {
        tenant: String,
        period: BillingPeriod,
        source: StoreError,
    },

    #[error("failed to load items for {tenant:?}/{category:?} at {period}: {source}")]
    Items {
        tenant: String,
        category: String,
        period: BillingPeriod,
        source: StoreError,
    },
}
