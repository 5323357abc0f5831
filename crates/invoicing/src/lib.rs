//! Invoicing engine.
//!
//! Turns the usage facts of a calendar month into per-tenant invoices:
//!
//! 1. [`resolve_tenants`] / [`resolve_categories`] select who is invoiced,
//! 2. [`aggregate`] groups facts into priced line items,
//! 3. [`generate`] assembles invoices and their rollup totals.
//!
//! Everything reads through a [`FactSnapshot`] passed in by the caller; the
//! engine holds no state between calls and never writes.

pub mod aggregator;
pub mod error;
pub mod generator;
pub mod invoice;
pub mod resolver;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{aggregate, aggregate_facts};
pub use error::InvoicingError;
pub use generator::generate;
pub use invoice::{Invoice, InvoiceCategory, InvoiceTenant, Item, ProductRef};
pub use resolver::{resolve_categories, resolve_tenants};
pub use store::{BillableFact, FactSnapshot, StoreError};
