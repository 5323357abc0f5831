//! `meterbill-core`: domain building blocks for usage billing.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod dimension;
pub mod entity;
pub mod error;
pub mod id;
pub mod period;

pub use dimension::{Category, Discount, Fact, Product, Query, QueryKind, Tenant, Validity};
pub use entity::{Entity, Named};
pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, DiscountId, ProductId, QueryId, TenantId};
pub use period::BillingPeriod;
