//! Fact and dimension rows as read from the fact store.
//!
//! All types here are immutable snapshots: the invoicing engine reads them and
//! never writes them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Named};
use crate::error::{DomainError, DomainResult};
use crate::id::{CategoryId, DiscountId, ProductId, QueryId, TenantId};

/// Half-open validity interval `[from, until)`; a missing bound is unbounded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Validity {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl Validity {
    /// Valid at every point in time.
    pub fn infinite() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> DomainResult<Self> {
        if until <= from {
            return Err(DomainError::validation(format!(
                "validity interval is empty ({from} .. {until})"
            )));
        }
        Ok(Self {
            from: Some(from),
            until: Some(until),
        })
    }

    pub fn starting(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }

    /// Interval containment: `from <= at < until`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| from <= at) && self.until.is_none_or(|until| at < until)
    }

    /// Whether both intervals share at least one instant.
    pub fn overlaps(&self, other: &Validity) -> bool {
        let starts_before = |from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>| match (from, until) {
            (Some(from), Some(until)) => from < until,
            _ => true,
        };
        starts_before(self.from, other.until) && starts_before(other.from, self.until)
    }
}

/// Tenant: the party an invoice is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub source: String,
    pub target: Option<String>,
}

impl Tenant {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            source: source.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Category: namespace-like cost-attribution unit inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub source: String,
    pub target: Option<String>,
}

impl Category {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            source: source.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Position of a query in the two-level query tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parent", rename_all = "snake_case")]
pub enum QueryKind {
    /// Billed directly.
    TopLevel,
    /// Decomposition of the parent query; never billed on its own.
    SubqueryOf(QueryId),
}

impl QueryKind {
    pub fn is_top_level(&self) -> bool {
        matches!(self, QueryKind::TopLevel)
    }
}

/// Usage query whose results populate facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub name: String,
    pub description: String,
    pub display_name: String,
    pub unit: String,
    pub kind: QueryKind,
    pub validity: Validity,
}

impl Query {
    pub fn top_level(name: impl Into<String>, description: impl Into<String>, unit: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: QueryId::new(),
            display_name: name.clone(),
            name,
            description: description.into(),
            unit: unit.into(),
            kind: QueryKind::TopLevel,
            validity: Validity::infinite(),
        }
    }

    pub fn subquery_of(
        parent: &Query,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            kind: QueryKind::SubqueryOf(parent.id),
            ..Self::top_level(name, description, unit)
        }
    }
}

/// Priced product: `amount` is the price per `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub source: String,
    pub target: Option<String>,
    pub unit: String,
    pub amount: f64,
    pub validity: Validity,
}

impl Product {
    pub fn new(source: impl Into<String>, unit: impl Into<String>, amount: f64) -> DomainResult<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DomainError::validation(format!(
                "product amount must be a non-negative number, got {amount}"
            )));
        }
        Ok(Self {
            id: ProductId::new(),
            source: source.into(),
            target: None,
            unit: unit.into(),
            amount,
            validity: Validity::infinite(),
        })
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn valid(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }
}

/// Discount fraction: `0.3` bills 70% of the price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub source: String,
    pub discount: f64,
    pub validity: Validity,
}

impl Discount {
    pub fn new(source: impl Into<String>, discount: f64) -> DomainResult<Self> {
        if !(0.0..1.0).contains(&discount) {
            return Err(DomainError::validation(format!(
                "discount must be within [0, 1), got {discount}"
            )));
        }
        Ok(Self {
            id: DiscountId::new(),
            source: source.into(),
            discount,
            validity: Validity::infinite(),
        })
    }

    pub fn valid(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }
}

/// One atomic usage measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub query_id: QueryId,
    pub product_id: ProductId,
    pub discount_id: DiscountId,
    /// Start of the hour bucket the measurement belongs to.
    pub timestamp: DateTime<Utc>,
    pub quantity: f64,
}

impl Fact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        category_id: CategoryId,
        query_id: QueryId,
        product_id: ProductId,
        discount_id: DiscountId,
        timestamp: DateTime<Utc>,
        quantity: f64,
    ) -> DomainResult<Self> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(DomainError::invariant(format!(
                "fact quantity must be non-negative, got {quantity}"
            )));
        }
        Ok(Self {
            tenant_id,
            category_id,
            query_id,
            product_id,
            discount_id,
            timestamp,
            quantity,
        })
    }
}

macro_rules! impl_named {
    ($t:ty, $id:ty) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }

        impl Named for $t {
            fn source(&self) -> &str {
                &self.source
            }

            fn target(&self) -> Option<&str> {
                self.target.as_deref()
            }
        }
    };
}

impl_named!(Tenant, TenantId);
impl_named!(Category, CategoryId);
impl_named!(Product, ProductId);

impl Entity for Query {
    type Id = QueryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Discount {
    type Id = DiscountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
