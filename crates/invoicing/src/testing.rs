//! Test doubles for the snapshot boundary.

use std::collections::HashMap;

use meterbill_core::{BillingPeriod, Category, CategoryId, ProductId, QueryId, QueryKind, Tenant, TenantId};

use crate::invoice::ProductRef;
use crate::store::{BillableFact, FactSnapshot, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Tenants,
    Categories,
    Facts,
}

/// Snapshot answering from fixed lists, ignoring the period.
#[derive(Debug, Default)]
pub struct StaticSnapshot {
    pub tenants: Vec<Tenant>,
    pub categories: Vec<Category>,
    pub facts: HashMap<(TenantId, CategoryId), Vec<BillableFact>>,
    pub fail_on: Option<FailOn>,
}

impl StaticSnapshot {
    fn fail(&self, on: FailOn, what: &str) -> Result<(), StoreError> {
        if self.fail_on == Some(on) {
            return Err(StoreError::Query(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FactSnapshot for StaticSnapshot {
    async fn tenants_for_period(&self, _period: BillingPeriod) -> Result<Vec<Tenant>, StoreError> {
        self.fail(FailOn::Tenants, "tenants")?;
        Ok(self.tenants.clone())
    }

    async fn categories_for_tenant(
        &self,
        tenant_id: TenantId,
        _period: BillingPeriod,
    ) -> Result<Vec<Category>, StoreError> {
        self.fail(FailOn::Categories, "categories")?;
        if self.facts.is_empty() {
            return Ok(self.categories.clone());
        }
        Ok(self
            .categories
            .iter()
            .filter(|c| self.facts.contains_key(&(tenant_id, c.id)))
            .cloned()
            .collect())
    }

    async fn billable_facts(
        &self,
        tenant_id: TenantId,
        category_id: CategoryId,
        _period: BillingPeriod,
    ) -> Result<Vec<BillableFact>, StoreError> {
        self.fail(FailOn::Facts, "facts")?;
        Ok(self
            .facts
            .get(&(tenant_id, category_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// Top-level fact on a fresh product.
pub fn billable(description: &str, product: &str, price: f64, discount: f64, quantity: f64) -> BillableFact {
    BillableFact {
        query_id: QueryId::new(),
        query_kind: QueryKind::TopLevel,
        description: description.to_string(),
        product: ProductRef {
            id: ProductId::new(),
            source: product.to_string(),
            target: None,
        },
        unit: "tps".to_string(),
        price_per_unit: price,
        discount,
        quantity,
    }
}
