//! In-memory fact store.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::warn;

use meterbill_core::{
    BillingPeriod, Category, CategoryId, Discount, DiscountId, Fact, Product, ProductId, Query, QueryId,
    Tenant, TenantId,
};
use meterbill_invoicing::{BillableFact, FactSnapshot, ProductRef, StoreError};

use crate::check::{Missing, find_missing};

#[derive(Debug, Default, Clone)]
struct Tables {
    tenants: HashMap<TenantId, Tenant>,
    categories: HashMap<CategoryId, Category>,
    queries: HashMap<QueryId, Query>,
    products: HashMap<ProductId, Product>,
    discounts: HashMap<DiscountId, Discount>,
    facts: Vec<Fact>,
}

/// Dimension tables plus an append-only fact log, held in memory.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    tables: RwLock<Tables>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Connection("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Connection("lock poisoned".to_string()))
    }

    pub fn upsert_tenant(&self, tenant: Tenant) -> Result<(), StoreError> {
        self.write()?.tenants.insert(tenant.id, tenant);
        Ok(())
    }

    pub fn upsert_category(&self, category: Category) -> Result<(), StoreError> {
        self.write()?.categories.insert(category.id, category);
        Ok(())
    }

    pub fn upsert_query(&self, query: Query) -> Result<(), StoreError> {
        self.write()?.queries.insert(query.id, query);
        Ok(())
    }

    /// Insert or replace a product row. Rows sharing a source must not have
    /// overlapping validities, so at most one price applies at any instant.
    pub fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let overlapping = tables.products.values().any(|p| {
            p.id != product.id && p.source == product.source && p.validity.overlaps(&product.validity)
        });
        if overlapping {
            return Err(StoreError::Query(format!(
                "product {:?} overlaps the validity of an existing row",
                product.source
            )));
        }
        tables.products.insert(product.id, product);
        Ok(())
    }

    /// Insert or replace a discount row, with the same non-overlap rule as products.
    pub fn upsert_discount(&self, discount: Discount) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let overlapping = tables.discounts.values().any(|d| {
            d.id != discount.id && d.source == discount.source && d.validity.overlaps(&discount.validity)
        });
        if overlapping {
            return Err(StoreError::Query(format!(
                "discount {:?} overlaps the validity of an existing row",
                discount.source
            )));
        }
        tables.discounts.insert(discount.id, discount);
        Ok(())
    }

    /// Append a fact. Dimension references are not checked here; dangling
    /// ones are dropped when facts are joined.
    pub fn append_fact(&self, fact: Fact) -> Result<(), StoreError> {
        self.write()?.facts.push(fact);
        Ok(())
    }

    /// The product row named `source` whose validity contains `at`.
    pub fn product_active_at(&self, source: &str, at: DateTime<Utc>) -> Result<Option<Product>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .products
            .values()
            .find(|p| p.source == source && p.validity.contains(at))
            .cloned())
    }

    /// The discount row named `source` whose validity contains `at`.
    pub fn discount_active_at(&self, source: &str, at: DateTime<Utc>) -> Result<Option<Discount>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .discounts
            .values()
            .find(|d| d.source == source && d.validity.contains(at))
            .cloned())
    }

    /// Dimension rows lacking a field required for invoicing.
    pub fn missing_fields(&self) -> Result<Vec<Missing>, StoreError> {
        let tables = self.read()?;
        let tenants: Vec<_> = tables.tenants.values().cloned().collect();
        let categories: Vec<_> = tables.categories.values().cloned().collect();
        let products: Vec<_> = tables.products.values().cloned().collect();
        Ok(find_missing(&tenants, &categories, &products))
    }

    /// Immutable copy of the current state; later writes do not affect it.
    pub fn snapshot(&self) -> Result<InMemorySnapshot, StoreError> {
        Ok(InMemorySnapshot {
            tables: Arc::new(self.read()?.clone()),
        })
    }
}

/// Point-in-time view of an [`InMemoryFactStore`].
#[derive(Debug, Clone)]
pub struct InMemorySnapshot {
    tables: Arc<Tables>,
}

impl InMemorySnapshot {
    fn facts_in(&self, period: BillingPeriod) -> impl Iterator<Item = &Fact> {
        self.tables
            .facts
            .iter()
            .filter(move |f| period.contains(f.timestamp))
    }
}

/// Resolve ids against a table, keeping first-seen order, dropping unknown ids.
fn join_ordered<'a, K, V>(ids: impl Iterator<Item = K>, table: &'a HashMap<K, V>) -> Vec<&'a V>
where
    K: Eq + std::hash::Hash + Copy,
{
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id))
        .filter_map(|id| table.get(&id))
        .collect()
}

#[async_trait::async_trait]
impl FactSnapshot for InMemorySnapshot {
    async fn tenants_for_period(&self, period: BillingPeriod) -> Result<Vec<Tenant>, StoreError> {
        let tenants = join_ordered(self.facts_in(period).map(|f| f.tenant_id), &self.tables.tenants);
        let by_source: BTreeMap<_, _> = tenants
            .into_iter()
            .map(|t| ((t.source.clone(), t.id), t.clone()))
            .collect();
        Ok(by_source.into_values().collect())
    }

    async fn categories_for_tenant(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<Vec<Category>, StoreError> {
        let ids = self
            .facts_in(period)
            .filter(|f| f.tenant_id == tenant_id)
            .map(|f| f.category_id);
        let categories = join_ordered(ids, &self.tables.categories);
        let by_source: BTreeMap<_, _> = categories
            .into_iter()
            .map(|c| ((c.source.clone(), c.id), c.clone()))
            .collect();
        Ok(by_source.into_values().collect())
    }

    async fn billable_facts(
        &self,
        tenant_id: TenantId,
        category_id: CategoryId,
        period: BillingPeriod,
    ) -> Result<Vec<BillableFact>, StoreError> {
        let mut dropped = 0usize;
        let mut joined = Vec::new();

        for fact in self
            .facts_in(period)
            .filter(|f| f.tenant_id == tenant_id && f.category_id == category_id)
        {
            let t = &self.tables;
            match (
                t.queries.get(&fact.query_id),
                t.products.get(&fact.product_id),
                t.discounts.get(&fact.discount_id),
            ) {
                (Some(query), Some(product), Some(discount)) => joined.push(BillableFact {
                    query_id: query.id,
                    query_kind: query.kind,
                    description: query.description.clone(),
                    product: ProductRef {
                        id: product.id,
                        source: product.source.clone(),
                        target: product.target.clone(),
                    },
                    unit: product.unit.clone(),
                    price_per_unit: product.amount,
                    discount: discount.discount,
                    quantity: fact.quantity,
                }),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            warn!(
                %tenant_id,
                %category_id,
                %period,
                dropped,
                "facts with unresolved query, product or discount left out"
            );
        }
        Ok(joined)
    }
}
