//! Aggregation of joined usage facts into priced line items.

use std::collections::HashMap;

use tracing::{debug, instrument};

use meterbill_core::{BillingPeriod, Category, ProductId, Tenant};

use crate::error::InvoicingError;
use crate::invoice::{Item, ProductRef};
use crate::store::{BillableFact, FactSnapshot};

/// Line items of one tenant and category in `period`.
///
/// Only facts of top-level queries are billed; subquery facts describe a
/// decomposition of their parent's usage and would be counted twice.
#[instrument(
    skip(snapshot, tenant, category),
    fields(tenant = %tenant.source, category = %category.source, period = %period),
    err
)]
pub async fn aggregate<S>(
    snapshot: &S,
    tenant: &Tenant,
    category: &Category,
    period: BillingPeriod,
) -> Result<Vec<Item>, InvoicingError>
where
    S: FactSnapshot + ?Sized,
{
    let facts = snapshot
        .billable_facts(tenant.id, category.id, period)
        .await
        .map_err(|source| InvoicingError::Items {
            tenant: tenant.source.clone(),
            category: category.source.clone(),
            period,
            source,
        })?;
    Ok(aggregate_facts(facts))
}

/// Group facts by (description, product, unit, price, discount) and reduce
/// every group to quantity statistics and a total.
///
/// Items are ordered by description, product source, unit, price and discount.
pub fn aggregate_facts(facts: impl IntoIterator<Item = BillableFact>) -> Vec<Item> {
    let mut groups: HashMap<GroupKey, Accumulator> = HashMap::new();
    let mut skipped = 0usize;

    for fact in facts {
        if !fact.query_kind.is_top_level() {
            skipped += 1;
            continue;
        }
        groups
            .entry(GroupKey::of(&fact))
            .or_insert_with(|| Accumulator::new(&fact))
            .push(fact.quantity);
    }

    if skipped > 0 {
        debug!(skipped, "ignored subquery facts");
    }

    let mut items: Vec<Item> = groups.into_values().map(Accumulator::into_item).collect();
    items.sort_by(|a, b| {
        a.description
            .cmp(&b.description)
            .then_with(|| a.product.source.cmp(&b.product.source))
            .then_with(|| a.unit.cmp(&b.unit))
            .then_with(|| a.price_per_unit.total_cmp(&b.price_per_unit))
            .then_with(|| a.discount.total_cmp(&b.discount))
            .then_with(|| a.product.id.cmp(&b.product.id))
    });
    items
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    description: String,
    product_id: ProductId,
    unit: String,
    price_bits: u64,
    discount_bits: u64,
}

impl GroupKey {
    fn of(fact: &BillableFact) -> Self {
        Self {
            description: fact.description.clone(),
            product_id: fact.product.id,
            unit: fact.unit.clone(),
            price_bits: float_key(fact.price_per_unit),
            discount_bits: float_key(fact.discount),
        }
    }
}

/// Bit pattern for grouping; `-0.0` and `0.0` land in the same group.
fn float_key(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

#[derive(Debug)]
struct Accumulator {
    description: String,
    product: ProductRef,
    unit: String,
    price_per_unit: f64,
    discount: f64,
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Accumulator {
    fn new(fact: &BillableFact) -> Self {
        Self {
            description: fact.description.clone(),
            product: fact.product.clone(),
            unit: fact.unit.clone(),
            price_per_unit: fact.price_per_unit,
            discount: fact.discount,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }

    fn push(&mut self, quantity: f64) {
        self.sum += quantity;
        self.min = self.min.min(quantity);
        self.max = self.max.max(quantity);
        self.count += 1;
    }

    fn into_item(self) -> Item {
        // Groups are only created for a pushed fact, so count >= 1.
        let avg = self.sum / self.count as f64;
        Item {
            total: Item::total_for(self.sum, self.price_per_unit, self.discount),
            description: self.description,
            product: self.product,
            quantity: self.sum,
            quantity_min: self.min,
            quantity_avg: avg,
            quantity_max: self.max,
            unit: self.unit,
            price_per_unit: self.price_per_unit,
            discount: self.discount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailOn, StaticSnapshot, billable};
    use meterbill_core::{QueryId, QueryKind};
    use proptest::prelude::*;

    #[test]
    fn sums_quantities_per_group() {
        let facts = vec![
            billable("test", "my-product", 1.0, 0.0, 40.0),
            billable("test", "my-product", 1.0, 0.0, 2.0),
        ];
        let product = facts[0].product.clone();
        let facts: Vec<_> = facts
            .into_iter()
            .map(|f| BillableFact { product: product.clone(), ..f })
            .collect();

        let items = aggregate_facts(facts);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.quantity, 42.0);
        assert_eq!(item.quantity_min, 2.0);
        assert_eq!(item.quantity_max, 40.0);
        assert_eq!(item.quantity_avg, 21.0);
        assert_eq!(item.total, 42.0);
    }

    #[test]
    fn applies_discount_to_price() {
        let items = aggregate_facts(vec![billable("cpu", "compute", 10.0, 0.3, 5.0)]);
        assert_eq!(items.len(), 1);
        assert!((items[0].total - 35.0).abs() < 1e-9);
    }

    #[test]
    fn subquery_facts_are_excluded() {
        let top = billable("test", "my-product", 1.0, 0.0, 42.0);
        let sub = BillableFact {
            query_id: QueryId::new(),
            query_kind: QueryKind::SubqueryOf(top.query_id),
            quantity: 4.0,
            ..top.clone()
        };

        let items = aggregate_facts(vec![top, sub]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 42.0);
    }

    #[test]
    fn differing_discount_never_merges() {
        let full = billable("test", "my-product", 1.0, 0.0, 10.0);
        let discounted = BillableFact {
            discount: 0.5,
            ..full.clone()
        };

        let items = aggregate_facts(vec![full, discounted]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].discount, 0.0);
        assert_eq!(items[1].discount, 0.5);
        assert_eq!(items[0].total + items[1].total, 15.0);
    }

    #[test]
    fn differing_price_never_merges() {
        let old = billable("test", "my-product", 1.0, 0.0, 10.0);
        let new = BillableFact {
            price_per_unit: 2.0,
            ..old.clone()
        };

        let items = aggregate_facts(vec![new, old]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price_per_unit, 1.0);
        assert_eq!(items[1].price_per_unit, 2.0);
    }

    #[test]
    fn items_are_ordered_by_description_then_product() {
        let items = aggregate_facts(vec![
            billable("memory", "b-product", 1.0, 0.0, 1.0),
            billable("cpu", "z-product", 1.0, 0.0, 1.0),
            billable("memory", "a-product", 1.0, 0.0, 1.0),
        ]);
        let order: Vec<_> = items
            .iter()
            .map(|i| (i.description.as_str(), i.product.source.as_str()))
            .collect();
        assert_eq!(
            order,
            [("cpu", "z-product"), ("memory", "a-product"), ("memory", "b-product")]
        );
    }

    #[test]
    fn no_facts_yields_no_items() {
        assert!(aggregate_facts(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn store_failure_names_tenant_category_and_period() {
        let snapshot = StaticSnapshot {
            fail_on: Some(FailOn::Facts),
            ..Default::default()
        };
        let period = BillingPeriod::new(2022, 3).unwrap();

        let err = aggregate(&snapshot, &Tenant::new("my-tenant"), &Category::new("my-namespace"), period)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to load items for \"my-tenant\"/\"my-namespace\" at 2022 March: query failed: facts unavailable"
        );
    }

    fn arb_fact(products: Vec<ProductRef>) -> impl Strategy<Value = BillableFact> {
        (
            prop::sample::select(vec!["cpu", "memory", "storage"]),
            prop::sample::select(products),
            prop::sample::select(vec![0.5f64, 1.0, 7.25]),
            prop::sample::select(vec![0.0f64, 0.1, 0.3]),
            0.0f64..10_000.0,
            any::<bool>(),
        )
            .prop_map(|(description, product, price, discount, quantity, top_level)| {
                let query_kind = if top_level {
                    QueryKind::TopLevel
                } else {
                    QueryKind::SubqueryOf(QueryId::new())
                };
                BillableFact {
                    query_id: QueryId::new(),
                    query_kind,
                    description: description.to_string(),
                    product,
                    unit: "MiB".to_string(),
                    price_per_unit: price,
                    discount,
                    quantity,
                }
            })
    }

    fn product_pool() -> Vec<ProductRef> {
        ["a-product", "b-product"]
            .iter()
            .map(|source| ProductRef {
                id: ProductId::new(),
                source: source.to_string(),
                target: None,
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: items account for exactly the top-level quantity, and every
        /// item total follows the pricing formula.
        #[test]
        fn items_conserve_top_level_quantity(
            facts in prop::collection::vec(arb_fact(product_pool()), 0..40)
        ) {
            let expected: f64 = facts
                .iter()
                .filter(|f| f.query_kind.is_top_level())
                .map(|f| f.quantity)
                .sum();

            let items = aggregate_facts(facts);
            let billed: f64 = items.iter().map(|i| i.quantity).sum();
            prop_assert!((billed - expected).abs() <= 1e-6 * expected.max(1.0));

            for item in &items {
                let formula = item.quantity * item.price_per_unit * (1.0 - item.discount);
                prop_assert!((item.total - formula).abs() <= 1e-9 * formula.max(1.0));
                prop_assert!(item.quantity_min <= item.quantity_avg + 1e-9);
                prop_assert!(item.quantity_avg <= item.quantity_max + 1e-9);
            }
        }
    }
}
