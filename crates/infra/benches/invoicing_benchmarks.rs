use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use meterbill_core::{BillingPeriod, Category, Discount, Fact, Product, Query, Tenant};
use meterbill_infra::memory::InMemoryFactStore;
use meterbill_invoicing::{BillableFact, ProductRef, aggregate_facts, generate};

/// One fact per hour of March 2022 for each tenant, spread over a handful of products.
fn seeded_store(tenants: usize) -> InMemoryFactStore {
    let store = InMemoryFactStore::new();
    let category = Category::new("my-namespace").with_target("ns-1");
    let query = Query::top_level("test", "test description", "tps");
    let discount = Discount::new("default", 0.0).unwrap();
    let products: Vec<_> = (0..4)
        .map(|i| Product::new(format!("product-{i}"), "tps", 0.25 * (i + 1) as f64).unwrap())
        .collect();

    store.upsert_category(category.clone()).unwrap();
    store.upsert_query(query.clone()).unwrap();
    store.upsert_discount(discount.clone()).unwrap();
    for product in &products {
        store.upsert_product(product.clone()).unwrap();
    }

    let start = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
    for t in 0..tenants {
        let tenant = Tenant::new(format!("tenant-{t:04}")).with_target(t.to_string());
        store.upsert_tenant(tenant.clone()).unwrap();
        for hour in 0..31 * 24 {
            let product = &products[hour % products.len()];
            let fact = Fact::new(
                tenant.id,
                category.id,
                query.id,
                product.id,
                discount.id,
                start + Duration::hours(hour as i64),
                (hour % 17) as f64,
            )
            .unwrap();
            store.append_fact(fact).unwrap();
        }
    }
    store
}

fn bench_aggregate_facts(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_facts");

    for &count in &[1_000usize, 10_000, 100_000] {
        let products: Vec<_> = (0..8)
            .map(|i| ProductRef {
                id: meterbill_core::ProductId::new(),
                source: format!("product-{i}"),
                target: None,
            })
            .collect();
        let facts: Vec<BillableFact> = (0..count)
            .map(|i| BillableFact {
                query_id: meterbill_core::QueryId::new(),
                query_kind: meterbill_core::QueryKind::TopLevel,
                description: format!("query-{}", i % 5),
                product: products[i % products.len()].clone(),
                unit: "tps".to_string(),
                price_per_unit: 1.0,
                discount: 0.0,
                quantity: (i % 13) as f64,
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &facts, |b, facts| {
            b.iter(|| black_box(aggregate_facts(facts.iter().cloned())));
        });
    }

    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_month");
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let period = BillingPeriod::new(2022, 3).unwrap();

    for &tenants in &[1usize, 10, 50] {
        let store = seeded_store(tenants);
        group.throughput(Throughput::Elements(tenants as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tenants), &store, |b, store| {
            b.iter(|| {
                let snapshot = store.snapshot().unwrap();
                black_box(runtime.block_on(generate(&snapshot, period)).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregate_facts, bench_generate);
criterion_main!(benches);
