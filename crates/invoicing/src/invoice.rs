//! Invoice documents: invoice → categories → items.
//!
//! Totals are computed by the constructors from their children and cannot be
//! set independently, so `Invoice::total == Σ InvoiceCategory::total` and
//! `InvoiceCategory::total == Σ Item::total` hold for every value of these types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use meterbill_core::{BillingPeriod, Category, CategoryId, ProductId, Tenant, TenantId};

/// Product a line item is priced from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub source: String,
    pub target: Option<String>,
}

/// One priced line of an invoice category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    /// Description of the query the usage was measured by.
    pub description: String,
    pub product: ProductRef,
    /// Sum of the grouped fact quantities.
    pub quantity: f64,
    pub quantity_min: f64,
    pub quantity_avg: f64,
    pub quantity_max: f64,
    /// Unit of the quantity, e.g. `MiB`.
    pub unit: String,
    pub price_per_unit: f64,
    /// Discount fraction; `0.3` bills 70% of `price_per_unit`.
    pub discount: f64,
    /// `quantity * price_per_unit * (1 - discount)`.
    pub total: f64,
}

impl Item {
    /// Price a quantity sum.
    pub fn total_for(quantity: f64, price_per_unit: f64, discount: f64) -> f64 {
        quantity * price_per_unit * (1.0 - discount)
    }
}

/// Billing identity of the invoiced tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceTenant {
    pub id: TenantId,
    pub source: String,
    pub target: Option<String>,
}

impl From<&Tenant> for InvoiceTenant {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            source: tenant.source.clone(),
            target: tenant.target.clone(),
        }
    }
}

/// A category (namespace) section of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceCategory {
    id: CategoryId,
    source: String,
    target: Option<String>,
    items: Vec<Item>,
    total: f64,
}

impl InvoiceCategory {
    pub fn new(category: &Category, items: Vec<Item>) -> Self {
        let total = items.iter().fold(0.0, |acc, item| acc + item.total);
        Self {
            id: category.id,
            source: category.source.clone(),
            target: category.target.clone(),
            items,
            total,
        }
    }

    pub fn id(&self) -> CategoryId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Accumulated cost of all items.
    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Invoice for one tenant and one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    tenant: InvoiceTenant,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    categories: Vec<InvoiceCategory>,
    total: f64,
}

impl Invoice {
    pub fn new(tenant: &Tenant, period: BillingPeriod, categories: Vec<InvoiceCategory>) -> Self {
        let total = categories.iter().fold(0.0, |acc, category| acc + category.total());
        Self {
            tenant: InvoiceTenant::from(tenant),
            period_start: period.start_utc(),
            period_end: period.end_utc(),
            categories,
            total,
        }
    }

    pub fn tenant(&self) -> &InvoiceTenant {
        &self.tenant
    }

    /// First day of the invoiced month, UTC midnight.
    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    /// Last day of the invoiced month, UTC midnight.
    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_end
    }

    pub fn categories(&self) -> &[InvoiceCategory] {
        &self.categories
    }

    /// Accumulated cost of all categories.
    pub fn total(&self) -> f64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, quantity: f64, price: f64, discount: f64) -> Item {
        Item {
            description: description.to_string(),
            product: ProductRef {
                id: ProductId::new(),
                source: "my-product".to_string(),
                target: None,
            },
            quantity,
            quantity_min: quantity,
            quantity_avg: quantity,
            quantity_max: quantity,
            unit: "tps".to_string(),
            price_per_unit: price,
            discount,
            total: Item::total_for(quantity, price, discount),
        }
    }

    #[test]
    fn discount_reduces_item_total() {
        assert_eq!(Item::total_for(5.0, 10.0, 0.3), 35.0);
        assert_eq!(Item::total_for(42.0, 1.0, 0.0), 42.0);
    }

    #[test]
    fn totals_roll_up_from_children() {
        let period = BillingPeriod::new(2022, 3).unwrap();
        let tenant = Tenant::new("my-tenant");
        let first = InvoiceCategory::new(
            &Category::new("ns-a"),
            vec![item("cpu", 2.0, 1.5, 0.0), item("memory", 4.0, 0.25, 0.5)],
        );
        let second = InvoiceCategory::new(&Category::new("ns-b"), vec![item("cpu", 1.0, 3.0, 0.0)]);
        assert_eq!(first.total(), 3.0 + 0.5);

        let invoice = Invoice::new(&tenant, period, vec![first, second]);
        assert_eq!(invoice.total(), 3.5 + 3.0);
        assert_eq!(invoice.tenant().source, "my-tenant");
        assert_eq!(invoice.period_start(), period.start_utc());
        assert_eq!(invoice.period_end(), period.end_utc());
    }

    #[test]
    fn category_without_items_totals_zero() {
        let category = InvoiceCategory::new(&Category::new("empty"), Vec::new());
        assert_eq!(category.total(), 0.0);
        assert!(!category.total().is_sign_negative());

        let invoice = Invoice::new(&Tenant::new("my-tenant"), BillingPeriod::new(2022, 3).unwrap(), vec![category]);
        assert!(!invoice.total().is_sign_negative());

        let json = serde_json::to_string(&invoice).unwrap();
        assert!(json.contains("\"items\":[],\"total\":0.0}"), "{json}");
        assert!(json.ends_with("\"total\":0.0}"), "{json}");
    }

    #[test]
    fn invoice_without_categories_totals_zero() {
        let invoice = Invoice::new(&Tenant::new("my-tenant"), BillingPeriod::new(2022, 3).unwrap(), Vec::new());
        assert!(!invoice.total().is_sign_negative());
    }

    #[test]
    fn serializes_nested_document() {
        let period = BillingPeriod::new(2022, 3).unwrap();
        let tenant = Tenant::new("my-tenant").with_target("1234");
        let category = InvoiceCategory::new(&Category::new("my-namespace"), vec![item("test", 42.0, 1.0, 0.0)]);
        let invoice = Invoice::new(&tenant, period, vec![category]);

        let json = serde_json::to_value(&invoice).unwrap();
        assert_eq!(json["tenant"]["target"], "1234");
        assert_eq!(json["period_start"], "2022-03-01T00:00:00Z");
        assert_eq!(json["period_end"], "2022-03-31T00:00:00Z");
        assert_eq!(json["categories"][0]["source"], "my-namespace");
        assert_eq!(json["categories"][0]["items"][0]["total"], 42.0);
        assert_eq!(json["total"], 42.0);
    }
}
