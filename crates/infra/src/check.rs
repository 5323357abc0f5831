//! Data-completeness check.
//!
//! Reports dimension rows that would produce an incomplete invoice: missing
//! billing targets, products without a price or unit. Run it before invoicing;
//! the invoicing engine itself never calls it.

use serde::Serialize;
use uuid::Uuid;

use meterbill_core::{Category, Named, Product, Tenant};

/// Dimension table a finding belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionTable {
    Categories,
    Products,
    Tenants,
}

impl DimensionTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionTable::Categories => "categories",
            DimensionTable::Products => "products",
            DimensionTable::Tenants => "tenants",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "categories" => Some(DimensionTable::Categories),
            "products" => Some(DimensionTable::Products),
            "tenants" => Some(DimensionTable::Tenants),
            _ => None,
        }
    }
}

/// Required field that is empty.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingField {
    Target,
    Amount,
    Unit,
}

impl MissingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingField::Target => "target",
            MissingField::Amount => "amount",
            MissingField::Unit => "unit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "target" => Some(MissingField::Target),
            "amount" => Some(MissingField::Amount),
            "unit" => Some(MissingField::Unit),
            _ => None,
        }
    }
}

/// One dimension row missing one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Missing {
    pub table: DimensionTable,
    pub id: Uuid,
    pub source: String,
    pub field: MissingField,
}

impl core::fmt::Display for Missing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} {:?} ({}) is missing {}",
            self.table.as_str(),
            self.source,
            self.id,
            self.field.as_str()
        )
    }
}

fn missing_targets<T>(table: DimensionTable, rows: &[T]) -> impl Iterator<Item = Missing> + '_
where
    T: Named,
    T::Id: Into<Uuid>,
{
    rows.iter().filter(|row| row.missing_target()).map(move |row| Missing {
        table,
        id: row.id().clone().into(),
        source: row.source().to_string(),
        field: MissingField::Target,
    })
}

/// Findings ordered by table, source and field.
pub fn find_missing(tenants: &[Tenant], categories: &[Category], products: &[Product]) -> Vec<Missing> {
    let mut found: Vec<Missing> = missing_targets(DimensionTable::Tenants, tenants)
        .chain(missing_targets(DimensionTable::Categories, categories))
        .chain(missing_targets(DimensionTable::Products, products))
        .collect();

    for product in products {
        let mut push = |field| {
            found.push(Missing {
                table: DimensionTable::Products,
                id: product.id.into(),
                source: product.source.clone(),
                field,
            })
        };
        if product.amount == 0.0 {
            push(MissingField::Amount);
        }
        if product.unit.trim().is_empty() {
            push(MissingField::Unit);
        }
    }

    found.sort_by(|a, b| {
        a.table
            .cmp(&b.table)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.field.cmp(&b.field))
    });
    found
}
