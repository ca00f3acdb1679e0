// Pricing reconstruction: turns resolved pricing rows into one flat entry per
// row, carrying the product's identity and attribute ids so edits can be
// written back without refetching.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{CardinalityError, PricingError};
use crate::jsonapi::{ResolvedMap, ResolvedRecord};

pub const PRICING_BY_CUSTOMER: &str = "vendor-pricing-by-customer";
pub const PRICING_BY_CUSTOMER_ATTRS: &str = "vendor-pricing-by-customer-attrs";
pub const PRICING_BY_CLASS: &str = "vendor-pricing-by-class";
pub const PRICING_CLASSES: &str = "vendor-pricing-classes";
pub const PRODUCTS: &str = "vendor-products";
pub const PRODUCT_ATTRS: &str = "vendor-product-attrs";

/// Customer attribute holding the operator-facing product description.
pub const CUSTOM_DESCRIPTION: &str = "custom_description";

/// Named price tiers on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PricingClass {
    ZeroDiscount,
    StrategyPricing,
}

impl PricingClass {
    pub fn wire_name(self) -> &'static str {
        match self {
            PricingClass::ZeroDiscount => "ZERO_DISCOUNT",
            PricingClass::StrategyPricing => "STRATEGY_PRICING",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PricingClass::ZeroDiscount => "Zero Discount",
            PricingClass::StrategyPricing => "Strategy Pricing",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "ZERO_DISCOUNT" => Some(PricingClass::ZeroDiscount),
            "STRATEGY_PRICING" => Some(PricingClass::StrategyPricing),
            _ => None,
        }
    }
}

/// An attribute record with enough identity to PATCH it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductAttr {
    /// Resource type the attribute lives in; ids are only unique per type.
    pub kind: String,
    pub id: String,
    pub value_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingEntry {
    pub pricing_id: String,
    pub product_id: String,
    pub model_number: String,
    pub description: String,
    /// Minor currency units (cents).
    pub price: i64,
    pub effective_date: Option<String>,
    pub attrs: BTreeMap<String, ProductAttr>,
    pub customer_attrs: BTreeMap<String, ProductAttr>,
}

pub type PricingMap = BTreeMap<String, PricingEntry>;

impl PricingEntry {
    pub fn custom_description(&self) -> Option<&str> {
        self.customer_attrs
            .get(CUSTOM_DESCRIPTION)
            .map(|attr| attr.value.as_str())
    }

    /// Look up an attribute by name, customer attributes first.
    pub fn attr(&self, name: &str) -> Option<&ProductAttr> {
        self.customer_attrs.get(name).or_else(|| self.attrs.get(name))
    }

    fn attrs_mut(&mut self) -> impl Iterator<Item = &mut ProductAttr> {
        self.attrs.values_mut().chain(self.customer_attrs.values_mut())
    }
}

/// Dollars-and-cents rendering of a minor-unit price.
pub struct Price(pub i64);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

/// Storage key for a by-customer pricing row. Rows not flagged
/// `use-as-override` get a distinct key so both prices for one product stay
/// visible.
pub fn pricing_key(id: &str, use_as_override: bool) -> String {
    if use_as_override {
        id.to_owned()
    } else {
        format!("{id} override")
    }
}

/// The single record under `relationship`.
///
/// # Errors
///
/// [`CardinalityError`] when there are zero or several.
pub fn exactly_one<'r>(
    owner: &'r ResolvedRecord,
    owner_id: &str,
    relationship: &str,
) -> Result<(&'r str, &'r ResolvedRecord), CardinalityError> {
    let related = owner.related(relationship);
    let found = related.map_or(0, ResolvedMap::len);
    match related.and_then(|map| map.iter().next()) {
        Some((id, record)) if found == 1 => Ok((id.as_str(), record)),
        _ => Err(CardinalityError {
            owner: format!("{} {owner_id}", owner.kind),
            relationship: relationship.to_owned(),
            found,
        }),
    }
}

/// Flatten pricing rows resolved from `vendor-pricing-by-customer`.
///
/// # Errors
///
/// Fails when a row does not price exactly one product or lacks one of
/// `price`, `use-as-override`, `vendor-product-identifier`,
/// `vendor-product-description`.
pub fn reconstruct_by_customer(resolved: &ResolvedMap) -> Result<PricingMap, PricingError> {
    let mut result = PricingMap::new();
    for (id, row) in resolved {
        let entry = build_entry(id, row)?;
        let use_as_override = match row.attr("use-as-override") {
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(PricingError::InvalidAttribute {
                    record: describe(row, id),
                    attribute: "use-as-override",
                    value: other.clone(),
                })
            }
            None => {
                return Err(PricingError::MissingAttribute {
                    record: describe(row, id),
                    attribute: "use-as-override",
                })
            }
        };
        result.insert(pricing_key(id, use_as_override), entry);
    }
    Ok(result)
}

/// Flatten the zero-discount class prices nested under each root record's
/// `vendor-pricing-classes`. Other classes are ignored.
///
/// # Errors
///
/// Same conditions as [`reconstruct_by_customer`], minus the override flag.
pub fn reconstruct_by_class(resolved: &ResolvedMap) -> Result<PricingMap, PricingError> {
    let mut result = PricingMap::new();
    for root in resolved.values() {
        let Some(classes) = root.related(PRICING_CLASSES) else {
            continue;
        };
        let zero_discount = classes.values().filter(|class| {
            class.attr_str("name").and_then(PricingClass::from_wire) == Some(PricingClass::ZeroDiscount)
        });
        for class in zero_discount {
            let Some(rows) = class.related(PRICING_BY_CLASS) else {
                continue;
            };
            for (id, row) in rows {
                result.insert(id.clone(), build_entry(id, row)?);
            }
        }
    }
    Ok(result)
}

/// Entries in display order: custom description, then price, then model
/// number. Missing values sort last.
pub fn sort_entries(entries: &PricingMap) -> Vec<(&String, &PricingEntry)> {
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|(_, a), (_, b)| {
        missing_last(non_empty(a.custom_description()), non_empty(b.custom_description()))
            .then_with(|| a.price.cmp(&b.price))
            .then_with(|| {
                missing_last(non_empty(Some(&a.model_number)), non_empty(Some(&b.model_number)))
            })
    });
    sorted
}

/// Set the value of every attribute of type `kind` whose id is `attr_id`.
/// Returns how many were updated.
pub fn set_attr_value(entries: &mut PricingMap, kind: &str, attr_id: &str, value: &str) -> usize {
    let mut updated = 0;
    for entry in entries.values_mut() {
        for attr in entry
            .attrs_mut()
            .filter(|attr| attr.kind == kind && attr.id == attr_id)
        {
            attr.value = value.to_owned();
            updated += 1;
        }
    }
    updated
}

fn build_entry(id: &str, row: &ResolvedRecord) -> Result<PricingEntry, PricingError> {
    let (product_id, product) = exactly_one(row, id, PRODUCTS)?;

    Ok(PricingEntry {
        pricing_id: id.to_owned(),
        product_id: product_id.to_owned(),
        model_number: required_str(product, product_id, "vendor-product-identifier")?,
        description: required_str(product, product_id, "vendor-product-description")?,
        price: price(row, id)?,
        effective_date: row.attr_str("effective-date").map(str::to_owned),
        attrs: project_attrs(product.related(PRODUCT_ATTRS))?,
        customer_attrs: project_attrs(row.related(PRICING_BY_CUSTOMER_ATTRS))?,
    })
}

fn project_attrs(
    records: Option<&ResolvedMap>,
) -> Result<BTreeMap<String, ProductAttr>, PricingError> {
    let mut attrs = BTreeMap::new();
    for (id, record) in records.into_iter().flatten() {
        let name = required_str(record, id, "attr")?;
        let attr = ProductAttr {
            kind: record.kind.clone(),
            id: id.clone(),
            value_type: record.attr_str("type").unwrap_or("STRING").to_owned(),
            value: record.attr("value").map(value_text).unwrap_or_default(),
        };
        attrs.insert(name, attr);
    }
    Ok(attrs)
}

fn price(row: &ResolvedRecord, id: &str) -> Result<i64, PricingError> {
    let value = row.attr("price").filter(|v| !v.is_null()).ok_or_else(|| {
        PricingError::MissingAttribute {
            record: describe(row, id),
            attribute: "price",
        }
    })?;
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        })
        .ok_or_else(|| PricingError::InvalidAttribute {
            record: describe(row, id),
            attribute: "price",
            value: value.clone(),
        })
}

fn required_str(
    record: &ResolvedRecord,
    id: &str,
    attribute: &'static str,
) -> Result<String, PricingError> {
    record
        .attr_str(attribute)
        .map(str::to_owned)
        .ok_or_else(|| PricingError::MissingAttribute {
            record: describe(record, id),
            attribute,
        })
}

fn describe(record: &ResolvedRecord, id: &str) -> String {
    format!("{} {id}", record.kind)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn non_empty<S: AsRef<str> + ?Sized>(value: Option<&S>) -> Option<&str> {
    value.map(AsRef::as_ref).filter(|s| !s.trim().is_empty())
}

fn missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
