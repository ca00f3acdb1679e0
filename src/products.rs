// New-product registration for a customer.
//
// A model either already exists as a vendor product or has to be created
// from the vendor's model lookup: product record, one attribute record per
// lookup field, and mappings to its material group and product class. Either
// way the customer then gets a strategy pricing row and a custom description
// attribute.

use std::sync::Mutex;
use std::thread;

use chrono::Local;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::jsonapi::{Document, Resource};
use crate::models::{ProductClass, VendorCustomer};
use crate::pricing::{PricingClass, CUSTOM_DESCRIPTION, PRODUCTS};

/// Backend id of the `STRATEGY_PRICING` pricing class.
pub const STRATEGY_PRICING_CLASS_ID: u32 = 2;

const MAX_WORKERS: usize = 8;

/// What was created for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPricing {
    pub pricing_id: String,
    pub product_id: String,
    pub model_number: String,
    pub description: String,
}

/// Fields pulled out of a model lookup before the rest become attributes.
#[derive(Debug, Clone)]
struct LookupDetails {
    material_group: String,
    model_returned: String,
    category: String,
    net_price: i64,
    remaining: Map<String, Value>,
}

/// Split comma-separated operator input into trimmed, upper-cased models.
pub fn parse_model_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|model| model.trim().to_uppercase())
        .filter(|model| !model.is_empty())
        .collect()
}

/// `NUMBER` when the value reads as an integer, `STRING` otherwise.
pub fn attr_value_type(value: &Value) -> &'static str {
    let numeric = match value {
        Value::Number(_) | Value::Bool(_) => true,
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    };
    if numeric {
        "NUMBER"
    } else {
        "STRING"
    }
}

/// Register `model` for `customer` under product class `class`.
///
/// # Errors
///
/// Propagates lookup, creation and pricing failures. Attribute registration
/// failures are logged and do not abort the flow.
pub fn add_product(
    api: &ApiClient,
    customer: &VendorCustomer,
    model: &str,
    class: ProductClass,
) -> Result<NewPricing, ApiError> {
    let vendor_id = customer.vendor.id.as_str();
    let lookup_path = format!("/vendors/{vendor_id}/model-lookup");
    let existing = find_product(api, vendor_id, model)?;

    let lookup = model_lookup(api, &lookup_path, customer, model)?;
    let product_id = match existing {
        Some(id) => id,
        None => create_product(api, vendor_id, model, class, &lookup)?,
    };

    let pricing = json!({
        "data": {
            "type": "vendor-pricing-by-customer",
            "attributes": {
                "use-as-override": true,
                "price": lookup.net_price * 100,
                "effective-date": Local::now().naive_local().to_string(),
            },
            "relationships": {
                "vendor-products": to_one(PRODUCTS, &product_id),
                "vendor-customers": to_one("vendor-customers", &customer.id),
                "vendor-pricing-classes": to_one("vendor-pricing-classes", &STRATEGY_PRICING_CLASS_ID.to_string()),
                "vendors": to_one("vendors", vendor_id),
            }
        }
    });
    tracing::debug!(
        model,
        pricing_class = PricingClass::StrategyPricing.wire_name(),
        "creating customer pricing"
    );
    let pricing_id = created_id(
        api.post_json("/v2/vendors/vendor-pricing-by-customer", &pricing)?,
        "customer pricing",
    )?;

    let description = json!({
        "data": {
            "type": "vendor-pricing-by-customer-attrs",
            "attributes": {
                "attr": CUSTOM_DESCRIPTION,
                "type": "STRING",
                "value": lookup.category,
            },
            "relationships": {
                "vendor-pricing-by-customer": to_one("vendor-pricing-by-customer", &pricing_id),
                "vendors": to_one("vendors", vendor_id),
            }
        }
    });
    let res = api.post_json("/v2/vendors/vendor-pricing-by-customer-attrs", &description)?;
    ApiClient::expect_success(res, "custom description")?;

    Ok(NewPricing {
        pricing_id,
        product_id,
        model_number: lookup.model_returned,
        description: lookup.category,
    })
}

/// Id of the vendor product with identifier `model`, if it exists.
fn find_product(api: &ApiClient, vendor_id: &str, model: &str) -> Result<Option<String>, ApiError> {
    let url = api.url(&format!("/v2/vendors/{vendor_id}/vendor-products"));
    let res = api.send(|c| c.get(&url).query(&[("filter_vendor_product_identifier", model)]))?;
    if res.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let document: Document = ApiClient::json(res, "product search")?;
    Ok(pick_by_attr(document.primary(), "vendor-product-identifier", model))
}

fn model_lookup(
    api: &ApiClient,
    lookup_path: &str,
    customer: &VendorCustomer,
    model: &str,
) -> Result<LookupDetails, ApiError> {
    let url = api.url(lookup_path);
    let res = api.send(|c| {
        c.get(&url)
            .query(&[("model_num", model), ("customer_id", customer.id.as_str())])
    })?;
    let body: Map<String, Value> = ApiClient::json(res, &format!("model lookup for {model}"))?;
    split_lookup(body, model)
}

fn split_lookup(mut body: Map<String, Value>, model: &str) -> Result<LookupDetails, ApiError> {
    let context = format!("model lookup for {model}");
    let mut take_str = |key: &str| -> Result<String, ApiError> {
        match body.remove(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(missing(&context, key)),
        }
    };
    let material_group = take_str("mpg")?;
    let model_returned = take_str("model-number")?;
    let category = take_str("category")?;

    let net_price = body
        .remove("net-price")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| missing(&context, "net-price"))?;

    // pricing fields belong to the customer row, not the product
    for key in [
        "zero-discount-price",
        "material-group-discount",
        "material-group-net-price",
        "snp-discount",
        "snp-net-price",
        "snp-price",
    ] {
        body.remove(key);
    }

    Ok(LookupDetails {
        material_group,
        model_returned,
        category,
        net_price: net_price.trunc() as i64,
        remaining: body,
    })
}

fn missing(context: &str, key: &str) -> ApiError {
    ApiError::decode(
        context,
        serde::de::Error::custom(format!("missing field `{key}`")),
    )
}

fn create_product(
    api: &ApiClient,
    vendor_id: &str,
    model: &str,
    class: ProductClass,
    lookup: &LookupDetails,
) -> Result<String, ApiError> {
    let product = json!({
        "data": {
            "type": PRODUCTS,
            "attributes": {
                "vendor-product-identifier": model,
                "vendor-product-description": lookup.category,
            },
            "relationships": {
                "vendors": to_one("vendors", vendor_id),
            }
        }
    });
    let product_id = created_id(api.post_json("/v2/vendors/vendor-products", &product)?, "product")?;

    let payloads: Vec<Value> = lookup
        .remaining
        .iter()
        .map(|(attr, value)| attr_payload(vendor_id, &product_id, attr, value))
        .collect();
    let failed = post_all(api, "/v2/vendors/vendor-product-attrs", payloads);
    if failed > 0 {
        tracing::warn!(model, failed, "some product attributes were not registered");
    }

    for class_name in [lookup.material_group.as_str(), class.wire_name()] {
        let class_id = find_product_class(api, vendor_id, class_name)?;
        let mapping = json!({
            "data": {
                "type": "vendor-product-to-class-mapping",
                "attributes": null,
                "relationships": {
                    "vendor-products": to_one(PRODUCTS, &product_id),
                    "vendor-product-classes": to_one("vendor-product-classes", &class_id),
                    "vendors": to_one("vendors", vendor_id),
                }
            }
        });
        let res = api.post_json("/v2/vendors/vendor-product-to-class-mapping", &mapping)?;
        ApiClient::expect_success(res, &format!("class mapping to {class_name}"))?;
    }

    Ok(product_id)
}

fn find_product_class(api: &ApiClient, vendor_id: &str, name: &str) -> Result<String, ApiError> {
    let url = api.url(&format!("/v2/vendors/{vendor_id}/vendor-product-classes"));
    let res = api.send(|c| c.get(&url).query(&[("filter_name", name)]))?;
    let document: Document = ApiClient::json(res, &format!("product class {name}"))?;
    pick_by_attr(document.primary(), "name", name)
        .ok_or_else(|| ApiError::Empty(format!("product class {name}")))
}

/// The last resource whose `attr` equals `expected`; a lone resource is
/// taken as-is.
fn pick_by_attr(resources: &[Resource], attr: &str, expected: &str) -> Option<String> {
    if let [only] = resources {
        return Some(only.id.clone());
    }
    resources
        .iter()
        .rev()
        .find(|r| r.attributes.get(attr).and_then(Value::as_str) == Some(expected))
        .map(|r| r.id.clone())
}

fn attr_payload(vendor_id: &str, product_id: &str, attr: &str, value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({
        "data": {
            "type": "vendor-product-attrs",
            "attributes": {
                "attr": attr.replace('-', "_"),
                "type": attr_value_type(value),
                "value": text,
            },
            "relationships": {
                "vendor-products": to_one(PRODUCTS, product_id),
                "vendors": to_one("vendors", vendor_id),
            }
        }
    })
}

/// POST every payload from a small scoped worker pool and wait for all of
/// them. Returns how many failed.
fn post_all(api: &ApiClient, path: &str, payloads: Vec<Value>) -> usize {
    if payloads.is_empty() {
        return 0;
    }
    let workers = payloads.len().min(MAX_WORKERS);
    let queue = Mutex::new(payloads.into_iter());
    let queue = &queue;

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut failed = 0;
                    loop {
                        let next = match queue.lock() {
                            Ok(mut items) => items.next(),
                            Err(_) => None,
                        };
                        let Some(payload) = next else {
                            break;
                        };
                        let outcome = api
                            .post_json(path, &payload)
                            .and_then(|res| ApiClient::expect_success(res, "product attribute"));
                        if let Err(e) = outcome {
                            tracing::warn!(error = %e, "attribute registration failed");
                            failed += 1;
                        }
                    }
                    failed
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .sum()
    })
}

fn created_id(res: reqwest::blocking::Response, context: &str) -> Result<String, ApiError> {
    #[derive(serde::Deserialize)]
    struct Created {
        data: Resource,
    }
    let created: Created = ApiClient::json(res, context)?;
    Ok(created.data.id)
}

fn to_one(kind: &str, id: &str) -> Value {
    json!({"data": {"type": kind, "id": id}})
}
