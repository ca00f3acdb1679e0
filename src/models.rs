// Domain records shared by the client and the menus. Enums carry a wire
// identifier (what the backend expects) separately from the label shown to
// the operator.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: String,
    pub name: String,
}

/// A vendor-side account belonging to one of our customers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorCustomer {
    pub id: String,
    pub name: String,
    pub vendor: Vendor,
}

/// One of our customers with the vendor accounts mapped to its locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerGroup {
    pub id: String,
    pub name: String,
    pub accounts: Vec<VendorCustomer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductClass {
    Coils,
    AirHandlers,
}

impl ProductClass {
    /// Product class name as stored on the backend.
    pub fn wire_name(self) -> &'static str {
        match self {
            ProductClass::Coils => "Coils",
            ProductClass::AirHandlers => "Air Handlers",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProductClass::Coils => "coils",
            ProductClass::AirHandlers => "air handlers",
        }
    }
}

/// Program line-item stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Proposed,
    Active,
}

impl Stage {
    pub fn wire_name(self) -> &'static str {
        match self {
            Stage::Proposed => "proposed",
            Stage::Active => "active",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Proposed => "Proposed",
            Stage::Active => "Active",
        };
        f.write_str(label)
    }
}

/// Actions offered once a vendor account is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorAction {
    DownloadProgram,
    UploadRatings,
    ReviewRatings,
    ViewProducts(ProductClass),
    AddProducts(ProductClass),
    PriceCheck,
    ZeroDiscountList,
}

impl VendorAction {
    pub const ALL: [VendorAction; 9] = [
        VendorAction::DownloadProgram,
        VendorAction::UploadRatings,
        VendorAction::ReviewRatings,
        VendorAction::ViewProducts(ProductClass::Coils),
        VendorAction::ViewProducts(ProductClass::AirHandlers),
        VendorAction::AddProducts(ProductClass::Coils),
        VendorAction::AddProducts(ProductClass::AirHandlers),
        VendorAction::PriceCheck,
        VendorAction::ZeroDiscountList,
    ];
}

impl fmt::Display for VendorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorAction::DownloadProgram => f.write_str("Download Program"),
            VendorAction::UploadRatings => f.write_str("Upload Ratings"),
            VendorAction::ReviewRatings => f.write_str("Review Ratings"),
            VendorAction::ViewProducts(class) => write!(f, "View {}", class.label()),
            VendorAction::AddProducts(class) => write!(f, "Add {}", class.label()),
            VendorAction::PriceCheck => f.write_str("Price Check"),
            VendorAction::ZeroDiscountList => f.write_str("Zero Discount Price List"),
        }
    }
}

/// An AHRI rating row uploaded for a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct Rating {
    #[serde(deserialize_with = "crate::jsonapi::deserialize_id")]
    pub id: String,
    pub attributes: RatingAttrs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingAttrs {
    pub ahrinumber: Option<String>,
    #[serde(rename = "outdoor-model")]
    pub outdoor_model: Option<String>,
    #[serde(rename = "indoor-model")]
    pub indoor_model: Option<String>,
    #[serde(rename = "oem-name")]
    pub oem_name: Option<String>,
    pub seer2: Option<f64>,
    pub eer2: Option<f64>,
    pub capacity2: Option<f64>,
    pub hspf2: Option<f64>,
}

/// Sort ratings by outdoor model, then indoor model; missing models last.
pub fn sort_ratings(ratings: &mut [Rating]) {
    ratings.sort_by(|a, b| {
        let key = |r: &Rating| {
            (
                r.attributes.outdoor_model.is_none(),
                r.attributes.outdoor_model.clone(),
                r.attributes.indoor_model.is_none(),
                r.attributes.indoor_model.clone(),
            )
        };
        key(a).cmp(&key(b))
    });
}

/// Model-lookup answer used by the price check screen.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceCheck {
    #[serde(rename = "zero-discount-price")]
    pub zero_discount_price: f64,
    #[serde(rename = "net-price")]
    pub net_price: f64,
    #[serde(rename = "material-group-net-price")]
    pub material_group_net_price: Option<f64>,
    #[serde(rename = "material-group-discount")]
    pub material_group_discount: Option<f64>,
    #[serde(rename = "snp-price")]
    pub snp_price: Option<f64>,
    #[serde(rename = "snp-discount")]
    pub snp_discount: Option<f64>,
    #[serde(flatten)]
    pub features: Map<String, Value>,
}

const FEATURE_KEYS: [&str; 8] = [
    "model-number",
    "series",
    "tonnage",
    "width",
    "depth",
    "height",
    "motor",
    "heat",
];

impl PriceCheck {
    /// Discount percentage that produced the net price. The SNP discount
    /// wins when both the SNP and material group prices match.
    pub fn discount_used(&self) -> f64 {
        if self.net_price == self.zero_discount_price {
            return 0.0;
        }
        let mut discount = 0.0;
        if self.material_group_net_price.unwrap_or(0.0) == self.net_price {
            discount = self.material_group_discount.unwrap_or(0.0);
        }
        if self.snp_price.unwrap_or(0.0) == self.net_price {
            discount = self.snp_discount.unwrap_or(0.0);
        }
        discount
    }

    /// Displayable product features, in a fixed order.
    pub fn features(&self) -> Vec<(&'static str, String)> {
        FEATURE_KEYS
            .iter()
            .filter_map(|&key| {
                let value = self.features.get(key)?;
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some((key, text))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn price_check(body: Value) -> PriceCheck {
        serde_json::from_value(body).expect("price check should parse")
    }

    #[test]
    fn no_discount_when_net_equals_zero_discount() {
        let check = price_check(json!({
            "zero-discount-price": 100.0,
            "net-price": 100.0,
            "snp-price": 100.0,
            "snp-discount": 5.0
        }));
        assert_eq!(check.discount_used(), 0.0);
    }

    #[test]
    fn material_group_discount_applies_when_its_price_matches() {
        let check = price_check(json!({
            "zero-discount-price": 100.0,
            "net-price": 90.0,
            "material-group-net-price": 90.0,
            "material-group-discount": 10.0
        }));
        assert_eq!(check.discount_used(), 10.0);
    }

    #[test]
    fn snp_discount_wins_over_material_group() {
        let check = price_check(json!({
            "zero-discount-price": 100.0,
            "net-price": 80.0,
            "material-group-net-price": 80.0,
            "material-group-discount": 20.0,
            "snp-price": 80.0,
            "snp-discount": 21.5
        }));
        assert_eq!(check.discount_used(), 21.5);
    }

    #[test]
    fn features_follow_fixed_order_and_skip_unknown_keys() {
        let check = price_check(json!({
            "zero-discount-price": 1.0,
            "net-price": 1.0,
            "tonnage": 3,
            "model-number": "CE30",
            "category": "Coils",
            "heat": null
        }));
        assert_eq!(
            check.features(),
            vec![("model-number", "CE30".to_string()), ("tonnage", "3".to_string())]
        );
    }

    #[test]
    fn ratings_sort_by_outdoor_then_indoor_model() {
        let mut ratings: Vec<Rating> = serde_json::from_value(json!([
            {"id": 3, "attributes": {"outdoor-model": "B", "indoor-model": "A"}},
            {"id": 1, "attributes": {"outdoor-model": null, "indoor-model": "A"}},
            {"id": 2, "attributes": {"outdoor-model": "A", "indoor-model": "Z"}},
            {"id": "4", "attributes": {"outdoor-model": "A", "indoor-model": "C"}}
        ]))
        .unwrap();
        sort_ratings(&mut ratings);
        let ids: Vec<_> = ratings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "2", "3", "1"]);
    }

    #[test]
    fn stage_wire_names_are_lowercase() {
        assert_eq!(Stage::Proposed.wire_name(), "proposed");
        assert_eq!(Stage::Active.to_string(), "Active");
    }

    #[test]
    fn actions_render_menu_labels() {
        assert_eq!(
            VendorAction::ViewProducts(ProductClass::AirHandlers).to_string(),
            "View air handlers"
        );
        assert_eq!(ProductClass::AirHandlers.wire_name(), "Air Handlers");
    }
}
