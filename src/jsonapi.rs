// JSON:API documents and the relationship resolver.
//
// The backend answers with a primary `data` section plus a flat `included`
// array whose members point at each other through `{id, type}` linkage. The
// resolver walks that graph starting from one resource type and produces a
// tree of `ResolvedRecord`s keyed by relationship name, which the pricing
// module then flattens into display rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A complete response body: `{data, included}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default)]
    pub included: Vec<Resource>,
}

/// The `data` member is either one resource or a list of them.
#[derive(Debug, Clone)]
pub enum PrimaryData {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

/// One API record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resource {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: BTreeMap<String, Relationship>,
}

/// A relationship object. A relationship that only carries `links` parses
/// as [`Linkage::Missing`] and is skipped by the resolver; a `data` member of
/// any other shape than the ones below is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Linkage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    ToMany(Vec<Identifier>),
    ToOne(Identifier),
    Null,
    #[default]
    #[serde(skip)]
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identifier {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A resource's attributes plus everything reachable from it, keyed by
/// relationship name and then by related id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRecord {
    pub kind: String,
    pub attributes: Map<String, Value>,
    pub related: BTreeMap<String, ResolvedMap>,
}

pub type ResolvedMap = BTreeMap<String, ResolvedRecord>;

impl Document {
    /// Parse a response body.
    ///
    /// # Errors
    ///
    /// Fails when a resource or a linkage does not have one of the shapes
    /// listed on [`Resource`] and [`Linkage`].
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Primary resources as a slice; empty when `data` is null or absent.
    pub fn primary(&self) -> &[Resource] {
        match &self.data {
            Some(PrimaryData::Many(items)) => items,
            Some(PrimaryData::One(item)) => std::slice::from_ref(item.as_ref()),
            None => &[],
        }
    }

    pub fn has_data(&self) -> bool {
        !self.primary().is_empty()
    }

    /// Primary and included resources together.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.primary().iter().chain(self.included.iter())
    }
}

impl<'de> Deserialize<'de> for PrimaryData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            items @ Value::Array(_) => serde_json::from_value(items)
                .map(PrimaryData::Many)
                .map_err(|e| D::Error::custom(format!("invalid primary data: {e}"))),
            item @ Value::Object(_) => serde_json::from_value(item)
                .map(|r| PrimaryData::One(Box::new(r)))
                .map_err(|e| D::Error::custom(format!("invalid primary resource: {e}"))),
            other => Err(D::Error::custom(format!(
                "primary data must be a resource or a list of resources, got {other}"
            ))),
        }
    }
}

impl Linkage {
    /// Related ids in linkage order. Null and `[]` both yield nothing.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Linkage::ToMany(items) => items.iter().map(|i| i.id.as_str()).collect(),
            Linkage::ToOne(item) => vec![item.id.as_str()],
            Linkage::Null | Linkage::Missing => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Linkage::ToMany(items) => items.is_empty(),
            Linkage::ToOne(_) => false,
            Linkage::Null | Linkage::Missing => true,
        }
    }
}

impl ResolvedRecord {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.related.is_empty()
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// String attribute; `None` when absent, null or not a string.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Records resolved under `relationship`; `None` when nothing resolved.
    pub fn related(&self, relationship: &str) -> Option<&ResolvedMap> {
        self.related.get(relationship)
    }
}

/// Resolve every resource of `primary_type` (optionally only those whose id
/// is in `restrict_ids`) into a [`ResolvedRecord`] tree.
///
/// Relationship keys double as the related resource type. A resource that is
/// already being resolved further up the current path is not entered again,
/// so back-references terminate. Records that end up with neither attributes
/// nor resolved relationships are dropped.
pub fn resolve<'a, I>(
    resources: I,
    primary_type: &str,
    restrict_ids: Option<&BTreeSet<String>>,
) -> ResolvedMap
where
    I: IntoIterator<Item = &'a Resource>,
{
    let index = TypeIndex::new(resources);
    let mut path = Vec::new();
    index.resolve(primary_type, restrict_ids, &mut path)
}

/// Deep-merge `from` into `into`. On an id collision the later record's
/// attributes win key by key and the related maps merge recursively.
pub fn merge_resolved(into: &mut ResolvedMap, from: ResolvedMap) {
    for (id, record) in from {
        match into.get_mut(&id) {
            Some(existing) => {
                tracing::debug!(id = %id, kind = %record.kind, "merging colliding resolved record");
                existing.kind = record.kind;
                existing.attributes.extend(record.attributes);
                for (key, related) in record.related {
                    merge_resolved(existing.related.entry(key).or_default(), related);
                }
            }
            None => {
                into.insert(id, record);
            }
        }
    }
}

struct TypeIndex<'a> {
    by_type: HashMap<&'a str, Vec<&'a Resource>>,
}

impl<'a> TypeIndex<'a> {
    fn new<I>(resources: I) -> Self
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        let mut by_type: HashMap<&'a str, Vec<&'a Resource>> = HashMap::new();
        for resource in resources {
            by_type.entry(resource.kind.as_str()).or_default().push(resource);
        }
        TypeIndex { by_type }
    }

    fn resolve(
        &self,
        primary_type: &str,
        restrict_ids: Option<&BTreeSet<String>>,
        path: &mut Vec<(&'a str, &'a str)>,
    ) -> ResolvedMap {
        let mut structured = ResolvedMap::new();
        let Some(candidates) = self.by_type.get(primary_type) else {
            return structured;
        };

        for &resource in candidates {
            if restrict_ids.is_some_and(|ids| !ids.contains(&resource.id)) {
                continue;
            }
            let key = (resource.kind.as_str(), resource.id.as_str());
            if path.contains(&key) {
                continue;
            }

            path.push(key);
            let mut record = ResolvedRecord {
                kind: resource.kind.clone(),
                attributes: resource.attributes.clone(),
                related: BTreeMap::new(),
            };
            for (rel_key, relationship) in &resource.relationships {
                if relationship.data.is_empty() {
                    continue;
                }
                let related_ids: BTreeSet<String> = relationship
                    .data
                    .ids()
                    .into_iter()
                    .map(str::to_owned)
                    .collect();
                let resolved = self.resolve(rel_key, Some(&related_ids), path);
                if !resolved.is_empty() {
                    merge_resolved(record.related.entry(rel_key.clone()).or_default(), resolved);
                }
            }
            path.pop();

            let mut single = ResolvedMap::new();
            single.insert(resource.id.clone(), record);
            merge_resolved(&mut structured, single);
        }

        structured.retain(|_, record| !record.is_empty());
        structured
    }
}

/// Ids arrive as JSON strings or numbers; both become `String`.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(s) => s,
        IdRepr::Number(n) => n.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(included: Value) -> Vec<Resource> {
        serde_json::from_value(included).expect("fixture should parse")
    }

    fn pricing_fixture() -> Vec<Resource> {
        parse(json!([
            {
                "id": "1",
                "type": "vendor-pricing-by-customer",
                "attributes": {"price": 500, "use-as-override": true},
                "relationships": {
                    "vendor-products": {"data": {"id": "9", "type": "vendor-products"}}
                }
            },
            {
                "id": "9",
                "type": "vendor-products",
                "attributes": {
                    "vendor-product-identifier": "X1",
                    "vendor-product-description": "Coil"
                },
                "relationships": {
                    "vendor-product-attrs": {"data": [
                        {"id": 30, "type": "vendor-product-attrs"},
                        {"id": 31, "type": "vendor-product-attrs"}
                    ]}
                }
            },
            {
                "id": 30,
                "type": "vendor-product-attrs",
                "attributes": {"attr": "tonnage", "type": "NUMBER", "value": "3"},
                "relationships": {"vendor-products": {"data": {"id": "9", "type": "vendor-products"}}}
            },
            {
                "id": 31,
                "type": "vendor-product-attrs",
                "attributes": {"attr": "series", "type": "STRING", "value": "HE"},
                "relationships": {}
            },
            {
                "id": "77",
                "type": "vendor-product-attrs",
                "attributes": {"attr": "unrelated", "type": "STRING", "value": "x"}
            }
        ]))
    }

    #[test]
    fn numeric_ids_are_normalised_to_strings() {
        let resources = pricing_fixture();
        assert_eq!(resources[2].id, "30");
        assert_eq!(resources[1].relationships["vendor-product-attrs"].data.ids(), vec!["30", "31"]);
    }

    #[test]
    fn null_attributes_and_missing_relationships_parse_as_empty() {
        let resources = parse(json!([
            {"id": "1", "type": "vendor-product-to-class-mapping", "attributes": null}
        ]));
        assert!(resources[0].attributes.is_empty());
        assert!(resources[0].relationships.is_empty());
    }

    #[test]
    fn links_only_relationship_is_skipped() {
        let resources = parse(json!([
            {
                "id": "1",
                "type": "a",
                "attributes": {"name": "x"},
                "relationships": {
                    "b": {"links": {"related": "/a/1/b"}},
                    "c": {"data": {"id": "2", "type": "c"}}
                }
            },
            {"id": "2", "type": "c", "attributes": {"v": 1}}
        ]));
        assert_eq!(resources[0].relationships["b"].data, Linkage::Missing);

        let resolved = resolve(&resources, "a", None);
        assert!(resolved["1"].related("b").is_none());
        assert_eq!(resolved["1"].related("c").unwrap()["2"].attr("v"), Some(&json!(1)));
    }

    #[test]
    fn links_only_relationship_on_primary_data_parses() {
        let document = Document::from_value(json!({
            "data": {
                "id": 42,
                "type": "vendor-customers",
                "attributes": {"name": "ACME"},
                "relationships": {"vendors": {"links": {"self": "/vendor-customers/42/vendors"}}}
            },
            "included": [
                {"id": "1", "type": "vendor-pricing-by-customer", "attributes": {"price": 1}}
            ]
        }))
        .unwrap();
        assert!(document.has_data());
        assert_eq!(resolve(&document.included, "vendor-pricing-by-customer", None).len(), 1);
    }

    #[test]
    fn malformed_primary_data_names_the_cause() {
        let err = Document::from_value(json!({
            "data": {"id": "1", "type": "a", "relationships": {"b": {"data": {"type": "b"}}}}
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("invalid primary resource"), "{err}");
        assert!(!err.contains("PrimaryData"), "{err}");

        let scalar = Document::from_value(json!({"data": 5})).unwrap_err().to_string();
        assert!(scalar.contains("resource or a list of resources"), "{scalar}");
    }

    #[test]
    fn identifier_without_id_fails_to_parse() {
        let result = serde_json::from_value::<Vec<Resource>>(json!([
            {"id": "1", "type": "a", "relationships": {"b": {"data": {"type": "b"}}}}
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn scalar_linkage_fails_to_parse() {
        let result = serde_json::from_value::<Vec<Resource>>(json!([
            {"id": "1", "type": "a", "relationships": {"b": {"data": "oops"}}}
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn document_reports_missing_and_empty_data() {
        let missing = Document::from_value(json!({"included": []})).unwrap();
        let empty = Document::from_value(json!({"data": []})).unwrap();
        let null = Document::from_value(json!({"data": null})).unwrap();
        let single = Document::from_value(json!({"data": {"id": "5", "type": "vendors"}})).unwrap();
        assert!(!missing.has_data());
        assert!(!empty.has_data());
        assert!(!null.has_data());
        assert_eq!(single.primary()[0].id, "5");
        assert_eq!(single.resources().count(), 1);
    }

    #[test]
    fn resolves_relationship_chains_recursively() {
        let resources = pricing_fixture();
        let resolved = resolve(&resources, "vendor-pricing-by-customer", None);

        assert_eq!(resolved.len(), 1);
        let pricing = &resolved["1"];
        assert_eq!(pricing.attr("price"), Some(&json!(500)));

        let product = &pricing.related("vendor-products").unwrap()["9"];
        assert_eq!(product.attr_str("vendor-product-identifier"), Some("X1"));

        let attrs = product.related("vendor-product-attrs").unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["30"].attr_str("attr"), Some("tonnage"));
        assert_eq!(attrs["31"].attr_str("value"), Some("HE"));
        assert!(!attrs.contains_key("77"));
    }

    #[test]
    fn back_references_do_not_recurse_forever() {
        let resources = pricing_fixture();
        let resolved = resolve(&resources, "vendor-products", None);
        let attr = &resolved["9"].related("vendor-product-attrs").unwrap()["30"];
        // attr 30 points back at product 9, which is already on the path
        assert!(attr.related("vendor-products").is_none());
        assert_eq!(attr.attr_str("attr"), Some("tonnage"));
    }

    #[test]
    fn restrict_ids_limits_matches() {
        let resources = pricing_fixture();
        let ids: BTreeSet<String> = ["31".to_owned()].into();
        let resolved = resolve(&resources, "vendor-product-attrs", Some(&ids));
        assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["31"]);

        let none = BTreeSet::new();
        assert!(resolve(&resources, "vendor-product-attrs", Some(&none)).is_empty());
    }

    #[test]
    fn resolving_twice_is_identical_and_leaves_input_untouched() {
        let resources = pricing_fixture();
        let before = resources.clone();
        let first = resolve(&resources, "vendor-pricing-by-customer", None);
        let second = resolve(&resources, "vendor-pricing-by-customer", None);
        assert_eq!(first, second);
        assert_eq!(resources, before);
    }

    #[test]
    fn empty_linkage_keeps_only_attributes() {
        let resources = parse(json!([
            {
                "id": "4",
                "type": "vendor-pricing-by-customer",
                "attributes": {"price": 100},
                "relationships": {
                    "vendor-products": {"data": []},
                    "vendor-customers": {"data": null}
                }
            }
        ]));
        let resolved = resolve(&resources, "vendor-pricing-by-customer", None);
        let record = &resolved["4"];
        assert_eq!(record.attributes.len(), 1);
        assert!(record.related.is_empty());
    }

    #[test]
    fn records_without_attributes_or_links_are_dropped() {
        let resources = parse(json!([
            {
                "id": "4",
                "type": "vendor-pricing-by-customer",
                "attributes": {},
                "relationships": {"vendor-products": {"data": []}}
            },
            {
                "id": "5",
                "type": "vendor-pricing-by-customer",
                "attributes": {"price": 1},
                "relationships": {}
            }
        ]));
        let resolved = resolve(&resources, "vendor-pricing-by-customer", None);
        assert!(!resolved.contains_key("4"));
        assert!(resolved.contains_key("5"));
    }

    #[test]
    fn dangling_linkage_adds_no_relationship_key() {
        let resources = parse(json!([
            {
                "id": "4",
                "type": "vendor-pricing-by-customer",
                "attributes": {"price": 1},
                "relationships": {"vendor-products": {"data": {"id": "404", "type": "vendor-products"}}}
            }
        ]));
        let resolved = resolve(&resources, "vendor-pricing-by-customer", None);
        assert!(resolved["4"].related.is_empty());
    }

    #[test]
    fn duplicate_resources_merge_with_later_attributes_winning() {
        let resources = parse(json!([
            {"id": "1", "type": "t", "attributes": {"a": 1, "b": 1}},
            {"id": "1", "type": "t", "attributes": {"b": 2}}
        ]));
        let resolved = resolve(&resources, "t", None);
        assert_eq!(resolved["1"].attr("a"), Some(&json!(1)));
        assert_eq!(resolved["1"].attr("b"), Some(&json!(2)));
    }

    #[test]
    fn merge_resolved_merges_nested_maps() {
        let leaf = |value: i64| ResolvedRecord {
            kind: "leaf".into(),
            attributes: json!({"v": value}).as_object().cloned().unwrap(),
            related: BTreeMap::new(),
        };
        let mut into = ResolvedMap::new();
        let mut parent = ResolvedRecord { kind: "p".into(), ..Default::default() };
        parent.related.insert("leaf".into(), [("a".to_owned(), leaf(1))].into());
        into.insert("1".into(), parent.clone());

        let mut other = parent;
        other.related.insert("leaf".into(), [("b".to_owned(), leaf(2))].into());
        merge_resolved(&mut into, [("1".to_owned(), other)].into());

        let leaves = into["1"].related("leaf").unwrap();
        assert_eq!(leaves.len(), 2);
    }
}
