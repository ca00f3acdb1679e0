// Customer hierarchy: which vendor accounts belong to which of our customers.
//
// Vendor accounts (`vendor-customers`) link to location mappings, mappings
// link to customer locations, and locations link to the owning customer.
// An account is listed under a customer only when every one of its mappings
// leads to that customer.

use std::collections::BTreeSet;

use crate::jsonapi::{resolve, Document, ResolvedRecord};
use crate::models::{CustomerGroup, Vendor, VendorCustomer};

pub const VENDOR_CUSTOMERS: &str = "vendor-customers";
pub const LOCATION_MAPPING: &str = "customer-location-mapping";
pub const LOCATIONS: &str = "customer-locations";
pub const CUSTOMERS: &str = "customers";

pub fn group_customers(document: &Document, vendor: &Vendor) -> Vec<CustomerGroup> {
    let accounts = resolve(document.resources(), VENDOR_CUSTOMERS, None);

    let mut groups: Vec<CustomerGroup> = document
        .included
        .iter()
        .filter(|r| r.kind == CUSTOMERS)
        .map(|customer| CustomerGroup {
            id: customer.id.clone(),
            name: attr_text(customer.attributes.get("name")),
            accounts: Vec::new(),
        })
        .collect();

    for account in document.primary().iter().filter(|r| r.kind == VENDOR_CUSTOMERS) {
        let mapping_ids = account
            .relationships
            .get(LOCATION_MAPPING)
            .map(|rel| rel.data.ids())
            .unwrap_or_default();
        if mapping_ids.is_empty() {
            continue;
        }
        let Some(resolved) = accounts.get(&account.id) else {
            continue;
        };
        let owners: Vec<BTreeSet<&str>> = mapping_ids
            .iter()
            .map(|mapping_id| mapping_owners(resolved, mapping_id))
            .collect();

        for group in &mut groups {
            if owners.iter().all(|set| set.contains(group.id.as_str())) {
                group.accounts.push(VendorCustomer {
                    id: account.id.clone(),
                    name: attr_text(account.attributes.get("name")),
                    vendor: vendor.clone(),
                });
            }
        }
    }

    for group in &mut groups {
        group.accounts.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

/// Customers reachable from one of the account's location mappings.
fn mapping_owners<'r>(account: &'r ResolvedRecord, mapping_id: &str) -> BTreeSet<&'r str> {
    account
        .related(LOCATION_MAPPING)
        .and_then(|mappings| mappings.get(mapping_id))
        .and_then(|mapping| mapping.related(LOCATIONS))
        .into_iter()
        .flat_map(|locations| locations.values())
        .filter_map(|location| location.related(CUSTOMERS))
        .flat_map(|customers| customers.keys().map(String::as_str))
        .collect()
}

fn attr_text(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vendor() -> Vendor {
        Vendor {
            id: "adp".into(),
            name: "ADP".into(),
        }
    }

    fn document() -> Document {
        Document::from_value(json!({
            "data": [
                {
                    "id": 10, "type": "vendor-customers",
                    "attributes": {"name": "Zeta Supply #2"},
                    "relationships": {"customer-location-mapping": {"data": [
                        {"id": 100, "type": "customer-location-mapping"}
                    ]}}
                },
                {
                    "id": 11, "type": "vendor-customers",
                    "attributes": {"name": "Acme Main"},
                    "relationships": {"customer-location-mapping": {"data": [
                        {"id": 101, "type": "customer-location-mapping"},
                        {"id": 102, "type": "customer-location-mapping"}
                    ]}}
                },
                {
                    "id": 12, "type": "vendor-customers",
                    "attributes": {"name": "Split Account"},
                    "relationships": {"customer-location-mapping": {"data": [
                        {"id": 101, "type": "customer-location-mapping"},
                        {"id": 100, "type": "customer-location-mapping"}
                    ]}}
                },
                {
                    "id": 13, "type": "vendor-customers",
                    "attributes": {"name": "Unmapped"},
                    "relationships": {"customer-location-mapping": {"data": []}}
                }
            ],
            "included": [
                {"id": 100, "type": "customer-location-mapping", "attributes": null,
                 "relationships": {"customer-locations": {"data": {"id": 1000, "type": "customer-locations"}}}},
                {"id": 101, "type": "customer-location-mapping", "attributes": null,
                 "relationships": {"customer-locations": {"data": {"id": 1001, "type": "customer-locations"}}}},
                {"id": 102, "type": "customer-location-mapping", "attributes": null,
                 "relationships": {"customer-locations": {"data": {"id": 1002, "type": "customer-locations"}}}},
                {"id": 1000, "type": "customer-locations", "attributes": {"name": "Z1"},
                 "relationships": {"customers": {"data": {"id": 1, "type": "customers"}}}},
                {"id": 1001, "type": "customer-locations", "attributes": {"name": "A1"},
                 "relationships": {"customers": {"data": {"id": 2, "type": "customers"}}}},
                {"id": 1002, "type": "customer-locations", "attributes": {"name": "A2"},
                 "relationships": {"customers": {"data": {"id": 2, "type": "customers"}}}},
                {"id": 1, "type": "customers", "attributes": {"name": "Zeta Supply"}},
                {"id": 2, "type": "customers", "attributes": {"name": "Acme"}},
                {"id": 3, "type": "customers", "attributes": {"name": "Lonely"}}
            ]
        }))
        .expect("fixture should parse")
    }

    #[test]
    fn accounts_group_under_their_customer() {
        let groups = group_customers(&document(), &vendor());
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Lonely", "Zeta Supply"]);

        let acme = &groups[0];
        assert_eq!(acme.accounts.len(), 1);
        assert_eq!(acme.accounts[0].id, "11");
        assert_eq!(acme.accounts[0].vendor, vendor());

        assert!(groups[1].accounts.is_empty());
        assert_eq!(groups[2].accounts[0].name, "Zeta Supply #2");
    }

    #[test]
    fn account_spanning_two_customers_is_listed_under_neither() {
        let groups = group_customers(&document(), &vendor());
        assert!(groups
            .iter()
            .flat_map(|g| &g.accounts)
            .all(|a| a.name != "Split Account" && a.name != "Unmapped"));
    }
}
