// In-memory pricing cache for the interactive session. Pricing is fetched
// once per account and product class, then edited in place as attributes
// are changed.

use std::collections::HashMap;

use crate::models::ProductClass;
use crate::pricing::{set_attr_value, PricingMap};

/// Pricing fetched during this run, keyed by product class and account id.
/// Nothing is written to disk; a restart starts empty.
#[derive(Debug, Default)]
pub struct PricingCache {
    entries: HashMap<(ProductClass, String), PricingMap>,
}

impl PricingCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn get(&self, class: ProductClass, customer_id: &str) -> Option<&PricingMap> {
        self.entries.get(&(class, customer_id.to_string()))
    }

    #[cfg(test)]
    fn insert(&mut self, class: ProductClass, customer_id: &str, pricing: PricingMap) {
        self.entries.insert((class, customer_id.to_string()), pricing);
    }

    /// Cached pricing, or the result of `fetch` stored for next time.
    /// Errors are not cached.
    pub fn get_or_try_insert_with<E, F>(
        &mut self,
        class: ProductClass,
        customer_id: &str,
        fetch: F,
    ) -> Result<&PricingMap, E>
    where
        F: FnOnce() -> Result<PricingMap, E>,
    {
        let key = (class, customer_id.to_string());
        if !self.entries.contains_key(&key) {
            let pricing = fetch()?;
            self.entries.insert(key.clone(), pricing);
        } else {
            tracing::debug!(customer_id, class = class.wire_name(), "pricing cache hit");
        }
        Ok(&self.entries[&key])
    }

    /// Drop every cached class for one account.
    pub fn invalidate_customer(&mut self, customer_id: &str) {
        self.entries.retain(|(_, id), _| id != customer_id);
    }

    /// Apply an edited attribute value to the account's cached pricing.
    /// `kind` is the attribute's resource type. Returns the number of
    /// attributes updated.
    pub fn update_attr_value(
        &mut self,
        customer_id: &str,
        kind: &str,
        attr_id: &str,
        value: &str,
    ) -> usize {
        self.entries
            .iter_mut()
            .filter(|((_, id), _)| id == customer_id)
            .map(|(_, pricing)| set_attr_value(pricing, kind, attr_id, value))
            .sum()
    }
}
