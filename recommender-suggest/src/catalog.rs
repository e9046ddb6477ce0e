//! The static product catalog.

use recommender_settings::CatalogSettings;
use std::collections::{hash_map::Entry, HashMap};

/// An immutable mapping from a lower-cased product name to the accessories
/// recommended for it.
///
/// Built once at startup and shared read-only between all requests.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    /// Normalized product name to accessories, in their configured order.
    products: HashMap<String, Vec<String>>,
}

impl Catalog {
    /// Build a catalog from `(product, accessories)` pairs. Product names are
    /// trimmed and lower-cased so that they match normalized queries.
    ///
    /// Names that normalize to the same product are merged: the accessories
    /// of later entries are appended to the earlier ones, skipping repeats.
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: AsRef<str>,
    {
        let mut products: HashMap<String, Vec<String>> = HashMap::new();
        for (name, accessories) in entries {
            let product = name.as_ref().trim().to_lowercase();
            match products.entry(product) {
                Entry::Vacant(entry) => {
                    entry.insert(accessories);
                }
                Entry::Occupied(mut entry) => {
                    tracing::warn!(
                        r#type = "suggest.catalog.duplicate-product",
                        product = %entry.key(),
                        configured_as = %name.as_ref(),
                        "Catalog product configured more than once, merging accessories"
                    );
                    let existing = entry.get_mut();
                    for accessory in accessories {
                        if !existing.contains(&accessory) {
                            existing.push(accessory);
                        }
                    }
                }
            }
        }
        Self { products }
    }

    /// The accessories for `product`, if it is a catalog entry.
    pub fn get(&self, product: &str) -> Option<&[String]> {
        self.products.get(product).map(Vec::as_slice)
    }

    /// The names of all products in the catalog, sorted.
    pub fn products(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.products.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The number of products in the catalog.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalog has no products at all.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl From<&CatalogSettings> for Catalog {
    fn from(settings: &CatalogSettings) -> Self {
        Self::new(
            settings
                .products
                .iter()
                .map(|(product, accessories)| (product, accessories.clone())),
        )
    }
}
