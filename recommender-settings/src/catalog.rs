//! The product catalog, as configured.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The products the recommender knows about without asking the search API.
///
/// If `catalog.products` is present in configuration it replaces the built in
/// table entirely.
///
/// ```yaml
/// # config/local.yaml
/// catalog:
///   products:
///     camera: [tripod, memory card, lens cloth]
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CatalogSettings {
    /// Product name to the accessories recommended for it, in order.
    pub products: BTreeMap<String, Vec<String>>,
}

/// The built in product table.
const DEFAULT_PRODUCTS: &[(&str, &[&str])] = &[
    ("laptop", &["mouse", "keyboard", "monitor"]),
    ("phone", &["charger", "earphones", "case"]),
    ("book", &["pen", "notebook", "highlighter"]),
    ("car", &["seat cover", "air freshener", "phone mount"]),
    ("watch", &["strap", "case", "screen guard"]),
    (
        "headphones",
        &["audio splitter", "headphone stand", "bluetooth adapter"],
    ),
    ("tablet", &["stylus", "cover", "screen protector"]),
];

impl Default for CatalogSettings {
    fn default() -> Self {
        let products = DEFAULT_PRODUCTS
            .iter()
            .map(|(product, accessories)| {
                (
                    (*product).to_string(),
                    accessories.iter().map(|a| (*a).to_string()).collect(),
                )
            })
            .collect();
        Self { products }
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogSettings;

    #[test]
    fn default_has_seven_products_with_three_accessories_each() {
        let catalog = CatalogSettings::default();
        assert_eq!(catalog.products.len(), 7);
        assert!(catalog.products.values().all(|a| a.len() == 3));
    }

    #[test]
    fn configured_products_replace_defaults() {
        let catalog: CatalogSettings = serde_json::from_value(serde_json::json!({
            "products": { "camera": ["tripod"] }
        }))
        .expect("valid catalog");
        assert_eq!(catalog.products.len(), 1);
        assert_eq!(catalog.products["camera"], vec!["tripod".to_string()]);
    }
}
