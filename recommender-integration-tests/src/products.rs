//! Tests the listing of catalog products.
#![cfg(test)]

use crate::{recommender_test, TestingTools};
use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;

#[actix_rt::test]
async fn products_lists_the_default_catalog() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/products").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = response.json().await?;
            assert_eq!(
                body,
                json!({
                    "products": ["book", "car", "headphones", "laptop", "phone", "tablet", "watch"]
                })
            );

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn configured_catalog_replaces_the_default() -> Result<()> {
    recommender_test(
        |settings| {
            settings.catalog.products.clear();
            settings.catalog.products.insert(
                "Camera".to_string(),
                vec!["tripod".to_string(), "lens cloth".to_string()],
            );
        },
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/products").send().await?;
            let body: serde_json::Value = response.json().await?;
            assert_eq!(body, json!({ "products": ["camera"] }));

            let response = test_client.get("/recommend?product=CAMERA").send().await?;
            let body: serde_json::Value = response.json().await?;
            let mut recommended: Vec<String> = serde_json::from_value(body["recommended"].clone())?;
            recommended.sort();
            assert_eq!(recommended, vec!["lens cloth", "tripod"]);

            // Laptop is no longer known, so it falls back to search. No mock
            // answers on the search server, which counts as a failed search.
            let response = test_client.get("/recommend?product=laptop").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = response.json().await?;
            assert_eq!(body, json!({ "recommended": [] }));

            Ok(())
        },
    )
    .await
}
