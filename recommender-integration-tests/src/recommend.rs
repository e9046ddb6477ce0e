//! Tests the recommender's ability to recommend accessories.
#![cfg(test)]

use std::collections::HashSet;

use crate::{recommender_test, TestingTools, SEARCH_PATH};
use anyhow::Result;
use httpmock::{Method::GET, MockServer};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

/// The body of a successful recommendation response.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecommendResponse {
    recommended: Vec<String>,
}

impl RecommendResponse {
    fn as_set(&self) -> HashSet<&str> {
        self.recommended.iter().map(String::as_str).collect()
    }

    fn assert_well_formed(&self) {
        assert!(self.recommended.len() <= 6, "too many: {:?}", self.recommended);
        assert_eq!(
            self.as_set().len(),
            self.recommended.len(),
            "duplicates in {:?}",
            self.recommended
        );
    }
}

/// Answer any search with the given titles.
async fn mock_search<'a>(server: &'a MockServer, titles: &[&str]) -> httpmock::Mock<'a> {
    let items: Vec<_> = titles.iter().map(|t| json!({ "title": t })).collect();
    server
        .mock_async(|when, then| {
            when.method(GET).path(SEARCH_PATH);
            then.status(200).json_body(json!({ "items": items }));
        })
        .await
}

#[actix_rt::test]
async fn laptop_comes_from_the_catalog() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            let search = mock_search(&search_mock, &["should not appear"]).await;

            let response = test_client.get("/recommend?product=laptop").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: RecommendResponse = response.json().await?;
            body.assert_well_formed();
            assert!(body.recommended.len() <= 3);
            let allowed: HashSet<&str> = ["mouse", "keyboard", "monitor"].into_iter().collect();
            assert!(body.as_set().is_subset(&allowed));
            search.assert_hits_async(0).await;

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn laptop_and_phone_return_all_six() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            let search = mock_search(&search_mock, &[]).await;

            let response = test_client
                .get("/recommend")
                .query(&[("product", "laptop,phone")])
                .send()
                .await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: RecommendResponse = response.json().await?;
            body.assert_well_formed();
            let expected: HashSet<&str> =
                ["mouse", "keyboard", "monitor", "charger", "earphones", "case"]
                    .into_iter()
                    .collect();
            assert_eq!(body.as_set(), expected);
            search.assert_hits_async(0).await;

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn unknown_products_use_search_titles() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            let search = search_mock
                .mock_async(|when, then| {
                    when.method(GET)
                        .path(SEARCH_PATH)
                        .query_param("key", "test-api-key")
                        .query_param("cx", "test-engine-id")
                        .query_param("q", "drone")
                        .query_param("num", "6");
                    then.status(200).json_body(json!({
                        "items": [
                            { "title": "Drone Propellers" },
                            { "link": "https://example.com/untitled" },
                            { "title": "Drone Landing Pad" }
                        ]
                    }));
                })
                .await;

            let response = test_client.get("/recommend?product=%20Drone%20").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: RecommendResponse = response.json().await?;
            body.assert_well_formed();
            let expected: HashSet<&str> =
                ["Drone Propellers", "Drone Landing Pad"].into_iter().collect();
            assert_eq!(body.as_set(), expected);
            search.assert_hits_async(1).await;

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn many_titles_are_cut_to_six_without_duplicates() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            mock_search(
                &search_mock,
                &["A", "B", "C", "D", "E", "F", "case", "charger"],
            )
            .await;

            for _ in 0..5 {
                let response = test_client
                    .get("/recommend?product=drone,kite,phone")
                    .send()
                    .await?;

                assert_eq!(response.status(), StatusCode::OK);
                let body: RecommendResponse = response.json().await?;
                body.assert_well_formed();
                assert_eq!(body.recommended.len(), 6);
            }

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn search_errors_mean_no_recommendations() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let search = search_mock
                .mock_async(|when, then| {
                    when.method(GET).path(SEARCH_PATH);
                    then.status(500).body("upstream exploded");
                })
                .await;

            let response = test_client.get("/recommend?product=xyzzy123").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = response.json().await?;
            assert_eq!(body, json!({ "recommended": [] }));
            search.assert_hits_async(1).await;
            assert_eq!(metrics_watcher.count_named("recommend.fallback.error"), 1);

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn malformed_search_responses_mean_no_recommendations() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            search_mock
                .mock_async(|when, then| {
                    when.method(GET).path(SEARCH_PATH);
                    then.status(200).body("{ this is not json");
                })
                .await;

            let response = test_client.get("/recommend?product=xyzzy123").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = response.json().await?;
            assert_eq!(body, json!({ "recommended": [] }));

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn empty_search_results_mean_no_recommendations() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            search_mock
                .mock_async(|when, then| {
                    when.method(GET).path(SEARCH_PATH);
                    then.status(200)
                        .json_body(json!({ "kind": "customsearch#search" }));
                })
                .await;

            let response = test_client.get("/recommend?product=xyzzy123").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = response.json().await?;
            assert_eq!(body, json!({ "recommended": [] }));

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn search_failures_keep_catalog_results() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            search_mock
                .mock_async(|when, then| {
                    when.method(GET).path(SEARCH_PATH);
                    then.status(403);
                })
                .await;

            let response = test_client
                .get("/recommend?product=xyzzy123,book")
                .send()
                .await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body: RecommendResponse = response.json().await?;
            let expected: HashSet<&str> =
                ["pen", "notebook", "highlighter"].into_iter().collect();
            assert_eq!(body.as_set(), expected);

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn blank_queries_recommend_nothing() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             ..
         }| async move {
            let search = mock_search(&search_mock, &["should not appear"]).await;

            for query in ["", " , , "] {
                let response = test_client
                    .get("/recommend")
                    .query(&[("product", query)])
                    .send()
                    .await?;

                assert_eq!(response.status(), StatusCode::OK);
                let body: serde_json::Value = response.json().await?;
                assert_eq!(body, json!({ "recommended": [] }));
            }
            search.assert_hits_async(0).await;

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn missing_product_is_a_validation_error() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             search_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let search = mock_search(&search_mock, &["should not appear"]).await;

            let response = test_client.get("/recommend?q=laptop").send().await?;

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            let body: serde_json::Value = response.json().await?;
            assert!(body["error"].is_string());
            search.assert_hits_async(0).await;
            assert_eq!(metrics_watcher.count_named("recommend.items"), 0);

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn results_are_limited_by_settings() -> Result<()> {
    recommender_test(
        |settings| settings.recommend.max_results = 2,
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/recommend?product=laptop,phone")
                .send()
                .await?;

            let body: RecommendResponse = response.json().await?;
            assert_eq!(body.recommended.len(), 2);

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn metrics_report_item_and_result_counts() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             mut metrics_watcher,
             ..
         }| async move {
            let response = test_client
                .get("/recommend?product=laptop,phone")
                .send()
                .await?;
            assert_eq!(response.status(), StatusCode::OK);

            assert!(metrics_watcher.has_histogram("recommend.items", 2.0));
            assert!(metrics_watcher.has_histogram("recommend.count", 6.0));
            assert_eq!(metrics_watcher.count_named("recommend.catalog.hit"), 2);

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn cors_allows_any_origin_with_credentials() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/recommend?product=laptop")
                .header("Origin", "https://shop.example.com")
                .send()
                .await?;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response
                    .headers()
                    .get("access-control-allow-origin")
                    .map(|v| v.to_str().unwrap()),
                Some("https://shop.example.com")
            );
            assert_eq!(
                response
                    .headers()
                    .get("access-control-allow-credentials")
                    .map(|v| v.to_str().unwrap()),
                Some("true")
            );

            let preflight = test_client
                .options("/recommend")
                .header("Origin", "https://shop.example.com")
                .header("Access-Control-Request-Method", "GET")
                .header("Access-Control-Request-Headers", "x-custom-header")
                .send()
                .await?;

            assert_eq!(preflight.status(), StatusCode::OK);
            assert!(preflight
                .headers()
                .contains_key("access-control-allow-methods"));

            Ok(())
        },
    )
    .await
}
