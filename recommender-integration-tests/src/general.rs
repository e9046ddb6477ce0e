//! Tests general behavior of the service, outside of any one endpoint.
#![cfg(test)]

use crate::{recommender_test, TestingTools};
use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::{header::HeaderValue, StatusCode};

#[actix_rt::test]
async fn root_of_services_provides_public_docs() -> Result<()> {
    recommender_test(
        |settings| settings.public_documentation = Some("https://example.com/".to_string()),
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/").send().await?;

            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(
                response.headers().get("location"),
                Some(&HeaderValue::from_static("https://example.com/"))
            );

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn root_of_services_has_a_fallback_message() -> Result<()> {
    recommender_test(
        |settings| settings.public_documentation = None,
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/").send().await?;

            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.text().await?.contains("/recommend?product="));

            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn request_durations_are_measured() -> Result<()> {
    recommender_test(
        |_| (),
        |TestingTools {
             test_client,
             mut metrics_watcher,
             ..
         }| async move {
            let response = test_client.get("/__lbheartbeat__").send().await?;
            assert_eq!(response.status(), StatusCode::OK);

            assert!(metrics_watcher.has_line(|line| line.starts_with("request.duration:")));

            Ok(())
        },
    )
    .await
}
