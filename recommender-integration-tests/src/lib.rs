#![warn(missing_docs, clippy::missing_docs_in_private_items)]
// None of the tests are seen by the linter, so none of the utilities are marked
// as used. But docs don't generate for the below if they are `#[cfg(test)]`.
// This is a compromise.
#![allow(dead_code)]

//! Tests for the recommender that work by reading from the external API only.
//!
//! Since the URL endpoints the recommender exposes to the world are its public
//! API, and browser frontends depend on them, the paths used in tests here are
//! important details, and used to keep compatibility.
//!
//! This is structured as a separate crate so that it produces a single test
//! binary instead of one test per file like would happen if this were
//! `recommender/tests/...`. This improves compilation and test times.
//!
//! The primary tool used by tests is [`recommender_test`], which creates a mock
//! search API, sets up the application for testing, and provides helpers to
//! inspect the state of the app. It then calls the test function that is
//! passed to it, providing the above tools as an argument.
//!
//! ```
//! use recommender_integration_tests::{recommender_test, TestingTools};
//! use reqwest::StatusCode;
//!
//! #[actix_rt::test]
//! async fn lbheartbeat_works() {
//!     recommender_test(
//!         |_| (),
//!         |TestingTools { test_client, .. }| async move {
//!             let response = test_client
//!                 .get("/__lbheartbeat__")
//!                 .send()
//!                 .await
//!                 .expect("failed to execute request");
//!
//!             assert_eq!(response.status(), StatusCode::OK);
//!         },
//!     )
//!     .await
//! }
//! ```

mod dockerflow;
mod general;
mod products;
mod recommend;
mod utils;

pub use crate::utils::{
    metrics::MetricsWatcher,
    test_tools::{recommender_test, TestReqwestClient, TestingTools, SEARCH_PATH},
};
