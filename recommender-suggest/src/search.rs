//! A suggestion provider that uses the titles of web search results as
//! recommendations.
//!
//! It speaks the Google Custom Search JSON API: a `GET` with the API key, the
//! search engine ID, the query and the result count, answered by an object
//! whose `items` each may carry a `title`.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use recommender_settings::SearchSettings;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{SetupError, SuggestError, SuggestionProvider};

/// User-Agent sent to the search API.
const REQWEST_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The most results the search API returns for a single request.
const MAX_RESULT_COUNT: u8 = 10;

/// A provider that queries an external web search API.
pub struct CustomSearchProvider {
    /// The HTTP client used for every search. It pools connections, and each
    /// response is consumed or dropped before `suggest` returns.
    client: reqwest::Client,
    /// Where to send searches.
    endpoint: Url,
    /// The API key.
    api_key: String,
    /// The search engine (search scope) to query.
    engine_id: String,
    /// How many results to ask for.
    result_count: u8,
}

/// The part of the search API response that is used.
#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    /// The results. Absent when the search matched nothing.
    #[serde(default)]
    items: Option<Vec<SearchItem>>,
}

/// A single search result.
#[derive(Debug, Deserialize)]
struct SearchItem {
    /// The title of the result page, if the API provided one.
    title: Option<String>,
}

impl SearchResponse {
    /// The titles of all results that have one, in the order returned.
    fn into_titles(self) -> Vec<String> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| item.title)
            .collect()
    }
}

impl CustomSearchProvider {
    /// Create a search provider from settings.
    ///
    /// # Errors
    /// If the credentials are blank, the endpoint is not a URL, the result
    /// count is out of range, or the HTTP client cannot be built.
    pub fn new(config: &SearchSettings) -> Result<Self, SetupError> {
        if config.api_key.trim().is_empty() {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "search.api_key must be provided"
            )));
        }
        if config.engine_id.trim().is_empty() {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "search.engine_id must be provided"
            )));
        }
        if !(1..=MAX_RESULT_COUNT).contains(&config.result_count) {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "search.result_count must be between 1 and {}",
                MAX_RESULT_COUNT
            )));
        }
        let endpoint = Url::parse(&config.endpoint)
            .context("parsing search.endpoint")
            .map_err(SetupError::InvalidConfiguration)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(REQWEST_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Unable to create the Reqwest client")
            .map_err(SetupError::Network)?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            result_count: config.result_count,
        })
    }

    /// Create a boxed search provider from settings.
    ///
    /// # Errors
    /// See [`CustomSearchProvider::new`].
    pub fn new_boxed(config: &SearchSettings) -> Result<Box<Self>, SetupError> {
        Self::new(config).map(Box::new)
    }
}

#[async_trait]
impl SuggestionProvider for CustomSearchProvider {
    fn name(&self) -> String {
        "CustomSearchProvider".to_owned()
    }

    async fn suggest(&self, product: &str) -> Result<Vec<String>, SuggestError> {
        let result_count = self.result_count.to_string();
        tracing::debug!(r#type = "suggest.search.request", %product, "Searching for product");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", product),
                ("num", result_count.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SuggestError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&body)?;
        Ok(parsed.into_titles())
    }
}
