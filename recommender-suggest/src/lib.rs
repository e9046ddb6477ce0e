#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Recommendation backends for the accessory recommender.
//!
//! A [`Recommender`] resolves each product of a query against the static
//! [`Catalog`], and asks a fallback [`SuggestionProvider`] about any product
//! the catalog does not know. In production that fallback is
//! [`CustomSearchProvider`], which uses the titles of web search results as
//! recommendations.

mod catalog;
mod query;
mod recommender;
mod search;

pub use crate::catalog::Catalog;
pub use crate::query::parse_products;
pub use crate::recommender::{sample, Recommender, MAX_RESULTS};
pub use crate::search::CustomSearchProvider;

use async_trait::async_trait;
use thiserror::Error;

/// A source of recommendations for a single product.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// An operator-visible name for this provider.
    fn name(&self) -> String;

    /// Provide recommendations for one normalized product name.
    async fn suggest(&self, product: &str) -> Result<Vec<String>, SuggestError>;
}

/// Errors that may occur while setting up a provider.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SetupError {
    #[error("This suggestions provider cannot be used with the current configuration: {0}")]
    InvalidConfiguration(#[source] anyhow::Error),

    #[error("There was a network error while setting up this suggestions provider: {0}")]
    Network(#[source] anyhow::Error),
}

/// Errors that may occur while querying for suggestions.
///
/// None of these reach API callers. A failed lookup contributes no
/// recommendations, and the kind is only reported in logs and metrics.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SuggestError {
    #[error("The provider did not respond in time: {0}")]
    Timeout(#[source] anyhow::Error),

    #[error("There was a network error while providing suggestions: {0}")]
    Network(#[source] anyhow::Error),

    #[error("The provider responded with HTTP status {0}")]
    Status(u16),

    #[error("The provider response could not be parsed: {0}")]
    Parse(#[source] anyhow::Error),
}

impl SuggestError {
    /// A short, stable label for this kind of error, for logs and metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Status(_) => "status",
            Self::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for SuggestError {
    fn from(error: reqwest::Error) -> Self {
        // The request URL carries the API key in its query string.
        let error = error.without_url();
        if error.is_timeout() {
            Self::Timeout(error.into())
        } else if error.is_decode() {
            Self::Parse(error.into())
        } else if let Some(status) = error.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(error.into())
        }
    }
}

impl From<serde_json::Error> for SuggestError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::SuggestError;

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            SuggestError::Timeout(anyhow::anyhow!("slow")).kind(),
            SuggestError::Network(anyhow::anyhow!("down")).kind(),
            SuggestError::Status(503).kind(),
            SuggestError::Parse(anyhow::anyhow!("junk")).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn json_errors_are_parse_errors() {
        let error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(SuggestError::from(error).kind(), "parse");
    }
}
