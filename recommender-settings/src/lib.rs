#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Recommender Settings
//!
//! Configuration is specified in several ways, with later methods overriding earlier ones.
//!
//! 1. A base configuration checked into the repository, in `config/base.yaml`.
//!    This provides the default values for most settings.
//! 2. Per-environment configuration files in the `config` directory. The
//!    environment is selected using the environment variable `RECOMMENDER_ENV`.
//!    The settings for that environment are then loaded from
//!    `config/${env}.yaml`, if it exists. The default environment is
//!    "development".
//! 3. A local configuration file not checked into the repository, at
//!    `config/local.yaml`. This file is in `.gitignore` and is the place for
//!    the search API credentials during local development.
//! 4. Environment variables that begin with `RECOMMENDER_` and have a separator
//!    of `__`. For example, `Settings::http::workers` can be controlled from the
//!    environment variable `RECOMMENDER_HTTP__WORKERS`.
//! 5. The environment variable `PORT`, which replaces only the port of
//!    `http.listen`. Hosting platforms commonly inject it.
//!
//! The search API credentials (`search.api_key` and `search.engine_id`) have
//! no default. Loading fails if they are not provided by one of the layers
//! above.
//!
//! Tests should use `Settings::load_for_tests` which only reads from
//! `config/base.yaml`, `config/test.yaml`, and `config/local_test.yaml` (if it
//! exists). It does not read from environment variables.

mod catalog;
mod logging;

pub use catalog::CatalogSettings;
pub use logging::{DirectiveWrapper, LogFormat, LoggingSettings};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::{net::SocketAddr, time::Duration};

/// Top level settings object for the recommender.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// The environment the service is running in. Should only be set with the
    /// `RECOMMENDER_ENV` environment variable.
    pub env: String,

    /// Enable additional features to debug the application. This should not be
    /// set to true in production environments.
    pub debug: bool,

    /// Settings for the HTTP server.
    pub http: HttpSettings,

    /// Logging settings.
    pub logging: LoggingSettings,

    /// Whether the queried product list should be included in request logs.
    pub log_full_request: bool,

    /// Metrics settings.
    pub metrics: MetricsSettings,

    /// Settings for the external search fallback.
    pub search: SearchSettings,

    /// Settings for the recommend operation.
    pub recommend: RecommendSettings,

    /// The static product catalog.
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// A URL to redirect visitors of the root path to.
    pub public_documentation: Option<String>,
}

/// Settings for the HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpSettings {
    /// The host and port to listen on, such as "127.0.0.1:8080" or "0.0.0.0:80".
    pub listen: SocketAddr,

    /// The number of workers to use. Optional. If no value is provided, the
    /// number of logical cores will be used.
    pub workers: Option<usize>,
}

/// Settings for the statsd metrics sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// The host to send metrics to.
    pub sink_host: String,

    /// The port to send metrics to.
    pub sink_port: u16,

    /// The maximum number of metrics buffered before new ones are dropped.
    pub max_queue_size: usize,
}

/// Settings for the web search API queried for products missing from the
/// catalog.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchSettings {
    /// The search API URL, such as `https://www.googleapis.com/customsearch/v1`.
    pub endpoint: String,

    /// The API key sent with every search request.
    pub api_key: String,

    /// The identifier of the search engine (the search scope) to query.
    pub engine_id: String,

    /// How many results to request for each product.
    pub result_count: u8,

    /// The total time allowed for one search request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms")]
    pub timeout: Duration,

    /// The time allowed to establish a connection to the search API.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
}

/// Settings for the recommend operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendSettings {
    /// The maximum number of recommendations in one response. At most 6.
    pub max_results: usize,

    /// How many fallback lookups for one request may be in flight at once.
    pub max_concurrent_lookups: usize,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    /// If any of the configured values are invalid, if any of the required
    /// configuration files are missing, or if a required value such as the
    /// search API key has not been provided.
    pub fn load() -> Result<Self, ConfigError> {
        let recommender_env =
            std::env::var("RECOMMENDER_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Start off with the base config.
            .add_source(File::with_name("./config/base"))
            .set_override("env", recommender_env.as_str())?
            // Merge in an environment specific config.
            .add_source(File::with_name(&format!("config/{}", recommender_env)).required(false))
            // Add a local configuration file that is `.gitignore`ed.
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables that start with "RECOMMENDER_" and have
            // "__" to separate levels. For example, `RECOMMENDER_HTTP__LISTEN`
            // maps to `Settings::http::listen`.
            .add_source(
                Environment::with_prefix("RECOMMENDER")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let mut settings: Self = builder.build()?.try_deserialize()?;
        if let Ok(port) = std::env::var("PORT") {
            settings.apply_port(&port)?;
        }
        Ok(settings)
    }

    /// Load settings from configuration files for tests.
    ///
    /// `changer` is called with the loaded settings, to adjust them for a
    /// specific test.
    ///
    /// # Panics
    /// If the test configuration files cannot be read or are invalid.
    pub fn load_for_tests<F: FnOnce(&mut Self)>(changer: F) -> Self {
        let mut config: Self = Config::builder()
            // Start off with the base config.
            .add_source(File::with_name("../config/base"))
            // Merge in test specific config.
            .set_override("env", "test")
            .expect("Could not set env for tests")
            .add_source(File::with_name("../config/test"))
            // Add a local configuration file that is `.gitignore`ed.
            .add_source(File::with_name("../config/local_test").required(false))
            .build()
            .expect("Could not load settings for tests")
            .try_deserialize()
            .expect("Could not convert settings");
        changer(&mut config);
        config
    }

    /// Replace the port of `http.listen` with `port`, keeping the host.
    fn apply_port(&mut self, port: &str) -> Result<(), ConfigError> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("PORT is not a valid port: {:?}", port)))?;
        self.http.listen.set_port(port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn test_settings_load() {
        let settings = Settings::load_for_tests(|_| ());
        assert_eq!(settings.env, "test");
        assert_eq!(settings.recommend.max_results, 6);
        assert_eq!(settings.recommend.max_concurrent_lookups, 4);
        assert_eq!(settings.search.result_count, 6);
        assert!(!settings.search.api_key.is_empty());
        assert!(!settings.search.engine_id.is_empty());
    }

    #[test]
    fn test_changer_is_applied() {
        let settings = Settings::load_for_tests(|settings| settings.recommend.max_results = 3);
        assert_eq!(settings.recommend.max_results, 3);
    }

    #[test]
    fn test_default_catalog_is_used_when_unconfigured() {
        let settings = Settings::load_for_tests(|_| ());
        assert_eq!(
            settings.catalog.products.get("laptop"),
            Some(&vec![
                "mouse".to_string(),
                "keyboard".to_string(),
                "monitor".to_string()
            ])
        );
    }

    #[test]
    fn test_port_override_keeps_host() {
        let mut settings = Settings::load_for_tests(|settings| {
            settings.http.listen = "0.0.0.0:8000".parse().unwrap();
        });
        settings.apply_port(" 9090 ").expect("port should parse");
        assert_eq!(settings.http.listen.to_string(), "0.0.0.0:9090");
    }

    #[test]
    fn test_port_override_rejects_garbage() {
        let mut settings = Settings::load_for_tests(|_| ());
        assert!(settings.apply_port("eighty").is_err());
        assert!(settings.apply_port("70000").is_err());
    }
}
