//! Tools for running tests

use crate::utils::metrics::MetricsWatcher;
use httpmock::MockServer;
use recommender_settings::Settings;
use recommender_suggest::Recommender;
use reqwest::{redirect, Client, ClientBuilder, RequestBuilder};
use std::{future::Future, net::TcpListener};
use tracing::{instrument::WithSubscriber, Instrument};
use tracing_subscriber::layer::SubscriberExt;

/// The path the mock search API answers on.
pub const SEARCH_PATH: &str = "/customsearch/v1";

/// Run a test with a fully configured recommender server.
///
/// The server will listen on a port assigned arbitrarily by the OS.
///
/// A suite of tools will be passed to the test function in the form of an
/// instance of [`TestingTools`]. It includes an HTTP client configured to use
/// the test server, an HTTP mock server that the search fallback has been
/// configured to query, and a metrics collector that can make assertions about
/// metrics that were sent.
///
/// # Example
///
/// ```
/// # use recommender_integration_tests::{recommender_test, TestingTools};
/// #[actix_rt::test]
/// async fn a_test() {
///     recommender_test(
///         |settings| settings.debug = false,
///         |TestingTools { test_client, .. }| async move {
///             assert!(true) // Test goes here
///         }
///     ).await
/// }
/// ```
///
/// # Panics
/// May panic if tests could not be set up correctly.
pub async fn recommender_test<FSettings, FTest, Fut>(
    settings_changer: FSettings,
    test: FTest,
) -> Fut::Output
where
    FSettings: FnOnce(&mut Settings),
    FTest: FnOnce(TestingTools) -> Fut,
    Fut: Future,
{
    let test_span = tracing::info_span!("recommender_test");

    // Load settings
    let mut settings = Settings::load_for_tests(|_| ());

    // Set up logging
    let env_filter: tracing_subscriber::EnvFilter = (&settings.logging.levels).into();
    let tracing_subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().pretty().with_test_writer());
    let _tracing_subscriber_guard = tracing::subscriber::set_default(tracing_subscriber);

    // Set up a mock server for the search fallback to talk to
    let search_mock = MockServer::start_async().await;
    settings.search.endpoint = search_mock.url(SEARCH_PATH);

    settings_changer(&mut settings);

    // Setup metrics
    let (metrics_watcher, metrics_client) = MetricsWatcher::new_with_client();

    // Run server in the background
    let listener = TcpListener::bind(settings.http.listen).expect("Failed to bind to a port");
    let address = listener
        .local_addr()
        .expect("Listener has no local address")
        .to_string();
    let recommender = Recommender::from_settings(&settings, metrics_client.clone())
        .expect("Failed to set up recommender");
    let server = recommender_web::run(listener, metrics_client, settings, recommender)
        .expect("Failed to start server");
    let server_handle = tokio::spawn(server.with_current_subscriber());
    let test_client = TestReqwestClient::new(address);

    // Assemble the tools
    let tools = TestingTools {
        test_client,
        search_mock,
        metrics_watcher,
    };
    // Run the test
    let rv = test(tools).instrument(test_span).await;
    server_handle.abort();
    rv
}

/// A set of tools for tests, including mock servers and metrics helpers.
///
/// The fields of this struct are marked as non-exhaustive, meaning that any
/// destructuring of this struct will require a `..` "and the rest" entry, even
/// if all present items are named. This makes adding tools in the future easier,
/// since old tests won't need to be rewritten to account for the added tools.
#[non_exhaustive]
pub struct TestingTools {
    /// A wrapper around a `reqwest::client` that automatically uses the
    /// recommender server under test.
    pub test_client: TestReqwestClient,

    /// A [`httpmock::MockServer`] that the search fallback has been configured
    /// to query at [`SEARCH_PATH`]. Does not contain mock responses, any needed
    /// must be added.
    pub search_mock: MockServer,

    /// To make assertions about metrics.
    pub metrics_watcher: MetricsWatcher,
}

/// A wrapper around a `[reqwest::client]` that automatically sends requests to
/// the test server.
///
/// This only handles `GET` and `OPTIONS` requests right now. Other methods
/// should be added as needed.
///
/// The client is configured to not follow any redirects.
pub struct TestReqwestClient {
    /// The wrapped client.
    client: Client,

    /// The server address to implicitly use for all requests.
    address: String,
}

impl TestReqwestClient {
    /// Construct a new test client that uses `address` for every request given.
    pub fn new(address: String) -> Self {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::none())
            .build()
            .expect("Could not build test client");
        Self { client, address }
    }

    /// Start building a GET request to the test server with the path specified.
    ///
    /// The path should start with `/`, such as `/__heartbeat__`.
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    /// Start building an OPTIONS request to the test server, as a browser
    /// would send for a CORS preflight.
    pub fn options(&self, path: &str) -> RequestBuilder {
        self.client.request(reqwest::Method::OPTIONS, self.url(path))
    }

    /// The full URL of `path` on the test server.
    fn url(&self, path: &str) -> String {
        assert!(path.starts_with('/'));
        format!("http://{}{}", &self.address, path)
    }
}
