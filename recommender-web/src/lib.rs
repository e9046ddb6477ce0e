#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Web server for the accessory recommender's public API.

mod debug;
mod dockerflow;
mod errors;
mod logging;
mod middleware;
mod products;
mod recommend;

use actix_cors::Cors;
use actix_web::{
    dev::Server,
    get,
    web::{self, Data},
    App, HttpResponse, HttpServer,
};
use cadence::StatsdClient;
use recommender_settings::Settings;
use recommender_suggest::Recommender;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

use crate::logging::RecommenderRootSpanBuilder;

pub use crate::errors::{HandlerError, HandlerErrorKind};

/// Run the web server
///
/// The returned server is a `Future` that must either be `.await`ed, or run it
/// as a background task using `tokio::spawn`.
///
/// Most of the details from `settings` will be respected, except for those that
/// go into building the listener (the host and port). If you want to respect the
/// settings specified in that object, you must include them in the construction
/// of `listener`.
///
/// The `recommender` is shared read-only between all workers.
///
/// # Errors
///
/// Returns an error if the server cannot be started on the provided listener.
///
/// # Examples
///
/// Run the server in the foreground. This will only return if there is an error
/// that causes the server to shut down.
///
/// ```no_run
/// # actix_rt::System::new().block_on(async {
/// use cadence::{NopMetricSink, StatsdClient};
/// use recommender_settings::Settings;
/// use recommender_suggest::Recommender;
///
/// let listener = std::net::TcpListener::bind("127.0.0.1:8000")
///     .expect("Failed to bind port");
/// let settings = Settings::load().expect("Failed to load settings");
/// let metrics_client = StatsdClient::from_sink("recommender", NopMetricSink);
/// let recommender = Recommender::from_settings(&settings, metrics_client.clone())
///     .expect("Failed to set up recommender");
/// recommender_web::run(listener, metrics_client, settings, recommender)
///     .expect("Failed to start server")
///     .await
///     .expect("Fatal error while running server");
/// # })
/// ```
pub fn run(
    listener: TcpListener,
    metrics_client: StatsdClient,
    settings: Settings,
    recommender: Recommender,
) -> Result<Server, std::io::Error> {
    let num_workers = settings.http.workers;
    let recommender = Data::new(recommender);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(settings.clone()))
            .app_data(recommender.clone())
            .app_data(metrics_client.clone())
            .wrap(middleware::Metrics)
            .wrap(TracingLogger::<RecommenderRootSpanBuilder>::new())
            .wrap(Cors::permissive())
            .configure(configure_app)
    })
    .listen(listener)?;

    if let Some(n) = num_workers {
        server = server.workers(n);
    }

    let server = server.run();
    Ok(server)
}

/// Register every route of the recommender. Does not include middleware or
/// application data.
pub fn configure_app(config: &mut web::ServiceConfig) {
    config
        // The core functionality of the recommender
        .service(web::scope("recommend").configure(recommend::configure))
        .service(web::scope("products").configure(products::configure))
        // Add some debugging views
        .service(web::scope("debug").configure(debug::configure))
        .service(root_info)
        // Add the behavior necessary to satisfy Dockerflow.
        .service(web::scope("").configure(dockerflow::configure));
}

/// The root view, to provide information about what this service is.
///
/// This is intended to be seen by people trying to investigate what this service
/// is. It should redirect to documentation, if it is available, or provide a
/// short message otherwise.
#[get("/")]
async fn root_info(settings: Data<Settings>) -> HttpResponse {
    match &settings.public_documentation {
        Some(redirect_url) => HttpResponse::Found()
            .insert_header(("location", redirect_url.to_string()))
            .finish(),
        None => HttpResponse::Ok().content_type("text/plain").body(
            "This service recommends accessories for products. Try /recommend?product=laptop",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::configure_app;
    use actix_web::{
        http::StatusCode,
        test::{self, TestRequest},
        web::Data,
        App,
    };
    use async_trait::async_trait;
    use cadence::{NopMetricSink, StatsdClient};
    use pretty_assertions::assert_eq;
    use recommender_settings::{CatalogSettings, Settings};
    use recommender_suggest::{Catalog, Recommender, SuggestError, SuggestionProvider};
    use serde_json::{json, Value};

    /// A fallback that must never be reached.
    struct UnreachableProvider;

    #[async_trait]
    impl SuggestionProvider for UnreachableProvider {
        fn name(&self) -> String {
            "unreachable".to_string()
        }

        async fn suggest(&self, product: &str) -> Result<Vec<String>, SuggestError> {
            panic!("fallback called for {}", product);
        }
    }

    fn settings() -> Settings {
        Settings::load_for_tests(|_| ())
    }

    fn recommender() -> Recommender {
        Recommender::new(
            Catalog::from(&CatalogSettings::default()),
            Box::new(UnreachableProvider),
            6,
            StatsdClient::from_sink("recommender-test", NopMetricSink),
        )
    }

    macro_rules! test_app {
        ($settings:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new($settings))
                    .app_data(Data::new(recommender()))
                    .configure(configure_app),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn missing_product_is_unprocessable() {
        let app = test_app!(settings());
        let response =
            test::call_service(&app, TestRequest::get().uri("/recommend").to_request()).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(response).await;
        assert!(body["error"]
            .as_str()
            .expect("error message")
            .contains("product"));
    }

    #[actix_rt::test]
    async fn empty_product_recommends_nothing() {
        let app = test_app!(settings());
        let response = test::call_service(
            &app,
            TestRequest::get().uri("/recommend?product=").to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body, json!({ "recommended": [] }));
    }

    #[actix_rt::test]
    async fn catalog_products_are_recommended() {
        let app = test_app!(settings());
        let response = test::call_service(
            &app,
            TestRequest::get()
                .uri("/recommend?product=Laptop%2Cphone")
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        let mut recommended: Vec<String> =
            serde_json::from_value(body["recommended"].clone()).unwrap();
        recommended.sort();
        assert_eq!(
            recommended,
            vec!["case", "charger", "earphones", "keyboard", "monitor", "mouse"]
        );
    }

    #[actix_rt::test]
    async fn products_lists_the_catalog() {
        let app = test_app!(settings());
        let response =
            test::call_service(&app, TestRequest::get().uri("/products").to_request()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(
            body,
            json!({
                "products": ["book", "car", "headphones", "laptop", "phone", "tablet", "watch"]
            })
        );
    }

    #[actix_rt::test]
    async fn root_redirects_to_documentation() {
        let mut settings = settings();
        settings.public_documentation = Some("https://example.com/".to_string());
        let app = test_app!(settings);
        let response = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://example.com/"
        );
    }

    #[actix_rt::test]
    async fn debug_settings_hide_the_api_key() {
        let app = test_app!(settings());
        let response = test::call_service(
            &app,
            TestRequest::get().uri("/debug/settings").to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["search"]["api_key"], json!("<redacted>"));
        assert_eq!(body["search"]["engine_id"], json!("test-engine-id"));
    }

    #[actix_rt::test]
    async fn debug_settings_are_hidden_outside_debug_mode() {
        let mut settings = settings();
        settings.debug = false;
        let app = test_app!(settings);
        let response = test::call_service(
            &app,
            TestRequest::get().uri("/debug/settings").to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
