//! Web handlers for the recommendations API.

use actix_web::{
    error::QueryPayloadError,
    get,
    web::{self, Data, ServiceConfig},
    HttpRequest, HttpResponse,
};
use recommender_settings::Settings;
use recommender_suggest::Recommender;
use serde::{Deserialize, Serialize};

use crate::errors::HandlerErrorKind;

/// Configure a route to use the recommend service.
pub fn configure(config: &mut ServiceConfig) {
    config
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .service(recommend);
}

/// Recommend accessories for the products in the query.
#[get("")]
#[tracing::instrument(skip(query, recommender, settings))]
async fn recommend(
    query: web::Query<RecommendQuery>,
    recommender: Data<Recommender>,
    settings: Data<Settings>,
) -> HttpResponse {
    safe_log_request(settings.log_full_request, &query);

    let recommended = recommender.recommend(&query.product).await;

    tracing::debug!(
        r#type = "web.recommend.provided-count",
        recommendation_count = recommended.len(),
        "Providing recommendations"
    );

    HttpResponse::Ok().json(RecommendResponse { recommended })
}

/// Query parameters.
#[derive(Debug, Deserialize)]
struct RecommendQuery {
    /// Comma separated product names. Required.
    product: String,
}

/// The response the API generates.
#[derive(Debug, Serialize)]
struct RecommendResponse {
    /// At most six accessory names, in random order.
    recommended: Vec<String>,
}

/// Map a query string that does not deserialize, such as one without
/// `product`, to a validation error.
fn query_error(error: QueryPayloadError, _request: &HttpRequest) -> actix_web::Error {
    HandlerErrorKind::InvalidQuery(error.to_string()).into()
}

/// Log a recommendation request, respecting the log_query setting passed.
fn safe_log_request(log_query: bool, query: &RecommendQuery) {
    let product = if log_query {
        query.product.as_str()
    } else {
        ""
    };

    tracing::info!(
        r#type = "web.recommend.request",
        sensitive = true,
        %product,
        "handling recommendation request"
    );
}
