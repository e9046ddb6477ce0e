//! Lists the products the catalog knows, so that clients can offer them.

use actix_web::{
    get,
    web::{Data, ServiceConfig},
    HttpResponse,
};
use recommender_suggest::Recommender;
use serde::Serialize;

/// Configure a route to list catalog products.
pub fn configure(config: &mut ServiceConfig) {
    config.service(products);
}

/// The sorted names of all catalog products.
#[get("")]
async fn products(recommender: Data<Recommender>) -> HttpResponse {
    HttpResponse::Ok().json(ProductsResponse {
        products: recommender.catalog().products(),
    })
}

/// The response the API generates.
#[derive(Debug, Serialize)]
struct ProductsResponse<'a> {
    /// Product names.
    products: Vec<&'a str>,
}
