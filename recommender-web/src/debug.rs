//! An actix-web service to introspect the recommender if the `debug` setting
//! is enabled. The handlers here should all verify that debug is enabled.

use actix_web::{
    get,
    web::{self, Data},
    HttpResponse,
};
use recommender_settings::Settings;

/// Placeholder shown instead of secrets.
const REDACTED: &str = "<redacted>";

/// Configure the debug routes.
pub fn configure(config: &mut web::ServiceConfig) {
    config.service(settings);
}

/// In debug mode, show the settings of the app, without the search API key.
#[get("settings")]
async fn settings(settings: Data<Settings>) -> HttpResponse {
    if settings.debug {
        let mut shown = settings.get_ref().clone();
        shown.search.api_key = REDACTED.to_string();
        HttpResponse::Ok().json(shown)
    } else {
        HttpResponse::NotFound().body("")
    }
}
