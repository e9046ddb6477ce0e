//! Middlewares for the recommender web service.

mod metrics;

pub use metrics::Metrics;
