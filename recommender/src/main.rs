#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! A web API that recommends accessories for a list of products.
//!
//! The recommender is split into several subcrates that work in collaboration.
//!
//! - [recommender-settings](../recommender_settings/index.html)
//! - [recommender-suggest](../recommender_suggest/index.html)
//! - [recommender-web](../recommender_web/index.html)
//! - [recommender-integration-tests](../recommender_integration_tests/index.html)

use anyhow::{Context, Result};
use cadence::{QueuingMetricSink, StatsdClient, UdpMetricSink};
use recommender_settings::{LogFormat, MetricsSettings, Settings};
use recommender_suggest::Recommender;
use std::net::{TcpListener, UdpSocket};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Primary entry point
#[actix_rt::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Loading settings")?;
    init_logging(&settings).context("Setting up logging")?;
    let metrics_client = init_metrics(&settings.metrics).context("Setting up metrics")?;
    let recommender = Recommender::from_settings(&settings, metrics_client.clone())
        .context("Setting up recommender")?;
    let listener = TcpListener::bind(settings.http.listen).context("Binding port")?;

    tracing::info!(
        r#type = "app.starting",
        listen = %settings.http.listen,
        env = %settings.env,
        "Starting recommender"
    );

    recommender_web::run(listener, metrics_client, settings, recommender)
        .context("Starting recommender-web server")?
        .await
        .context("Running recommender-web server")?;

    Ok(())
}

/// Set up logging, based on settings and the `RUST_LOG` environment variable.
fn init_logging(settings: &Settings) -> Result<()> {
    LogTracer::init()?;
    let env_filter: EnvFilter = (&settings.logging.levels).into();
    let registry = tracing_subscriber::registry().with(env_filter);

    match settings.logging.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().pretty()),
        )?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        )?,
        LogFormat::Compact => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().compact()),
        )?,
    };

    Ok(())
}

/// Set up a statsd client that sends metrics over UDP from a background queue.
fn init_metrics(settings: &MetricsSettings) -> Result<StatsdClient> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Binding metrics socket")?;
    socket
        .set_nonblocking(true)
        .context("Configuring metrics socket")?;
    let udp_sink = UdpMetricSink::from((settings.sink_host.as_str(), settings.sink_port), socket)
        .context("Creating metrics sink")?;
    let sink = QueuingMetricSink::with_capacity(udp_sink, settings.max_queue_size);

    Ok(StatsdClient::builder("recommender", sink)
        .with_error_handler(|error| {
            tracing::warn!(r#type = "app.metrics.error", %error, "Could not send metric");
        })
        .build())
}
