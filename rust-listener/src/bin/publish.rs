//! Incubator Publish - send one text message to the incubator exchange.
//!
//! Usage: `incubator-publish <routing-key> <message>`
//!
//! Uses the same `RABBITMQ_*` variables as the listener.

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listener::{ListenerConfig, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let mut args = std::env::args().skip(1);
    let (routing_key, body) = match (args.next(), args.next()) {
        (Some(key), Some(body)) => (key, body),
        _ => bail!("usage: incubator-publish <routing-key> <message>"),
    };

    let config = ListenerConfig::from_env();
    info!(exchange = %config.exchange, routing_key = %routing_key, "publish_starting");

    let publisher = Publisher::new(config);
    let result = publisher.publish(&routing_key, &body).await;
    publisher.close().await;

    result
}
