//! Async RabbitMQ publisher for sending text messages to the exchange.
//!
//! Used by the `incubator-publish` tool and the broker-backed tests to feed
//! the listener. The connection is opened lazily on first publish.

use std::sync::Arc;

use anyhow::{Context, Result};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ListenerConfig;

/// Async RabbitMQ publisher with connection management.
///
/// The publisher keeps one connection and channel, opening new ones when the
/// previous channel is no longer connected.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    config: ListenerConfig,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a new publisher for the configured broker and exchange.
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                config,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        let config = &self.inner.config;
        config.validate().context("Invalid publisher configuration")?;
        let url = config.amqp_url().context("Invalid broker url")?;

        info!(host = %config.host, port = config.port, "rabbitmq_publisher_connecting");

        let conn = Connection::connect(url.as_str(), ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        if config.declare_exchange {
            ch.exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to declare exchange")?;

            info!(exchange = %config.exchange, "rabbitmq_exchange_declared");
        }

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish a text message to the exchange with the given routing key.
    pub async fn publish(&self, routing_key: &str, body: &str) -> Result<()> {
        let channel = self.ensure_connected().await?;
        let exchange = &self.inner.config.exchange;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await
            .context("Failed to publish message")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            exchange = %exchange,
            routing_key = %routing_key,
            body_length = body.len(),
            "rabbitmq_message_published"
        );

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}
