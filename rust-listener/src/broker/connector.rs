//! RabbitMQ subscription setup using lapin.
//!
//! [`connect`] makes a single connection attempt, declares an exclusive,
//! auto-deleting, server-named queue, binds it to every configured routing
//! key and starts an auto-ack consumer. Deliveries are pumped into a
//! [`Mailbox`] by a background task; nothing here talks to listeners.
//!
//! There is no retry and no reconnect. If the consumer stream ends, the pump
//! logs it and stops.

use futures::{Stream, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::buffer::Mailbox;
use crate::config::ListenerConfig;
use crate::error::ConnectError;

/// A live, listening subscription.
///
/// The queue belongs to this connection and is deleted by the broker once
/// the connection closes.
pub struct ActiveSubscription {
    connection: Connection,
    channel: Channel,
    queue: String,
    pump: JoinHandle<()>,
}

/// Connect to RabbitMQ and start pumping deliveries into `mailbox`.
///
/// This function:
/// 1. Validates the configuration
/// 2. Connects once, without retry or backoff
/// 3. Optionally declares the exchange as a topic exchange
/// 4. Declares an exclusive, auto-delete queue with a server-assigned name
/// 5. Binds the queue to each routing key on the exchange
/// 6. Starts an auto-ack consumer feeding the mailbox
pub async fn connect(
    config: &ListenerConfig,
    mailbox: Mailbox,
) -> Result<ActiveSubscription, ConnectError> {
    config.validate()?;
    let url = config.amqp_url()?;

    info!(
        host = %config.host,
        port = config.port,
        vhost = %config.vhost,
        username = %config.username,
        "rabbitmq_connecting"
    );

    let properties = ConnectionProperties::default()
        .with_connection_name(config.connection_name.clone().into());

    let connection = Connection::connect(url.as_str(), properties)
        .await
        .map_err(ConnectError::broker("connect to RabbitMQ"))?;

    info!("rabbitmq_connected");

    let channel = connection
        .create_channel()
        .await
        .map_err(ConnectError::broker("create channel"))?;

    info!(channel_id = channel.id(), "rabbitmq_channel_created");

    if config.declare_exchange {
        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(ConnectError::broker("declare exchange"))?;

        info!(exchange = %config.exchange, "rabbitmq_exchange_declared");
    }

    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(ConnectError::broker("declare queue"))?;

    let queue = queue.name().as_str().to_string();

    info!(queue = %queue, "rabbitmq_queue_declared");

    for routing_key in config.routing_keys.iter().filter(|k| !k.trim().is_empty()) {
        channel
            .queue_bind(
                &queue,
                &config.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(ConnectError::broker("bind queue"))?;

        info!(
            queue = %queue,
            exchange = %config.exchange,
            routing_key = %routing_key,
            "rabbitmq_queue_bound"
        );
    }

    let consumer = channel
        .basic_consume(
            &queue,
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(ConnectError::broker("start consumer"))?;

    info!(queue = %queue, "rabbitmq_consumer_started");

    let deliveries = consumer.map(|delivery| {
        delivery.map(|d| RawDelivery {
            routing_key: d.routing_key.as_str().to_owned(),
            delivery_tag: d.delivery_tag,
            data: d.data,
        })
    });
    let pump = tokio::spawn(pump_deliveries(deliveries, mailbox));

    Ok(ActiveSubscription {
        connection,
        channel,
        queue,
        pump,
    })
}

/// The parts of a delivery the pump needs.
struct RawDelivery {
    routing_key: String,
    delivery_tag: u64,
    data: Vec<u8>,
}

/// Append every delivery to the mailbox until the stream ends.
///
/// Payloads that are not valid text are logged and skipped.
async fn pump_deliveries<S>(mut deliveries: S, mailbox: Mailbox)
where
    S: Stream<Item = Result<RawDelivery, lapin::Error>> + Unpin,
{
    while let Some(delivery) = deliveries.next().await {
        match delivery {
            Ok(delivery) => match mailbox.deliver(&delivery.data) {
                Ok(()) => debug!(
                    routing_key = %delivery.routing_key,
                    body_length = delivery.data.len(),
                    "message_received"
                ),
                Err(e) => warn!(
                    routing_key = %delivery.routing_key,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "message_decode_failed"
                ),
            },
            Err(e) => {
                error!(error = %e, "rabbitmq_delivery_error");
            }
        }
    }

    warn!("rabbitmq_consumer_closed");
}

impl ActiveSubscription {
    /// Server-assigned name of the listener queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Stop the pump and close the channel and connection.
    ///
    /// The broker deletes the exclusive queue as a side effect.
    pub async fn close(self) {
        self.pump.abort();

        if let Err(e) = self.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        if let Err(e) = self.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!(queue = %self.queue, "rabbitmq_subscription_closed");
    }
}
