//! Broker listener: subscription lifecycle plus the per-tick poll.
//!
//! ```text
//! Disconnected --start ok--> Listening --shutdown--> Disconnected
//! Disconnected --start failed--> Disconnected (error logged, no retry)
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::broker::{connect, ActiveSubscription};
use crate::buffer::{FrameBuffer, Mailbox, MessageListener};
use crate::config::ListenerConfig;
use crate::error::ConnectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Listening,
}

/// Owns the frame buffer and, once started, the broker subscription.
///
/// Listeners are invoked only from [`BrokerListener::poll`], on whichever
/// task drives the tick loop.
pub struct BrokerListener {
    config: ListenerConfig,
    frame: FrameBuffer,
    subscription: Option<ActiveSubscription>,
}

impl BrokerListener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            frame: FrameBuffer::new(),
            subscription: None,
        }
    }

    /// Register a listener for every decoded message.
    pub fn subscribe<L>(&mut self, listener: L)
    where
        L: MessageListener + 'static,
    {
        self.frame.subscribe(listener);
    }

    pub fn state(&self) -> ListenerState {
        match self.subscription {
            Some(_) => ListenerState::Listening,
            None => ListenerState::Disconnected,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ListenerState::Listening
    }

    /// Live connection status. `Listening` alone does not track a dropped
    /// connection.
    pub fn is_connected(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(ActiveSubscription::is_connected)
    }

    /// Server-assigned queue name while listening.
    pub fn queue(&self) -> Option<&str> {
        self.subscription.as_ref().map(ActiveSubscription::queue)
    }

    /// Delivery-side handle of the mailbox.
    pub fn mailbox(&self) -> Mailbox {
        self.frame.mailbox()
    }

    /// Messages received but not yet emitted.
    pub fn pending(&self) -> usize {
        self.frame.mailbox().len()
    }

    /// Make a single attempt to subscribe.
    ///
    /// On failure the error is logged and returned, and the listener stays
    /// disconnected.
    pub async fn start(&mut self) -> Result<(), ConnectError> {
        if let Some(subscription) = &self.subscription {
            warn!(queue = %subscription.queue(), "listener_already_listening");
            return Ok(());
        }

        match connect(&self.config, self.frame.mailbox()).await {
            Ok(subscription) => {
                info!(
                    queue = %subscription.queue(),
                    exchange = %self.config.exchange,
                    routing_keys = ?self.config.routing_keys,
                    "listener_listening"
                );
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "listener_connect_failed");
                Err(e)
            }
        }
    }

    /// Drain the mailbox into the listeners. Call once per tick.
    pub fn poll(&mut self) -> usize {
        self.frame.poll_and_emit()
    }

    /// Poll once per configured tick until `shutdown` resolves.
    ///
    /// Returns the total number of messages emitted.
    pub async fn run_until<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.tick_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        let mut emitted = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(emitted = emitted, "listener_stopping");
                    break;
                }
                _ = ticker.tick() => {
                    emitted += self.poll() as u64;
                }
            }
        }

        // Flush what arrived during the last tick
        emitted += self.poll() as u64;
        emitted
    }

    /// Close the subscription if there is one.
    pub async fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_new_listener_is_disconnected() {
        let listener = BrokerListener::new(ListenerConfig::default());
        assert_eq!(listener.state(), ListenerState::Disconnected);
        assert_eq!(listener.queue(), None);
        assert_eq!(listener.pending(), 0);
        assert!(!listener.is_connected());
    }

    #[tokio::test]
    async fn test_start_unreachable_host_stays_disconnected() {
        let mut listener = BrokerListener::new(ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        });

        let result = listener.start().await;

        assert!(matches!(result, Err(ConnectError::Broker { .. })));
        assert!(!listener.is_listening());
        assert!(!listener.is_connected());
        assert_eq!(listener.pending(), 0);
        assert_eq!(listener.poll(), 0);
    }

    #[tokio::test]
    async fn test_start_invalid_config_stays_disconnected() {
        let mut listener = BrokerListener::new(ListenerConfig {
            routing_keys: Vec::new(),
            ..Default::default()
        });

        let result = listener.start().await;

        assert!(matches!(result, Err(ConnectError::Config(_))));
        assert_eq!(listener.state(), ListenerState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_until_emits_pending_messages() {
        let mut listener = BrokerListener::new(ListenerConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        listener.subscribe(move |m: &str| sink.borrow_mut().push(m.to_string()));

        let mailbox = listener.mailbox();
        mailbox.push("a".to_string());
        mailbox.push("b".to_string());

        let emitted = listener
            .run_until(tokio::time::sleep(Duration::from_millis(30)))
            .await;

        assert_eq!(emitted, 2);
        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_when_disconnected_is_noop() {
        let mut listener = BrokerListener::new(ListenerConfig::default());
        listener.shutdown().await;
        assert_eq!(listener.state(), ListenerState::Disconnected);
    }

    /// Needs a RabbitMQ broker reachable with the `RABBITMQ_*` variables.
    #[tokio::test]
    #[ignore]
    async fn test_two_routing_keys_one_poll() {
        use crate::broker::Publisher;

        let config = ListenerConfig {
            exchange: "incubator_listener_test".to_string(),
            routing_keys: vec!["a.b".to_string(), "a.c".to_string()],
            declare_exchange: true,
            ..ListenerConfig::from_env()
        };

        let mut listener = BrokerListener::new(config.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        listener.subscribe(move |m: &str| sink.borrow_mut().push(m.to_string()));

        listener.start().await.unwrap();
        assert!(listener.is_listening());
        assert!(listener.is_connected());

        let publisher = Publisher::new(config);
        publisher.publish("a.b", "first").await.unwrap();
        publisher.publish("a.c", "second").await.unwrap();
        publisher.publish("x.y", "unbound").await.unwrap();

        for _ in 0..50 {
            if listener.pending() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(listener.poll(), 2);
        assert_eq!(*seen.borrow(), vec!["first".to_string(), "second".to_string()]);

        publisher.close().await;
        listener.shutdown().await;
        assert!(!listener.is_listening());
    }
}
