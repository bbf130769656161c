//! Broker module for RabbitMQ operations.
//!
//! This module provides:
//! - Subscription setup feeding a mailbox
//! - A small publisher for sending text messages to the exchange
//!
//! ## Architecture
//!
//! ```text
//! Exchange → exclusive queue → delivery pump → Mailbox
//! ```

pub mod connector;
pub mod publisher;

pub use connector::{connect, ActiveSubscription};
pub use publisher::Publisher;
