//! Incubator Listener - forwards RabbitMQ messages to per-tick subscribers.
//!
//! A broker-owned delivery task appends decoded messages to a mailbox. The
//! host loop drains the mailbox once per tick and notifies every registered
//! listener, one call per message, in arrival order.
//!
//! ## Architecture
//!
//! ```text
//! Exchange → exclusive queue → delivery pump → Mailbox → tick poll → listeners
//! ```

pub mod broker;
pub mod buffer;
pub mod config;
pub mod error;
pub mod listener;

// Re-export commonly used types
pub use broker::{connect, ActiveSubscription, Publisher};
pub use buffer::{FrameBuffer, Mailbox, MessageListener};
pub use config::ListenerConfig;
pub use error::{ConfigError, ConnectError, DecodeError};
pub use listener::{BrokerListener, ListenerState};
