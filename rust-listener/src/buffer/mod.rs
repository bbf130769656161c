//! Message buffering between the broker client and the host loop.

pub mod frame;
pub mod mailbox;

pub use frame::{FrameBuffer, MessageListener};
pub use mailbox::{decode_payload, Mailbox};
