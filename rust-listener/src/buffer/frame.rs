//! Per-tick drain of the mailbox into registered listeners.
//!
//! The frame buffer lives on the host's main loop. Listeners are only ever
//! invoked from [`FrameBuffer::poll_and_emit`], so they run on that thread
//! and never on the broker client's delivery task.

use tracing::debug;

use super::mailbox::Mailbox;

/// Receives one notification per decoded message.
pub trait MessageListener {
    fn on_message(&mut self, message: &str);
}

impl<F> MessageListener for F
where
    F: FnMut(&str),
{
    fn on_message(&mut self, message: &str) {
        self(message)
    }
}

/// Mailbox plus the listeners it is drained into.
#[derive(Default)]
pub struct FrameBuffer {
    mailbox: Mailbox,
    listeners: Vec<Box<dyn MessageListener>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the delivery side. Clones share the same storage.
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    /// Register a listener. Listeners are notified in registration order.
    pub fn subscribe<L>(&mut self, listener: L)
    where
        L: MessageListener + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drain the mailbox and notify every listener once per message.
    ///
    /// Messages are emitted in arrival order. Returns the number of messages
    /// drained; an empty mailbox emits nothing.
    pub fn poll_and_emit(&mut self) -> usize {
        let pending = self.mailbox.drain();
        if pending.is_empty() {
            return 0;
        }

        for message in &pending {
            for listener in self.listeners.iter_mut() {
                listener.on_message(message);
            }
        }

        debug!(
            emitted = pending.len(),
            listeners = self.listeners.len(),
            "frame_messages_emitted"
        );

        pending.len()
    }
}
