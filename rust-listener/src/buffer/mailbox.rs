//! Thread-safe mailbox shared between the delivery pump and the tick loop.
//!
//! The delivery pump appends decoded messages; the tick loop takes the whole
//! pending sequence at once. Both operations hold the same lock, so a drain
//! returns exactly the messages present when it ran, in arrival order, and
//! anything appended afterwards waits for the next drain.
//!
//! The mailbox is unbounded. If nobody drains it, it keeps growing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::DecodeError;

/// Ordered, unbounded mailbox of decoded text messages.
#[derive(Clone, Default)]
pub struct Mailbox {
    inner: Arc<Mutex<Vec<String>>>,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a delivered payload as text and append it.
    ///
    /// Invalid text is rejected and nothing is appended.
    pub fn deliver(&self, payload: &[u8]) -> Result<(), DecodeError> {
        let message = decode_payload(payload)?;
        self.push(message);
        Ok(())
    }

    /// Append an already decoded message.
    pub fn push(&self, message: String) {
        self.lock().push(message);
    }

    /// Take every pending message, leaving the mailbox empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Recover the vec if a previous holder panicked.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decode a raw payload as UTF-8 text.
pub fn decode_payload(payload: &[u8]) -> Result<String, DecodeError> {
    Ok(std::str::from_utf8(payload)?.to_owned())
}
