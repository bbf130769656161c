//! Error types for the listener library.
//!
//! The binaries wrap these in `anyhow` at the top level.

use std::str::Utf8Error;

use thiserror::Error;

/// A required connection parameter is missing or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required connection parameter: {0}")]
    Missing(&'static str),

    #[error("at least one routing key is required")]
    NoRoutingKeys,

    #[error("invalid broker url: {0}")]
    InvalidUrl(String),
}

/// Setting up the subscription failed. The attempt is never retried.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to {step}: {source}")]
    Broker {
        step: &'static str,
        #[source]
        source: lapin::Error,
    },
}

impl ConnectError {
    pub(crate) fn broker(step: &'static str) -> impl FnOnce(lapin::Error) -> Self {
        move |source| ConnectError::Broker { step, source }
    }
}

/// A delivered payload could not be decoded as text.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8 text: {0}")]
    InvalidText(#[from] Utf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = ConnectError::from(ConfigError::Missing("host"));
        assert_eq!(err.to_string(), "missing required connection parameter: host");
    }

    #[test]
    fn test_decode_error_from_utf8() {
        let bytes = vec![0xffu8, 0xfe];
        let err: DecodeError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(err.to_string().starts_with("payload is not valid UTF-8 text"));
    }
}
