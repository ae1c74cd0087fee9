//! Pusher-compatible private channel auth tokens.
//!
//! A granted subscription is answered with `<key>:<signature>`, where the
//! signature is the hex HMAC-SHA256 of `<socket_id>:<channel>` under the
//! application secret.

use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

static SOCKET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+$").expect("valid socket id pattern"));

/// Signature errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Socket id is not `<digits>.<digits>`.
    #[error("Invalid socket id: {0}")]
    InvalidSocketId(String),

    /// The application secret cannot key the MAC.
    #[error("Invalid signing key")]
    InvalidKey,
}

/// Signs channel subscriptions for one application.
#[derive(Clone)]
pub struct AuthSigner {
    key: String,
    secret: String,
}

impl AuthSigner {
    /// Create a signer from the application key and secret.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// The public application key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Produce the auth token for `socket_id` joining `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket id is malformed.
    pub fn sign(&self, socket_id: &str, channel: &str) -> Result<String, SignatureError> {
        let mac = self.mac(socket_id, channel)?;
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}:{}", self.key, signature))
    }

    /// Check a token previously produced by [`AuthSigner::sign`].
    #[must_use]
    pub fn verify(&self, socket_id: &str, channel: &str, token: &str) -> bool {
        let Some((key, signature)) = token.split_once(':') else {
            return false;
        };
        if key != self.key {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };

        self.mac(socket_id, channel)
            .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    fn mac(&self, socket_id: &str, channel: &str) -> Result<HmacSha256, SignatureError> {
        if !SOCKET_ID.is_match(socket_id) {
            return Err(SignatureError::InvalidSocketId(socket_id.to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(socket_id.as_bytes());
        mac.update(b":");
        mac.update(channel.as_bytes());
        Ok(mac)
    }
}

impl fmt::Debug for AuthSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSigner")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}
