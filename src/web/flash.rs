//! One-shot notices carried across a redirect
//!
//! Notices are stored client-side in a cookie whose value is
//! `<base64url(json)>.<blake3 keyed hash>`. A cookie that fails verification
//! is dropped, never shown.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::warn;
use serde::{Deserialize, Serialize};

/// Name of the cookie holding pending notices
pub const FLASH_COOKIE: &str = "voc_flash";

const KEY_CONTEXT: &str = "voc-pulse 2026-01 flash cookie signing key";
const COOKIE_ATTRIBUTES: &str = "Path=/; HttpOnly; SameSite=Lax";

/// A user-facing notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// "error" or "info"; used as a CSS class
    pub category: String,
    pub message: String,
}

impl Flash {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            category: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Signs and verifies flash cookies
#[derive(Clone)]
pub struct FlashSigner {
    key: [u8; 32],
}

impl FlashSigner {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the signing key from the configured secret
    ///
    /// Without a secret a random key is generated, so notices pending across
    /// a restart are discarded.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => Self::new(blake3::derive_key(KEY_CONTEXT, secret.as_bytes())),
            None => {
                warn!("SECRET_KEY not set; using a random flash signing key for this process");
                Self::new(rand::random())
            }
        }
    }

    /// Encode notices into a signed cookie value
    pub fn encode(&self, flashes: &[Flash]) -> String {
        // Vec<Flash> of plain strings always serializes
        let json = serde_json::to_vec(flashes).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mac = blake3::keyed_hash(&self.key, payload.as_bytes());
        format!("{}.{}", payload, mac.to_hex())
    }

    /// Decode a cookie value, returning `None` if it was not signed by this key
    pub fn decode(&self, value: &str) -> Option<Vec<Flash>> {
        let (payload, mac) = value.rsplit_once('.')?;
        let mac = blake3::Hash::from_hex(mac).ok()?;

        // blake3::Hash equality is constant-time
        if blake3::keyed_hash(&self.key, payload.as_bytes()) != mac {
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// `Set-Cookie` value carrying the given notices
    pub fn set_cookie(&self, flashes: &[Flash]) -> String {
        format!("{}={}; {}", FLASH_COOKIE, self.encode(flashes), COOKIE_ATTRIBUTES)
    }

    /// `Set-Cookie` value that removes the flash cookie
    pub fn clear_cookie() -> String {
        format!("{}=; {}; Max-Age=0", FLASH_COOKIE, COOKIE_ATTRIBUTES)
    }

    /// Read pending notices from request headers
    ///
    /// Returns `None` when no flash cookie was sent. A cookie that was sent but
    /// fails verification yields `Some` with no notices, so the caller still
    /// clears it.
    pub fn take(&self, headers: &HeaderMap) -> Option<Vec<Flash>> {
        let value = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == FLASH_COOKIE)
            .map(|(_, value)| value)?;

        match self.decode(value) {
            Some(flashes) => Some(flashes),
            None => {
                warn!("Ignoring flash cookie with an invalid signature");
                Some(Vec::new())
            }
        }
    }
}
