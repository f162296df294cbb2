//! HMAC-authenticated opaque token codec.
//!
//! Tokens are `base64url(json claims) . base64url(hmac-sha256 tag)`. The tag
//! is verified before any claim inside the payload is trusted; claim types
//! carry a `purpose` field so a token minted for one flow can never be
//! presented to another.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token failures are deliberately coarse: callers only learn that a token
/// did not verify, not why.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("token failed verification")]
pub struct TokenRejected;

/// Signing key shared by every token minted in this process.
#[derive(Clone)]
pub struct TokenKey {
    key: Vec<u8>,
}

impl TokenKey {
    /// Derive the key from configured secret material.
    #[must_use]
    pub fn from_secret(secret: &SecretString) -> Self {
        Self {
            key: secret.expose_secret().as_bytes().to_vec(),
        }
    }

    /// Random per-process key: sessions do not survive a restart.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate() -> Result<Self> {
        let mut key = vec![0u8; 32];
        OsRng
            .try_fill_bytes(&mut key)
            .context("failed to generate token key")?;
        Ok(Self { key })
    }

    /// Sign claims into an opaque token value.
    ///
    /// # Errors
    /// Returns an error if claim serialization fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let payload = serde_json::to_vec(claims).context("encode token claims")?;
        let encoded = URL_SAFE_NO_PAD.encode(&payload);
        let tag = self.tag(encoded.as_bytes())?;
        Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Verify a token and decode its claims.
    ///
    /// # Errors
    /// `TokenRejected` for any malformed value, bad tag, or undecodable
    /// payload.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenRejected> {
        let (encoded, tag) = token.split_once('.').ok_or(TokenRejected)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| TokenRejected)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| TokenRejected)?;
        mac.update(encoded.as_bytes());
        // Constant-time comparison; a forged tag and a truncated tag are
        // indistinguishable to the caller.
        mac.verify_slice(&tag).map_err(|_| TokenRejected)?;

        let payload = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| TokenRejected)?;
        serde_json::from_slice(&payload).map_err(|_| TokenRejected)
    }

    fn tag(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| anyhow::anyhow!("invalid token key: {err}"))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey").finish_non_exhaustive()
    }
}
