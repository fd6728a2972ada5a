//! Key material loading.
//!
//! Each key is supplied either as a PEM file path or as inline PEM
//! contents (usually via an environment variable), never both.

use std::path::PathBuf;

use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use tracing::debug;

use crate::error::{TokenError, TokenResult};

/// Where a PEM-encoded key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Contents(String),
}

impl KeySource {
    /// Pick the single configured source for a key.
    ///
    /// `what` names the key in error messages (e.g. "signing-key").
    pub fn from_options(
        file: Option<PathBuf>,
        contents: Option<String>,
        what: &str,
    ) -> TokenResult<Self> {
        match (file, contents.filter(|c| !c.trim().is_empty())) {
            (Some(_), Some(_)) => Err(TokenError::Key(format!(
                "can't specify both {what}-file and {what}-contents"
            ))),
            (Some(path), None) => Ok(KeySource::File(path)),
            (None, Some(pem)) => Ok(KeySource::Contents(pem)),
            (None, None) => Err(TokenError::Key(format!(
                "either {what}-file or {what}-contents must be provided"
            ))),
        }
    }

    fn read(&self) -> TokenResult<String> {
        match self {
            KeySource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| TokenError::Key(format!("read {}: {e}", path.display()))),
            KeySource::Contents(pem) => Ok(pem.clone()),
        }
    }
}

/// Load a PKCS#8 PEM Ed25519 private key.
pub fn load_signing_key(source: &KeySource) -> TokenResult<SigningKey> {
    let pem = source.read()?;
    let key = SigningKey::from_pkcs8_pem(&pem)
        .map_err(|e| TokenError::Key(format!("parse signing key: {e}")))?;
    debug!("signing key loaded");
    Ok(key)
}

/// Load an SPKI PEM Ed25519 public key.
pub fn load_verifying_key(source: &KeySource) -> TokenResult<VerifyingKey> {
    let pem = source.read()?;
    let key = VerifyingKey::from_public_key_pem(&pem)
        .map_err(|e| TokenError::Key(format!("parse verifying key: {e}")))?;
    debug!("verifying key loaded");
    Ok(key)
}
