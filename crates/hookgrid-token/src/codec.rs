//! Token codec — issues and verifies Ed25519-signed capability tokens.
//!
//! The codec is a pure envelope: it knows nothing about drivers beyond the
//! id string, and treats the configuration as an opaque JSON value.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{TokenError, TokenResult};

/// JOSE algorithm name for Ed25519 signatures.
pub const ALGORITHM: &str = "EdDSA";

/// The decoded contents of a capability token.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// Registered driver id, e.g. `scaleHost`.
    pub driver: String,
    /// Project (tenant) the webhook acts on.
    pub project_id: String,
    /// Unique per issuance; the revocation handle.
    pub nonce: String,
    /// Driver configuration, opaque to the codec.
    pub config: Value,
}

/// A freshly minted token together with the nonce it embeds.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub nonce: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Serialize)]
struct ClaimsRef<'a> {
    driver: &'a str,
    #[serde(rename = "projectId")]
    project_id: &'a str,
    uuid: &'a str,
    config: &'a Value,
    iat: u64,
}

#[derive(Deserialize)]
struct Claims {
    driver: String,
    #[serde(rename = "projectId")]
    project_id: String,
    uuid: String,
    config: Value,
}

/// Issues and verifies capability tokens with a fixed key pair.
#[derive(Clone)]
pub struct TokenCodec {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("verifying", &self.verifying)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from an explicit key pair.
    ///
    /// Fails if the verifying key is not the public half of `signing`.
    pub fn new(signing: SigningKey, verifying: VerifyingKey) -> TokenResult<Self> {
        if signing.verifying_key() != verifying {
            return Err(TokenError::Key(
                "verifying key does not match signing key".to_string(),
            ));
        }
        Ok(Self { signing, verifying })
    }

    /// Build a codec, deriving the verifying key from the signing key.
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Mint a token for `driver` in `project_id` with a fresh nonce.
    pub fn issue(&self, driver: &str, project_id: &str, config: &Value) -> TokenResult<IssuedToken> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let token = self.sign(&Grant {
            driver: driver.to_string(),
            project_id: project_id.to_string(),
            nonce: nonce.clone(),
            config: config.clone(),
        })?;
        debug!(%driver, project = %project_id, %nonce, "capability token issued");
        Ok(IssuedToken { token, nonce })
    }

    /// Sign an explicit grant.
    pub fn sign(&self, grant: &Grant) -> TokenResult<String> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = ClaimsRef {
            driver: &grant.driver,
            project_id: &grant.project_id,
            uuid: &grant.nonce,
            config: &grant.config,
            iat: epoch_secs(),
        };

        let header = serde_json::to_vec(&header).map_err(|e| TokenError::Encode(e.to_string()))?;
        let claims = serde_json::to_vec(&claims).map_err(|e| TokenError::Encode(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.signing.sign(signing_input.as_bytes());

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Verify a token and return the grant it carries.
    pub fn verify(&self, token: &str) -> TokenResult<Grant> {
        verify_with(&self.verifying, token)
    }
}

/// Verify `token` against `key` without needing the private half.
pub fn verify_with(key: &VerifyingKey, token: &str) -> TokenResult<Grant> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three segments".to_string()));
    };

    let header: Header = decode_segment(header_b64, "header")?;
    if header.alg != ALGORITHM {
        return Err(TokenError::Algorithm(header.alg));
    }

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| TokenError::Malformed(format!("signature: {e}")))?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| TokenError::Signature)?;

    let signing_input_len = header_b64.len() + 1 + claims_b64.len();
    let signing_input = &token[..signing_input_len];
    key.verify_strict(signing_input.as_bytes(), &signature)
        .map_err(|_| TokenError::Signature)?;

    let claims: Claims = decode_segment(claims_b64, "claims")
        .map_err(|e| TokenError::Claims(e.to_string()))?;
    for (name, value) in [
        ("driver", &claims.driver),
        ("projectId", &claims.project_id),
        ("uuid", &claims.uuid),
    ] {
        if value.is_empty() {
            return Err(TokenError::Claims(format!("{name} is empty")));
        }
    }

    Ok(Grant {
        driver: claims.driver,
        project_id: claims.project_id,
        nonce: claims.uuid,
        config: claims.config,
    })
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> TokenResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{what}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{what}: {e}")))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
