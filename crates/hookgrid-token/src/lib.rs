//! hookgrid-token — signed, stateless webhook capability tokens.
//!
//! A token binds a driver id, a project (tenant) id, a per-issuance nonce
//! and the driver configuration under an Ed25519 signature. Redeeming a
//! token needs only the public key; revocation is handled elsewhere by
//! checking that the nonce still names a stored webhook.
//!
//! # Wire Format
//!
//! ```text
//! base64url(header) "." base64url(claims) "." base64url(signature)
//!
//! header = {"alg":"EdDSA","typ":"JWT"}
//! claims = {"driver":..., "projectId":..., "uuid":..., "config":..., "iat":...}
//! ```
//!
//! Tokens carry no expiry.

pub mod codec;
pub mod error;
pub mod keys;

pub use codec::{ALGORITHM, Grant, IssuedToken, TokenCodec, verify_with};
pub use error::{TokenError, TokenResult};
pub use keys::{KeySource, load_signing_key, load_verifying_key};
