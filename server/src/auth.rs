//! Credential verification for the EventPlat gateway.
//!
//! Two credentials guard the gateway:
//!
//! 1. The **session token**: a JWT issued by the platform's auth service and
//!    presented by browser clients in the `token` cookie during the WebSocket
//!    handshake. It is verified with HMAC-SHA256 against a shared secret and
//!    must carry an unexpired `exp` claim.
//! 2. The **notifier token**: a static bearer token presented by the CRUD
//!    layer on the event-ingestion endpoint, compared in constant time.
//!
//! [`AuthError`] distinguishes failure modes for logging. The route layer
//! must collapse all of them into a single uniform `401 Unauthorized` so a
//! rejected client cannot probe which check failed.

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "token";

/// Errors that can occur during credential verification.
///
/// These are for server-side logging only; clients always observe a single
/// undifferentiated `Unauthorized` outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing credential")]
    MissingToken,

    /// The credential is not a structurally valid token.
    #[error("malformed credential")]
    Malformed,

    /// The credential's expiry claim is in the past.
    #[error("expired credential")]
    Expired,

    /// The credential does not verify against the shared secret.
    #[error("invalid credential signature")]
    InvalidSignature,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier the token was issued to.
    pub sub: String,

    /// Email address, when the issuer includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry as seconds since the Unix epoch.
    pub exp: usize,
}

/// Verifies session tokens against a shared secret.
///
/// The secret is injected at construction; verification itself is a pure
/// function of the token with no side effects.
///
/// # Example
///
/// ```rust
/// use eventplat_server::auth::TokenVerifier;
///
/// let verifier = TokenVerifier::new("shared-secret");
/// assert!(verifier.verify("not-a-token").is_err());
/// ```
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for tokens signed HS256 with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies a session token and returns its claims.
    ///
    /// A token is valid iff it is well-formed, its signature verifies
    /// against the shared secret, and its `exp` claim is in the future.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the failure mode. Callers facing
    /// clients must not forward the distinction.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed,
            })
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("decoding_key", &"<secret>")
            .field("validation", &self.validation)
            .finish()
    }
}

/// Extracts the named cookie's value from a `Cookie` header.
///
/// Handles the `k=v; k2=v2` format; values may themselves contain `=`.
/// Returns `None` when the cookie is absent or has no value.
#[must_use]
pub fn token_from_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Validates the ingestion bearer token in constant time.
///
/// # Errors
///
/// Returns [`AuthError::InvalidSignature`] when the tokens differ.
pub fn verify_notifier_token(provided: &str, expected: &str) -> Result<(), AuthError> {
    // subtle's slice impl handles differing lengths without early exit on content
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature)
    }
}
