//! Bearer token issuance and verification.
//!
//! Tokens come in two trust modes, selected by the header's `alg`:
//!
//! * **Local** (`HS256`): issued by this service and signed with the shared secret.
//! * **Remote** (`EdDSA`): issued by an external identity provider and verified
//!   against an Ed25519 key looked up by `kid` in a cached JWKS document.
//!
//! Every verification failure collapses into [`InvalidToken`]. The concrete cause
//! is only written to the debug log.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::jwks::{JwksCache, KeySetError};
use crate::error::AppError;

pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

/// Claims written into locally issued tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: String,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
    /// Expiration (seconds since epoch).
    pub exp: i64,
}

/// The subject is the only claim read back; `exp` is checked by `jsonwebtoken`.
#[derive(Debug, Deserialize)]
struct SubjectClaims {
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs local `HS256` tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject_id: &str) -> Result<IssuedToken, AppError> {
        self.issue_with_ttl(subject_id, self.ttl)
    }

    pub fn issue_with_ttl(&self, subject_id: &str, ttl: Duration) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::InternalServerError("Token lifetime out of range".into()))?;
        let claims = Claims {
            sub: subject_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))?;
        Ok(IssuedToken { token, expires_at })
    }
}

/// Which trust path a token takes, decided from the unverified header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    Local,
    Remote,
}

impl TokenMode {
    pub fn for_algorithm(alg: Algorithm) -> Self {
        match alg {
            Algorithm::EdDSA => TokenMode::Remote,
            _ => TokenMode::Local,
        }
    }
}

/// The only failure a caller of [`TokenVerifier::verify`] ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidToken;

impl fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid or expired token")
    }
}

impl From<InvalidToken> for AppError {
    fn from(_: InvalidToken) -> AppError {
        AppError::Unauthorized(InvalidToken.to_string())
    }
}

/// Internal failure causes, kept for the debug log only.
#[derive(Debug)]
enum VerifyError {
    Jwt(jsonwebtoken::errors::Error),
    RemoteDisabled,
    MissingKeyId,
    UnknownKeyId(String),
    UnsupportedKey(String),
    KeySet(KeySetError),
    MissingSubject,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerifyError::Jwt(e) => write!(f, "{}", e),
            VerifyError::RemoteDisabled => write!(f, "remote tokens are not accepted"),
            VerifyError::MissingKeyId => write!(f, "header has no kid"),
            VerifyError::UnknownKeyId(kid) => write!(f, "no key with kid {:?}", kid),
            VerifyError::UnsupportedKey(kid) => write!(f, "key {:?} is not OKP/Ed25519", kid),
            VerifyError::KeySet(e) => write!(f, "{}", e),
            VerifyError::MissingSubject => write!(f, "sub claim missing or empty"),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        VerifyError::Jwt(error)
    }
}

/// Verifies bearer tokens in either trust mode.
pub struct TokenVerifier {
    local_key: DecodingKey,
    remote: Option<JwksCache>,
}

impl TokenVerifier {
    /// A verifier that accepts local tokens only.
    pub fn new(secret: &str) -> Self {
        Self {
            local_key: DecodingKey::from_secret(secret.as_bytes()),
            remote: None,
        }
    }

    /// Also accept remote `EdDSA` tokens whose keys come from `cache`.
    pub fn with_remote_keys(mut self, cache: JwksCache) -> Self {
        self.remote = Some(cache);
        self
    }

    /// Returns the token's subject, or [`InvalidToken`] for any failure.
    pub async fn verify(&self, token: &str) -> Result<String, InvalidToken> {
        self.try_verify(token).await.map_err(|e| {
            debug!("Token rejected: {}", e);
            InvalidToken
        })
    }

    async fn try_verify(&self, token: &str) -> Result<String, VerifyError> {
        let header = decode_header(token)?;

        let claims = match TokenMode::for_algorithm(header.alg) {
            TokenMode::Remote => {
                let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
                let key = self.remote_key(&kid).await?;
                let mut validation = Validation::new(Algorithm::EdDSA);
                validation.validate_aud = false;
                decode::<SubjectClaims>(token, &key, &validation)?.claims
            }
            TokenMode::Local => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.leeway = 0;
                decode::<SubjectClaims>(token, &self.local_key, &validation)?.claims
            }
        };

        claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or(VerifyError::MissingSubject)
    }

    async fn remote_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        let cache = self.remote.as_ref().ok_or(VerifyError::RemoteDisabled)?;
        let key_set = cache.key_set().await.map_err(VerifyError::KeySet)?;
        let jwk = key_set
            .find(kid)
            .ok_or_else(|| VerifyError::UnknownKeyId(kid.to_string()))?;
        let x = jwk
            .ed25519_public_key()
            .ok_or_else(|| VerifyError::UnsupportedKey(kid.to_string()))?;
        Ok(DecodingKey::from_ed_components(x)?)
    }
}
