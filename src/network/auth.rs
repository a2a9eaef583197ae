//! Signer Authentication
//!
//! A connection's signer identity comes from a JWT issued by an external auth
//! provider: the gateway validates the token and derives the signer key from
//! its subject. The gateway never issues tokens.
//!
//! Without a configured provider, a development gateway may let clients
//! claim a signer key directly.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::identity::Pubkey;

/// Token validation settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
    /// RS256 public key (PEM).
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Accept expired tokens (local testing).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Is a key configured?
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn validation(&self) -> Validation {
        let algorithm = if self.public_key_pem.is_some() {
            Algorithm::RS256
        } else {
            Algorithm::HS256
        };

        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::new();
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if self.skip_expiry {
            validation.validate_exp = false;
        }
        validation
    }

    fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        if let Some(pem) = &self.public_key_pem {
            DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))
        } else if let Some(secret) = &self.secret {
            Ok(DecodingKey::from_secret(secret.as_bytes()))
        } else {
            Err(AuthError::NotConfigured)
        }
    }
}

/// Claims read from a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id at the provider).
    pub sub: String,
    /// Expiry (Unix seconds, 0 = none).
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Signer key of this subject: `sha256("fleet-wars-signer:" || sub)`.
    pub fn signer(&self) -> Pubkey {
        let mut hasher = Sha256::new();
        hasher.update(b"fleet-wars-signer:");
        hasher.update(self.sub.as_bytes());
        Pubkey::new(hasher.finalize().into())
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Malformed token.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token expired.
    #[error("token expired")]
    Expired,
    /// Wrong issuer.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Wrong audience.
    #[error("invalid audience")]
    InvalidAudience,
    /// Claim missing or empty.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// Neither a token nor an allowed self-declared signer.
    #[error("no credentials: send a token")]
    NoCredentials,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Validate a token and return its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let key = config.decoding_key()?;
    let claims = decode::<TokenClaims>(token, &key, &config.validation())
        .map_err(map_jwt_error)?
        .claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }
    if !config.skip_expiry && claims.exp > 0 && now_secs() > claims.exp {
        return Err(AuthError::Expired);
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

/// Resolves the signer of a connection.
#[derive(Clone, Debug, Default)]
pub struct Authenticator {
    config: AuthConfig,
    allow_dev_signers: bool,
}

impl Authenticator {
    /// New authenticator.
    pub fn new(config: AuthConfig, allow_dev_signers: bool) -> Self {
        Self { config, allow_dev_signers }
    }

    /// Token validation settings.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Are self-declared signers accepted?
    pub fn allows_dev_signers(&self) -> bool {
        self.allow_dev_signers && !self.config.is_configured()
    }

    /// Signer for a connection. A token always wins; a claimed key is only
    /// accepted in development mode.
    pub fn authenticate(&self, token: Option<&str>, claimed: Option<Pubkey>) -> Result<Pubkey, AuthError> {
        match (token.filter(|t| !t.is_empty()), claimed) {
            (Some(token), _) if self.config.is_configured() => {
                validate_token(token, &self.config).map(|claims| claims.signer())
            }
            (_, Some(key)) if self.allows_dev_signers() && !key.is_unset() => Ok(key),
            (Some(_), _) => Err(AuthError::NotConfigured),
            (None, _) => Err(AuthError::NoCredentials),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
