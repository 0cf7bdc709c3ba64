//! Signed session tokens and password hashing.
//!
//! Tokens are HS256 JWTs with the claim set `{ sub, role, iat, exp, ...extra }`.
//! Verification depends only on the shared secret, so any process holding the
//! secret can validate any token.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::Role;
use crate::config::{AuthConfig, Environment};
use crate::error::{CoreError, CoreResult};

/// Secret used when none is configured outside production.
/// Tokens signed with it are only safe on a developer machine.
pub const DEVELOPMENT_SECRET: &str = "agency-portal-development-secret-do-not-deploy";

/// Claim names owned by the codec; `extra` may not shadow them.
const RESERVED_CLAIMS: [&str; 4] = ["sub", "role", "iat", "exp"];

/// Claims supplied by the caller when issuing a token
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub subject_id: String,
    pub role: Role,
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn new(subject_id: impl Into<String>, role: Role) -> Self {
        Self {
            subject_id: subject_id.into(),
            role,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// The decoded payload of a verified token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &str) -> CoreResult<Self> {
        if secret.trim().is_empty() {
            return Err(CoreError::Config("token secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Build the codec from configuration.
    ///
    /// Production refuses to start without a secret; development falls back to
    /// [`DEVELOPMENT_SECRET`].
    pub fn from_config(auth: &AuthConfig, environment: Environment) -> CoreResult<Self> {
        match auth.jwt_secret.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(secret) => Self::new(secret),
            None if environment.is_production() => Err(CoreError::Config(
                "auth.jwt_secret (or PORTAL_JWT_SECRET) must be set in production".to_string(),
            )),
            None => {
                tracing::warn!("No token secret configured, using the development default");
                Self::new(DEVELOPMENT_SECRET)
            }
        }
    }

    /// Sign `claims` with an expiry of `now + ttl`.
    pub fn issue(&self, claims: TokenClaims, ttl: Duration) -> CoreResult<String> {
        let now = Utc::now();
        let mut extra = claims.extra;
        for reserved in RESERVED_CLAIMS {
            extra.remove(reserved);
        }

        let payload = Claims {
            sub: claims.subject_id,
            role: claims.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            extra,
        };

        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)
            .map_err(|e| CoreError::Config(format!("failed to sign token: {}", e)))
    }

    /// Issue for a role stored as a string (e.g. an account row).
    /// Unknown role names are rejected rather than coerced.
    pub fn issue_for_role_name(
        &self,
        subject_id: &str,
        role: &str,
        extra: Map<String, Value>,
        ttl: Duration,
    ) -> CoreResult<String> {
        let role: Role = role
            .parse()
            .map_err(|e: String| CoreError::validation("role", e))?;
        self.issue(
            TokenClaims {
                subject_id: subject_id.to_string(),
                role,
                extra,
            },
            ttl,
        )
    }

    /// Check signature, expiry and shape; return the claims.
    pub fn verify(&self, token: &str) -> CoreResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Persistence(format!("failed to hash password: {}", e)))
}

lazy_static! {
    /// Checked when the account or its hash is missing, so a failed login
    /// costs one Argon2 verification either way
    static ref DECOY_HASH: String = hash_password("decoy-password").unwrap_or_default();
}

/// Verify against `hash`, or burn a verification on the decoy hash and fail
/// when there is none
pub fn verify_password_or_decoy(password: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            let _ = verify_password(password, &DECOY_HASH);
            false
        }
    }
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
