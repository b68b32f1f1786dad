use aes::Aes128;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use cmac::{Cmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{app_state::AppState, crypto::AesKey, db::queries, error::AppError};

pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

const ROLE_PREFIX: &str = "ROLE_";

/// Canonical role name: uppercase with the `ROLE_` prefix.
pub fn normalize_role(role: &str) -> String {
    let upper = role.to_uppercase();
    if upper.starts_with(ROLE_PREFIX) {
        upper
    } else {
        format!("{}{}", ROLE_PREFIX, upper)
    }
}

/// Salted password digest stored as `salt$digest`, both hex. The scheme is
/// an opaque credential-verifier detail; callers only see verify pass/fail.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let digest = password_digest(&hex::encode(salt), password);
    format!("{}${}", hex::encode(salt), digest)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => password_digest(salt, password) == digest,
        None => false,
    }
}

fn password_digest(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

/// Issues and verifies opaque bearer tokens: a hex JSON payload carrying
/// identity, role and expiry, authenticated with an AES-CMAC tag.
pub struct TokenService {
    key: AesKey,
    ttl_minutes: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            key: AesKey::derive_from_secret(secret),
            ttl_minutes,
        }
    }

    pub fn issue(&self, username: &str, role: &str) -> Result<String, AppError> {
        let exp = (chrono::Utc::now() + chrono::Duration::minutes(self.ttl_minutes)).timestamp();
        let claims = Claims {
            sub: username.to_string(),
            role: normalize_role(role),
            exp,
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AppError::Crypto(anyhow::Error::new(e)))?;
        let tag = self.tag(&payload)?;

        Ok(format!("{}.{}", hex::encode(&payload), hex::encode(tag)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let unauthorized = || AppError::Unauthorized("invalid or expired token".into());

        let (payload_hex, tag_hex) = token.split_once('.').ok_or_else(unauthorized)?;
        let payload = hex::decode(payload_hex).map_err(|_| unauthorized())?;
        let tag = hex::decode(tag_hex).map_err(|_| unauthorized())?;

        let expected = self.tag(&payload)?;
        if tag != expected {
            return Err(unauthorized());
        }

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| unauthorized())?;
        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(unauthorized());
        }

        Ok(claims)
    }

    fn tag(&self, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(self.key.as_bytes())
            .map_err(|e| AppError::Crypto(anyhow::anyhow!("invalid key length: {:?}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// The authenticated caller, threaded explicitly into every service call.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

impl Caller {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == normalize_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    /// Generic gate for admin-only operations, checked before any state read.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::AccessDenied("admin privileges required".into()))
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

        let claims = state.tokens.verify(token)?;

        // The enabled flag is authoritative over any still-valid token.
        let user = queries::get_user_by_username(&state.pool, &claims.sub)
            .await?
            .filter(|u| u.enabled)
            .ok_or_else(|| AppError::Unauthorized("account disabled or unknown".into()))?;

        Ok(Caller {
            user_id: user.id,
            username: user.username,
            role: normalize_role(&user.role_name),
        })
    }
}
