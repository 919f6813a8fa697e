//! Stateless session tokens.
//!
//! Tokens are self-contained HS256 JWTs: subject, admin bit, issue and
//! expiry timestamps. Validity is signature + expiry only — there is no
//! server-side session table, and logout is client-side token discard.
//! Whether the subject still exists is the identity layer's concern.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Fixed token lifetime. Rotating the signing secret invalidates every
/// outstanding token at once; there is no finer-grained revocation.
const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Token expired")]
    Expired,

    #[error("Token invalid")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Claims embedded in every token issued by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Standard JWT subject — set to the username.
    pub sub: String,

    /// Whether this user has admin privileges. Embedded so the admin
    /// guard needs no extra DB query; the bit is fixed at user creation.
    pub admin: bool,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: usize,

    /// Standard JWT expiry (Unix timestamp, seconds).
    pub exp: usize,
}

pub struct SessionService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionService {
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Load the signing secret from `path`, generating and persisting a
    /// fresh one on first start. Losing this file invalidates all
    /// outstanding tokens and nothing else.
    pub fn load_or_generate(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let secret = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read token secret: {}", path.display()))?
                .trim()
                .to_string()
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let secret = generate_secret();
            std::fs::write(path, &secret)
                .with_context(|| format!("Failed to persist token secret: {}", path.display()))?;
            tracing::info!("Generated new token signing secret at {}", path.display());
            secret
        };

        if secret.len() < 32 {
            anyhow::bail!("Token secret is too short (need at least 32 characters)");
        }

        Ok(Self::from_secret(secret.as_bytes()))
    }

    /// Issue a signed token for `username` expiring 24 hours from now.
    pub fn issue(&self, username: &str, is_admin: bool) -> Result<String, SessionError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(TOKEN_LIFETIME_HOURS);

        let claims = Claims {
            sub: username.to_string(),
            admin: is_admin,
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, returning the decoded claims.
    ///
    /// Pure computation — no I/O, safe to run on every request.
    pub fn validate(&self, token: &str) -> Result<Claims, SessionError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            })
    }
}

/// Random 64-character hex secret.
fn generate_secret() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SessionService {
        SessionService::from_secret(b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn issued_token_validates() {
        let service = service();
        let token = service.issue("alice", false).unwrap();

        let claims = service.validate(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(!claims.admin);
        assert_eq!(
            claims.exp - claims.iat,
            (TOKEN_LIFETIME_HOURS * 3600) as usize
        );
    }

    #[test]
    fn admin_claim_round_trips() {
        let service = service();
        let token = service.issue("root", true).unwrap();

        let claims = service.validate(&token).unwrap();
        assert!(claims.admin);
    }

    #[test]
    fn tampered_token_is_invalid() {
        let service = service();
        let token = service.issue("alice", false).unwrap();

        // Flip a byte in the payload segment.
        let mut bytes = token.into_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] = if bytes[mid] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            service.validate(&tampered),
            Err(SessionError::Invalid)
        ));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = service().issue("alice", false).unwrap();
        let other = SessionService::from_secret(b"another-secret-another-secret-xx");

        assert!(matches!(other.validate(&token), Err(SessionError::Invalid)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = service();

        // Hand-craft a token that expired two hours ago (beyond the
        // default validation leeway).
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "alice".to_string(),
            admin: false,
            iat: (now - 26 * 3600) as usize,
            exp: (now - 2 * 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"0123456789abcdef0123456789abcdef"),
        )
        .unwrap();

        assert!(matches!(
            service.validate(&token),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn generated_secret_is_hex() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
