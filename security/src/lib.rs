// security/src/lib.rs
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use models::identifiers::UserId;
use models::medical::{Identity, UserRole};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod middleware;
pub mod roles;

pub use middleware::{AuthState, Authenticated};
pub use roles::{RoleConfig, RolesConfig};

/// Claims carried by a bearer token. The identity provider is the only
/// issuer; the core trusts them as given once the signature checks out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub role: UserRole,
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl Claims {
    pub fn for_identity(identity: &Identity, ttl: Duration) -> Self {
        let now = Utc::now();
        Claims {
            sub: identity.id.to_string(),
            role: identity.role,
            email: identity.email.clone(),
            is_verified: identity.is_verified,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn identity(&self) -> Result<Identity, AuthError> {
        let id: UserId = self
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken("subject is not a user id".to_string()))?;
        if self.email.is_empty() {
            return Err(AuthError::InvalidToken("missing email".to_string()));
        }
        Ok(Identity {
            id,
            role: self.role,
            email: self.email.clone(),
            is_verified: self.is_verified,
        })
    }
}

/// Custom authentication errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
    Expired,
    PermissionDenied(String),
    JwtError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing bearer token"),
            AuthError::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            AuthError::Expired => write!(f, "Token has expired"),
            AuthError::PermissionDenied(perm) => write!(f, "Permission denied: {}", perm),
            AuthError::JwtError(msg) => write!(f, "JWT error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Signs a token for `identity`, valid for `ttl_hours`.
pub fn generate_jwt_token(identity: &Identity, secret: &[u8], ttl_hours: i64) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::JwtError("signing secret is empty".to_string()));
    }
    let claims = Claims::for_identity(identity, Duration::hours(ttl_hours));
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::JwtError(e.to_string()))
}

/// Verifies signature and expiry and yields the caller's identity.
pub fn validate_jwt_token(token: &str, secret: &[u8]) -> Result<Identity, AuthError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &Validation::default()).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(e.to_string()),
        }
    })?;
    data.claims.identity()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret";

    #[test]
    fn token_round_trips_identity() {
        let identity = Identity::new(UserId::new(), UserRole::Doctor, "doc@example.com");
        let token = generate_jwt_token(&identity, SECRET, 1).unwrap();
        assert_eq!(validate_jwt_token(&token, SECRET).unwrap(), identity);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let identity = Identity::new(UserId::new(), UserRole::Patient, "p@example.com");
        let token = generate_jwt_token(&identity, SECRET, 1).unwrap();
        assert!(matches!(validate_jwt_token(&token, b"another-secret"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let identity = Identity::new(UserId::new(), UserRole::Patient, "p@example.com");
        let token = generate_jwt_token(&identity, SECRET, -2).unwrap();
        assert_eq!(validate_jwt_token(&token, SECRET), Err(AuthError::Expired));
    }

    #[test]
    fn empty_secret_cannot_sign() {
        let identity = Identity::new(UserId::new(), UserRole::Admin, "a@example.com");
        assert!(matches!(generate_jwt_token(&identity, b"", 1), Err(AuthError::JwtError(_))));
    }

    #[test]
    fn malformed_subject_is_rejected() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            role: UserRole::Patient,
            email: "p@example.com".to_string(),
            is_verified: true,
            exp: Utc::now().timestamp() + 60,
            iat: Utc::now().timestamp(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        assert!(matches!(validate_jwt_token(&token, SECRET), Err(AuthError::InvalidToken(_))));
    }
}
