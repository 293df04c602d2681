use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use entity::app_user;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "hr_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_minutes: i64,
}

impl AuthConfig {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub document: Option<String>,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum UserRole {
    Employee,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Employee => "EMPLOYEE",
        }
    }
}

impl From<app_user::Role> for UserRole {
    fn from(role: app_user::Role) -> Self {
        match role {
            app_user::Role::Admin => UserRole::Admin,
            app_user::Role::Employee => UserRole::Employee,
        }
    }
}

impl From<UserRole> for app_user::Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Admin => app_user::Role::Admin,
            UserRole::Employee => app_user::Role::Employee,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub email: String,
    pub document: Option<String>,
    pub role: UserRole,
}

impl CurrentUser {
    /// Admins satisfy every role check.
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role >= role
    }
}

impl From<&app_user::Model> for CurrentUser {
    fn from(user: &app_user::Model) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            document: user.employee_document.clone(),
            role: user.role.into(),
        }
    }
}

/// Signs a session token; returns it with its expiry instant.
pub fn issue_token(
    user: &CurrentUser,
    config: &AuthConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(Duration::minutes(config.session_ttl_minutes))
        .unwrap_or(now);
    let claims = SessionClaims {
        sub: user.user_id,
        email: user.email.clone(),
        document: user.document.clone(),
        role: user.role.as_str().to_string(),
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };
    let token = jsonwebtoken::encode(&Header::default(), &claims, &config.encoding_key())?;
    Ok((token, expires_at))
}

pub fn decode_token(token: &str, config: &AuthConfig) -> Result<SessionClaims, AuthError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[config.issuer.as_str()]);
    validation.set_audience(&[config.audience.as_str()]);
    Ok(jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &validation)?.claims)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

/// False for a wrong password and for a malformed stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
