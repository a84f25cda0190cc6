//! Account registration and bearer-token resolution.

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors raised by the authentication layer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required registration or login field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// Username is already registered.
    #[error("Username {0} is already taken")]
    UsernameTaken(String),
    /// Username/password pair did not match.
    #[error("Unable to log in with provided credentials")]
    InvalidCredentials,
    /// Token is missing or unknown.
    #[error("Invalid or missing authentication token")]
    InvalidToken,
    /// Password hashing failed or a stored hash could not be parsed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// Owner identity used to scope projects.
    pub id: Uuid,
    /// Login name.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Registration time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Bearer credential issued at registration or login.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// Account the token resolves to.
    pub user: User,
}

struct Account {
    user: User,
    /// PHC string carrying algorithm, parameters and salt.
    password_hash: String,
    token: String,
}

#[derive(Default)]
struct Accounts {
    by_username: HashMap<String, Account>,
    tokens: HashMap<String, Uuid>,
}

/// In-process account registry. One long-lived token per account, reused across logins.
#[derive(Default)]
pub struct AuthService {
    accounts: RwLock<Accounts>,
}

impl AuthService {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account and issue its token.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = required("email", email)?;
        let username = required("username", username)?;
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts.write().await;
        if accounts.by_username.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        let token = Uuid::new_v4().simple().to_string();

        accounts.tokens.insert(token.clone(), user.id);
        accounts.by_username.insert(
            username.to_string(),
            Account {
                user: user.clone(),
                password_hash,
                token: token.clone(),
            },
        );
        tracing::info!(user_id = %user.id, username, "Account registered");

        Ok(Session { token, user })
    }

    /// Verify credentials and return the account's token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = required("username", username)?;
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let (password_hash, session) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .by_username
                .get(username)
                .ok_or(AuthError::InvalidCredentials)?;
            (
                account.password_hash.clone(),
                Session {
                    token: account.token.clone(),
                    user: account.user.clone(),
                },
            )
        };

        if !verify_password(&password_hash, password)? {
            tracing::debug!(username, "Rejected login");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(session)
    }

    /// Resolve a bearer token to its owner identity.
    pub async fn resolve(&self, token: &str) -> Result<Uuid, AuthError> {
        self.accounts
            .read()
            .await
            .tokens
            .get(token.trim())
            .copied()
            .ok_or(AuthError::InvalidToken)
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AuthError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

/// Argon2id with a fresh random salt, encoded as a PHC string.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AuthError::Hashing(error.to_string()))
}

fn verify_password(stored: &str, password: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|error| AuthError::Hashing(error.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
