use std::sync::Arc;

use crate::{
    errors::AuthError,
    store::{DuplicateEmail, UserStore},
};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity carried in the session token once credentials check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn UserStore>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthService {
    pub fn new(repo: Arc<dyn UserStore>) -> Self {
        Self { repo }
    }

    #[instrument(
        name = "AuthService: Register",
        skip(self, password),
        fields(user_email = %email)
    )]
    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let email = normalize_email(email);
        let name = name.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if name.is_empty() {
            return Err(AuthError::MissingName);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let existing = self.repo.find_by_email(&email).await.map_err(|e| {
            tracing::error!("Database error during registration: {:?}", e);
            AuthError::Internal
        })?;
        if existing.is_some() {
            tracing::warn!("Registration refused: email already in use");
            return Err(AuthError::UserAlreadyExists);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AuthError::Internal
            })?
            .to_string();

        let id = self
            .repo
            .create_user(&email, name, &hash)
            .await
            .map_err(|e| {
                if e.downcast_ref::<DuplicateEmail>().is_some() {
                    AuthError::UserAlreadyExists
                } else {
                    tracing::error!("Failed to store user: {:?}", e);
                    AuthError::Internal
                }
            })?;

        tracing::info!("User registered");
        Ok(AuthenticatedUser {
            id,
            email,
            name: name.to_string(),
        })
    }

    #[instrument(
        name = "AuthService: Login attempt",
        skip(self, password),
        fields(user_email = %email)
    )]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedUser, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        // 1. Fetch User
        let user = self.repo.find_by_email(&email).await.map_err(|e| {
            tracing::error!("Database error during login: {:?}", e);
            AuthError::Internal
        })?;

        let user = match user {
            Some(u) => u,
            None => {
                tracing::warn!("Login failed: User not found");
                return Err(AuthError::WrongCredentials);
            }
        };

        // 2. Parse Hash
        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
            tracing::error!("Critical: Failed to parse password hash from DB: {:?}", e);
            AuthError::Internal
        })?;

        // 3. Verify Password
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Login failed: Invalid password provided");
            return Err(AuthError::WrongCredentials);
        }

        tracing::info!("User authenticated successfully");
        Ok(AuthenticatedUser {
            id: user.id,
            email: user.email,
            name: user.name,
        })
    }
}
