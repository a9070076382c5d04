//! Login, registration and the stored session.

use super::ModelError;
use crate::api::{AuthApi, RegisterRequest, User};
use crate::session::{StoredSession, TokenStore};
use std::sync::Arc;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Checks run before `/auth/register` is called.
pub fn validate_registration(
    email: &str,
    password: &str,
    confirm: &str,
    beta_key: &str,
) -> Result<(), ModelError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ModelError::validation("a valid email address is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ModelError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password != confirm {
        return Err(ModelError::validation("passwords do not match"));
    }
    if beta_key.trim().is_empty() {
        return Err(ModelError::validation("a beta key is required"));
    }
    Ok(())
}

pub struct AuthService {
    api: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenStore>,
}

impl AuthService {
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { api, tokens }
    }

    pub fn is_logged_in(&self) -> bool {
        self.tokens.token().is_some()
    }

    pub fn session(&self) -> Option<StoredSession> {
        self.tokens.load()
    }

    /// Exchange credentials for a token, persist it, and return who we are.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ModelError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ModelError::validation("email and password are required"));
        }
        let token = self.api.login(email, password).await?;
        self.tokens
            .save(&StoredSession {
                access_token: token.access_token,
                email: Some(email.to_string()),
            })
            .map_err(|e| ModelError::Session(e.to_string()))?;
        let user = self.api.current_user().await?;
        log::info!("logged in as {}", user.email);
        Ok(user)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
        beta_key: &str,
    ) -> Result<User, ModelError> {
        validate_registration(email, password, confirm, beta_key)?;
        let user = self
            .api
            .register(&RegisterRequest {
                email: email.trim().to_string(),
                password: password.to_string(),
                beta_key: beta_key.trim().to_string(),
            })
            .await?;
        log::info!("registered {}", user.email);
        Ok(user)
    }

    pub fn logout(&self) {
        self.tokens.clear();
    }

    pub async fn current_user(&self) -> Result<User, ModelError> {
        Ok(self.api.current_user().await?)
    }
}
