//! `/auth` endpoints.

use super::client::{ApiClient, ApiError};
use super::types::{RegisterRequest, Token, User};
use super::AuthApi;
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
impl AuthApi for ApiClient {
    /// POST /auth/token (form `username`, `password`).
    async fn login(&self, email: &str, password: &str) -> Result<Token, ApiError> {
        let req = self
            .anonymous(Method::POST, &["auth", "token"])?
            .form(&[("username", email), ("password", password)]);
        self.json(req, false).await
    }

    /// POST /auth/register.
    async fn register(&self, body: &RegisterRequest) -> Result<User, ApiError> {
        let req = self
            .anonymous(Method::POST, &["auth", "register"])?
            .json(body);
        self.json(req, false).await
    }

    /// GET /auth/users/me.
    async fn current_user(&self) -> Result<User, ApiError> {
        let req = self.authed(Method::GET, &["auth", "users", "me"])?;
        self.json(req, true).await
    }
}
