//! `/api-keys` and `/api/assignments` endpoints.

use super::client::{ApiClient, ApiError};
use super::types::{
    AvailableModels, ModelAssignment, ModelAssignmentList, ProviderKey, ProviderKeyCreate,
    ProviderKeyList,
};
use super::SettingsApi;
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
impl SettingsApi for ApiClient {
    async fn list_keys(&self) -> Result<Vec<ProviderKey>, ApiError> {
        let req = self.authed(Method::GET, &["api-keys"])?;
        let list: Option<ProviderKeyList> = self.json(req, true).await?;
        Ok(list.map(|l| l.keys).unwrap_or_default())
    }

    async fn save_key(&self, provider: &str, api_key: &str) -> Result<ProviderKey, ApiError> {
        let req = self
            .authed(Method::POST, &["api-keys"])?
            .json(&ProviderKeyCreate {
                provider_name: provider,
                api_key,
            });
        self.json(req, true).await
    }

    async fn delete_key(&self, provider: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::DELETE, &["api-keys", provider])?;
        self.empty(req, true).await
    }

    async fn list_assignments(&self) -> Result<Vec<ModelAssignment>, ApiError> {
        let req = self.authed(Method::GET, &["api", "assignments"])?;
        let list: Option<ModelAssignmentList> = self.json(req, true).await?;
        Ok(list.map(|l| l.assignments).unwrap_or_default())
    }

    async fn save_assignments(&self, assignments: &[ModelAssignment]) -> Result<(), ApiError> {
        let req = self
            .authed(Method::POST, &["api", "assignments"])?
            .json(&ModelAssignmentList {
                assignments: assignments.to_vec(),
            });
        self.empty(req, true).await
    }

    async fn available_models(&self) -> Result<AvailableModels, ApiError> {
        let req = self.authed(Method::GET, &["api", "assignments", "available-models"])?;
        let models: Option<AvailableModels> = self.json(req, true).await?;
        Ok(models.unwrap_or_default())
    }
}
