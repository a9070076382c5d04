//! Provider keys and per-role model assignments. No events exist for these; every mutation
//! is followed by a re-load.

use super::{bump, ModelError};
use crate::api::{ApiError, AvailableModels, ModelAssignment, ProviderKey, SettingsApi};
use crate::util::lock;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct SettingsSnapshot {
    pub keys: Vec<ProviderKey>,
    pub assignments: Vec<ModelAssignment>,
    pub available: AvailableModels,
    pub error: Option<String>,
}

pub fn validate_assignment(a: &ModelAssignment) -> Result<(), ModelError> {
    if a.role_name.trim().is_empty() {
        return Err(ModelError::validation("role name must not be empty"));
    }
    if a.model_id.trim().is_empty() {
        return Err(ModelError::validation(format!(
            "no model selected for role '{}'",
            a.role_name
        )));
    }
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&a.temperature) {
        return Err(ModelError::validation(format!(
            "temperature for '{}' must be between {} and {}",
            a.role_name, MIN_TEMPERATURE, MAX_TEMPERATURE
        )));
    }
    Ok(())
}

pub struct SettingsModel {
    api: Arc<dyn SettingsApi>,
    state: Mutex<SettingsSnapshot>,
    revision: watch::Sender<u64>,
}

impl SettingsModel {
    pub fn new(api: Arc<dyn SettingsApi>) -> Self {
        Self {
            api,
            state: Mutex::new(SettingsSnapshot::default()),
            revision: watch::channel(0).0,
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        lock(&self.state).clone()
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn record<T>(
        &self,
        result: Result<T, ApiError>,
        apply: impl FnOnce(&mut SettingsSnapshot, &T),
    ) -> Result<T, ModelError> {
        let mut st = lock(&self.state);
        let out = match result {
            Ok(value) => {
                apply(&mut st, &value);
                st.error = None;
                Ok(value)
            }
            Err(e) => {
                log::warn!("settings request failed: {}", e);
                st.error = Some(e.to_string());
                Err(e.into())
            }
        };
        drop(st);
        bump(&self.revision);
        out
    }

    pub async fn load_keys(&self) -> Result<Vec<ProviderKey>, ModelError> {
        let result = self.api.list_keys().await;
        self.record(result, |st, keys| st.keys = keys.clone())
    }

    pub async fn save_key(&self, provider: &str, api_key: &str) -> Result<ProviderKey, ModelError> {
        let provider = provider.trim();
        let api_key = api_key.trim();
        if provider.is_empty() {
            return Err(ModelError::validation("provider must not be empty"));
        }
        if api_key.is_empty() {
            return Err(ModelError::validation("API key must not be empty"));
        }
        let saved = self.api.save_key(provider, api_key).await?;
        log::info!("saved key for {}", provider);
        self.load_keys().await?;
        Ok(saved)
    }

    pub async fn delete_key(&self, provider: &str) -> Result<(), ModelError> {
        self.api.delete_key(provider.trim()).await?;
        self.load_keys().await?;
        Ok(())
    }

    pub async fn load_assignments(&self) -> Result<Vec<ModelAssignment>, ModelError> {
        let result = self.api.list_assignments().await;
        self.record(result, |st, list| st.assignments = list.clone())
    }

    pub async fn load_available_models(&self) -> Result<AvailableModels, ModelError> {
        let result = self.api.available_models().await;
        self.record(result, |st, models| st.available = models.clone())
    }

    /// Validate every entry, save all, re-load.
    pub async fn save_assignments(&self, assignments: &[ModelAssignment]) -> Result<(), ModelError> {
        for a in assignments {
            validate_assignment(a)?;
        }
        self.api.save_assignments(assignments).await?;
        self.load_assignments().await?;
        Ok(())
    }

    /// Change one role's model, keeping the others as last loaded.
    pub async fn assign(&self, role: &str, model_id: &str, temperature: f64) -> Result<(), ModelError> {
        let updated = ModelAssignment {
            role_name: role.trim().to_string(),
            model_id: model_id.trim().to_string(),
            temperature,
        };
        validate_assignment(&updated)?;
        let mut all = self.snapshot().assignments;
        match all.iter_mut().find(|a| a.role_name == updated.role_name) {
            Some(existing) => *existing = updated,
            None => all.push(updated),
        }
        self.save_assignments(&all).await
    }
}
