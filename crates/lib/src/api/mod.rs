//! Aura REST API: client, wire types, and the per-area traits view-models depend on.
//!
//! [`ApiClient`] implements every trait; view-models take `Arc<dyn ...Api>` so they can be
//! driven by in-memory fakes in tests.

mod agent;
mod auth;
mod client;
mod missions;
mod settings;
mod types;

pub use client::{error_message, ApiClient, ApiError};
pub use types::{
    Ack, AvailableModels, ChatMessage, ChatRole, FileContent, FileNode, MissionStatus,
    ModelAssignment, ModelAssignmentList, NodeKind, ProviderKey, ProviderKeyList,
    RegisterRequest, Task, TaskId, TaskStatus, Token, User,
};

use async_trait::async_trait;

/// `/auth` endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Form-encoded password grant; returns the bearer token (not persisted here).
    async fn login(&self, email: &str, password: &str) -> Result<Token, ApiError>;
    async fn register(&self, req: &RegisterRequest) -> Result<User, ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
}

/// Project list and lifecycle.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<String>, ApiError>;
    async fn create_project(&self, name: &str) -> Result<(), ApiError>;
    async fn delete_project(&self, name: &str) -> Result<(), ApiError>;
    /// Make the project active server-side (starts background indexing).
    async fn load_project(&self, name: &str) -> Result<Ack, ApiError>;
}

/// Task CRUD and mission control for one project.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list_tasks(&self, project: &str) -> Result<Vec<Task>, ApiError>;
    async fn add_task(&self, project: &str, description: &str) -> Result<(), ApiError>;
    async fn update_task(&self, project: &str, id: TaskId, description: &str) -> Result<(), ApiError>;
    async fn delete_task(&self, project: &str, id: TaskId) -> Result<(), ApiError>;
    async fn reorder_tasks(&self, project: &str, ordered: &[TaskId]) -> Result<(), ApiError>;
    async fn dispatch_mission(&self, project: &str) -> Result<Ack, ApiError>;
    async fn stop_mission(&self, project: &str) -> Result<Ack, ApiError>;
    async fn mission_status(&self, project: &str) -> Result<MissionStatus, ApiError>;
}

/// Conversational prompt.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_prompt(
        &self,
        project: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Ack, ApiError>;
}

/// Project workspace files.
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    async fn file_tree(&self, project: &str) -> Result<Vec<FileNode>, ApiError>;
    async fn file_content(&self, project: &str, path: &str) -> Result<String, ApiError>;
    async fn write_file(&self, project: &str, path: &str, content: &str) -> Result<(), ApiError>;
}

/// Provider keys and model-role assignments.
#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn list_keys(&self) -> Result<Vec<ProviderKey>, ApiError>;
    async fn save_key(&self, provider: &str, api_key: &str) -> Result<ProviderKey, ApiError>;
    async fn delete_key(&self, provider: &str) -> Result<(), ApiError>;
    async fn list_assignments(&self) -> Result<Vec<ModelAssignment>, ApiError>;
    async fn save_assignments(&self, assignments: &[ModelAssignment]) -> Result<(), ApiError>;
    async fn available_models(&self) -> Result<AvailableModels, ApiError>;
}
