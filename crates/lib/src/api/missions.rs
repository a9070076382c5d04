//! `/api/missions` endpoints: projects and their task lists.

use super::client::{ApiClient, ApiError};
use super::types::{ReorderRequest, Task, TaskDescription, TaskId};
use super::{ProjectApi, TaskApi};
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
impl ProjectApi for ApiClient {
    async fn list_projects(&self) -> Result<Vec<String>, ApiError> {
        let req = self.authed(Method::GET, &["api", "missions"])?;
        let names: Option<Vec<String>> = self.json(req, true).await?;
        Ok(names.unwrap_or_default())
    }

    async fn create_project(&self, name: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::POST, &["api", "missions", name])?;
        self.empty(req, true).await
    }

    async fn delete_project(&self, name: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::DELETE, &["api", "missions", name])?;
        self.empty(req, true).await
    }

    async fn load_project(&self, name: &str) -> Result<super::Ack, ApiError> {
        let req = self.authed(Method::POST, &["agent", "projects", name, "load"])?;
        let ack: Option<super::Ack> = self.json(req, true).await?;
        Ok(ack.unwrap_or_default())
    }
}

#[async_trait]
impl TaskApi for ApiClient {
    async fn list_tasks(&self, project: &str) -> Result<Vec<Task>, ApiError> {
        let req = self.authed(Method::GET, &["api", "missions", project, "tasks"])?;
        let tasks: Option<Vec<Task>> = self.json(req, true).await?;
        Ok(tasks.unwrap_or_default())
    }

    async fn add_task(&self, project: &str, description: &str) -> Result<(), ApiError> {
        let req = self
            .authed(Method::POST, &["api", "missions", project, "tasks"])?
            .json(&TaskDescription {
                description: description.to_string(),
            });
        self.empty(req, true).await
    }

    async fn update_task(&self, project: &str, id: TaskId, description: &str) -> Result<(), ApiError> {
        let id = id.to_string();
        let req = self
            .authed(Method::PUT, &["api", "missions", project, "tasks", &id])?
            .json(&TaskDescription {
                description: description.to_string(),
            });
        self.empty(req, true).await
    }

    async fn delete_task(&self, project: &str, id: TaskId) -> Result<(), ApiError> {
        let id = id.to_string();
        let req = self.authed(Method::DELETE, &["api", "missions", project, "tasks", &id])?;
        self.empty(req, true).await
    }

    async fn reorder_tasks(&self, project: &str, ordered: &[TaskId]) -> Result<(), ApiError> {
        let req = self
            .authed(Method::POST, &["api", "missions", project, "tasks", "reorder"])?
            .json(&ReorderRequest {
                ordered_task_ids: ordered.to_vec(),
            });
        self.empty(req, true).await
    }

    async fn dispatch_mission(&self, project: &str) -> Result<super::Ack, ApiError> {
        let req = self
            .authed(Method::POST, &["agent", "projects", "dispatch"])?
            .json(&super::types::DispatchRequest {
                project_name: project,
            });
        let ack: Option<super::Ack> = self.json(req, true).await?;
        Ok(ack.unwrap_or_default())
    }

    async fn stop_mission(&self, project: &str) -> Result<super::Ack, ApiError> {
        let req = self.authed(Method::POST, &["agent", "projects", project, "stop"])?;
        let ack: Option<super::Ack> = self.json(req, true).await?;
        Ok(ack.unwrap_or_default())
    }

    async fn mission_status(&self, project: &str) -> Result<super::MissionStatus, ApiError> {
        let req = self.authed(Method::GET, &["agent", "projects", project, "status"])?;
        let status: Option<super::MissionStatus> = self.json(req, true).await?;
        Ok(status.unwrap_or_default())
    }
}
