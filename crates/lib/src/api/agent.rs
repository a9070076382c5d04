//! `/agent/projects` endpoints: chat prompt and workspace files.

use super::client::{ApiClient, ApiError};
use super::types::{Ack, ChatMessage, FileContent, FileNode, PromptRequest, WriteFileRequest};
use super::{ChatApi, WorkspaceApi};
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
impl ChatApi for ApiClient {
    /// POST /agent/projects/{project}/prompt with the conversation so far.
    async fn send_prompt(
        &self,
        project: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<Ack, ApiError> {
        let req = self
            .authed(Method::POST, &["agent", "projects", project, "prompt"])?
            .json(&PromptRequest { prompt, history });
        let ack: Option<Ack> = self.json(req, true).await?;
        Ok(ack.unwrap_or_default())
    }
}

#[async_trait]
impl WorkspaceApi for ApiClient {
    async fn file_tree(&self, project: &str) -> Result<Vec<FileNode>, ApiError> {
        let req = self.authed(
            Method::GET,
            &["agent", "projects", "workspace", project, "files"],
        )?;
        let tree: Option<Vec<FileNode>> = self.json(req, true).await?;
        Ok(tree.unwrap_or_default())
    }

    async fn file_content(&self, project: &str, path: &str) -> Result<String, ApiError> {
        let req = self
            .authed(
                Method::GET,
                &["agent", "projects", "workspace", project, "file"],
            )?
            .query(&[("path", path)]);
        let file: Option<FileContent> = self.json(req, true).await?;
        Ok(file.map(|f| f.content).unwrap_or_default())
    }

    /// POST /agent/projects/workspace/{project}/file; the backend answers 204.
    async fn write_file(&self, project: &str, path: &str, content: &str) -> Result<(), ApiError> {
        let req = self
            .authed(
                Method::POST,
                &["agent", "projects", "workspace", project, "file"],
            )?
            .json(&WriteFileRequest { path, content });
        self.empty(req, true).await
    }
}
