//! Wire types for the Aura REST API.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Task identifier. The backend uses integers; string-encoded integers are accepted on decode.
pub type TaskId = i64;

/// Response of `POST /auth/token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub beta_key: String,
}

/// A mission task as returned by `/api/missions/{project}/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "de_task_id")]
    pub id: TaskId,
    pub description: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Display status derived from `(done, last_error)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn derive(done: bool, last_error: Option<&str>) -> Self {
        if done {
            TaskStatus::Completed
        } else if last_error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::derive(self.done, self.last_error.as_deref())
    }
}

fn de_task_id<'de, D>(deserializer: D) -> Result<TaskId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(i64),
        Str(String),
    }
    match RawId::deserialize(deserializer)? {
        RawId::Num(n) => Ok(n),
        RawId::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid task id: {}", s))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDescription {
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReorderRequest {
    pub ordered_task_ids: Vec<TaskId>,
}

/// One conversation turn sent to the backend as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /agent/projects/{project}/prompt`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a str,
    pub history: &'a [ChatMessage],
}

/// Body of `POST /agent/projects/workspace/{project}/file`.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFileRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

/// Generic `{message}` acknowledgement used by prompt, dispatch, stop and load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default, alias = "reply", alias = "response")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest<'a> {
    pub project_name: &'a str,
}

/// Response of `GET /agent/projects/{project}/status`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MissionStatus {
    #[serde(default)]
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// File tree node from `/agent/projects/workspace/{project}/files`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Depth-first search by path.
    pub fn find<'a>(nodes: &'a [FileNode], path: &str) -> Option<&'a FileNode> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if let Some(found) = node.children.as_deref().and_then(|c| Self::find(c, path)) {
                return Some(found);
            }
        }
        None
    }

    /// Paths of all files (not directories), depth-first.
    pub fn file_paths(nodes: &[FileNode]) -> Vec<String> {
        let mut out = Vec::new();
        fn walk(nodes: &[FileNode], out: &mut Vec<String>) {
            for n in nodes {
                match n.kind {
                    NodeKind::File => out.push(n.path.clone()),
                    NodeKind::Directory => walk(n.children.as_deref().unwrap_or(&[]), out),
                }
            }
        }
        walk(nodes, &mut out);
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(default)]
    pub content: String,
}

/// Configured provider key as shown in settings (never the raw key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderKey {
    pub provider_name: String,
    pub masked_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderKeyList {
    #[serde(default)]
    pub keys: Vec<ProviderKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderKeyCreate<'a> {
    pub provider_name: &'a str,
    pub api_key: &'a str,
}

/// Model bound to an agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAssignment {
    pub role_name: String,
    pub model_id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelAssignmentList {
    #[serde(default)]
    pub assignments: Vec<ModelAssignment>,
}

/// Models grouped by provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableModels {
    #[serde(default)]
    pub models: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_pure_function_of_done_and_error() {
        assert_eq!(TaskStatus::derive(true, None), TaskStatus::Completed);
        assert_eq!(TaskStatus::derive(true, Some("boom")), TaskStatus::Completed);
        assert_eq!(TaskStatus::derive(false, Some("boom")), TaskStatus::Failed);
        assert_eq!(TaskStatus::derive(false, None), TaskStatus::Pending);
    }

    #[test]
    fn task_accepts_numeric_and_string_ids() {
        let a: Task = serde_json::from_str(r#"{"id":3,"description":"x","done":false}"#).unwrap();
        let b: Task =
            serde_json::from_str(r#"{"id":"7","description":"y","done":true,"last_error":null}"#)
                .unwrap();
        assert_eq!(a.id, 3);
        assert_eq!(b.id, 7);
        assert_eq!(b.status(), TaskStatus::Completed);
        assert!(serde_json::from_str::<Task>(r#"{"id":"seven","description":"z"}"#).is_err());
    }

    #[test]
    fn chat_roles_serialize_lowercase() {
        let v = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn file_tree_search_and_flatten() {
        let tree: Vec<FileNode> = serde_json::from_value(serde_json::json!([
            {"name": "src", "path": "src", "type": "directory", "children": [
                {"name": "main.py", "path": "src/main.py", "type": "file"}
            ]},
            {"name": "README.md", "path": "README.md", "type": "file"}
        ]))
        .unwrap();
        assert!(FileNode::find(&tree, "src").unwrap().is_dir());
        assert_eq!(FileNode::find(&tree, "src/main.py").unwrap().name, "main.py");
        assert!(FileNode::find(&tree, "nope").is_none());
        assert_eq!(FileNode::file_paths(&tree), vec!["src/main.py", "README.md"]);
    }
}
