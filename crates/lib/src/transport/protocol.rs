//! Command deck WebSocket frames: `{ "type", "content"?, "status"?, ... }`.

use crate::api::{FileNode, Task, TaskId};
use serde::{Deserialize, Serialize};

/// Subscribe to every frame type.
pub const WILDCARD: &str = "*";

pub const PING: &str = "ping";
pub const SYSTEM_LOG: &str = "system_log";
pub const AGENT_STATUS: &str = "agent_status";
pub const TASKS_UPDATED: &str = "tasks_updated";
pub const MISSION_COMPLETED: &str = "mission_completed";
pub const CODE_STREAM_CHUNK: &str = "code_stream_chunk";
pub const INTERNAL_WS_STATUS: &str = "internal_ws_status";
pub const AURA_RESPONSE: &str = "aura_response";
pub const PHASE: &str = "phase";
pub const FILE_TREE_UPDATED: &str = "file_tree_updated";
pub const FILE_CONTENT_UPDATED: &str = "file_content_updated";
pub const FILE_WRITING_PENDING: &str = "file_writing_pending";
pub const MISSION_LOG_UPDATED: &str = "mission_log_updated";
pub const ACTIVE_TASK_UPDATED: &str = "active_task_updated";
pub const MISSION_SUCCESS: &str = "mission_success";
pub const MISSION_FAILURE: &str = "mission_failure";

/// Raw frame. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    pub fn new(typ: impl Into<String>) -> Self {
        Self {
            typ: typ.into(),
            content: None,
            status: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn ping() -> Self {
        Self::new(PING)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `content` as text: strings verbatim, other JSON values serialized, absent → "".
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn content_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.content.as_ref().and_then(|c| c.get(key))
    }
}

/// Value of `agent_status.status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Thinking,
    Executing,
    Idle,
    Other(String),
}

impl AgentStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "thinking" => AgentStatus::Thinking,
            "executing" => AgentStatus::Executing,
            "idle" => AgentStatus::Idle,
            _ => AgentStatus::Other(s.to_string()),
        }
    }

    /// True for statuses that mean a mission is in progress.
    pub fn is_busy(&self) -> bool {
        matches!(self, AgentStatus::Thinking | AgentStatus::Executing)
    }
}

/// Typed view of the frames the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(String),
    SystemLog(String),
    AgentStatus(AgentStatus),
    AuraResponse(String),
    Phase(String),
    TasksUpdated,
    MissionLogUpdated(Vec<Task>),
    ActiveTaskUpdated(Option<TaskId>),
    MissionCompleted,
    MissionSuccess,
    MissionFailure(String),
    CodeStreamChunk { file_path: String, chunk: String },
    FileContentUpdated { file_path: String, content: String },
    /// The agent is about to stream into this path.
    FileWritingPending(String),
    FileTreeUpdated(Vec<FileNode>),
    Other(Envelope),
}

impl ServerEvent {
    /// Interpret an envelope. Frames of a known type with an unusable payload fall back to `Other`.
    pub fn from_envelope(env: &Envelope) -> Self {
        let other = || ServerEvent::Other(env.clone());
        match env.typ.as_str() {
            INTERNAL_WS_STATUS => ServerEvent::Connected(env.content_text()),
            SYSTEM_LOG => ServerEvent::SystemLog(env.content_text()),
            AGENT_STATUS => match env.status.as_deref() {
                Some(s) => ServerEvent::AgentStatus(AgentStatus::parse(s)),
                None => other(),
            },
            AURA_RESPONSE => ServerEvent::AuraResponse(env.content_text()),
            PHASE => ServerEvent::Phase(env.content_text()),
            TASKS_UPDATED => ServerEvent::TasksUpdated,
            MISSION_LOG_UPDATED => env
                .content_field("tasks")
                .and_then(|t| serde_json::from_value::<Vec<Task>>(t.clone()).ok())
                .map(ServerEvent::MissionLogUpdated)
                .unwrap_or_else(other),
            ACTIVE_TASK_UPDATED => ServerEvent::ActiveTaskUpdated(
                env.content_field("taskId").and_then(|v| {
                    v.as_i64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                }),
            ),
            MISSION_COMPLETED => ServerEvent::MissionCompleted,
            MISSION_SUCCESS => ServerEvent::MissionSuccess,
            MISSION_FAILURE => ServerEvent::MissionFailure(env.content_text()),
            CODE_STREAM_CHUNK => {
                match (file_path_of(env), env.content_field("chunk").and_then(|v| v.as_str())) {
                    (Some(file_path), Some(chunk)) => ServerEvent::CodeStreamChunk {
                        file_path,
                        chunk: chunk.to_string(),
                    },
                    _ => other(),
                }
            }
            FILE_CONTENT_UPDATED => {
                match (file_path_of(env), env.content_field("content").and_then(|v| v.as_str())) {
                    (Some(file_path), Some(content)) => ServerEvent::FileContentUpdated {
                        file_path,
                        content: content.to_string(),
                    },
                    _ => other(),
                }
            }
            FILE_WRITING_PENDING => file_path_of(env)
                .map(ServerEvent::FileWritingPending)
                .unwrap_or_else(other),
            FILE_TREE_UPDATED => env
                .content
                .clone()
                .and_then(|c| serde_json::from_value::<Vec<FileNode>>(c).ok())
                .map(ServerEvent::FileTreeUpdated)
                .unwrap_or_else(other),
            _ => other(),
        }
    }
}

fn file_path_of(env: &Envelope) -> Option<String> {
    env.content_field("filePath")
        .or_else(|| env.content_field("file_path"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ping_serializes_to_bare_type() {
        assert_eq!(
            serde_json::to_string(&Envelope::ping()).unwrap(),
            r#"{"type":"ping"}"#
        );
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let env = Envelope::parse(r#"{"type":"custom","content":"x","seq":4}"#).unwrap();
        assert_eq!(env.typ, "custom");
        assert_eq!(env.extra.get("seq"), Some(&json!(4)));
        assert_eq!(ServerEvent::from_envelope(&env), ServerEvent::Other(env.clone()));
    }

    #[test]
    fn frame_without_type_is_rejected() {
        assert!(Envelope::parse(r#"{"content":"x"}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn agent_status_values() {
        let env = Envelope::new(AGENT_STATUS).with_status("Executing");
        assert_eq!(
            ServerEvent::from_envelope(&env),
            ServerEvent::AgentStatus(AgentStatus::Executing)
        );
        assert_eq!(AgentStatus::parse("paused"), AgentStatus::Other("paused".into()));
        assert!(AgentStatus::Thinking.is_busy());
        assert!(!AgentStatus::Idle.is_busy());
    }

    #[test]
    fn code_stream_chunk_payload() {
        let env = Envelope::new(CODE_STREAM_CHUNK)
            .with_content(json!({"filePath": "src/app.py", "chunk": "def "}));
        assert_eq!(
            ServerEvent::from_envelope(&env),
            ServerEvent::CodeStreamChunk {
                file_path: "src/app.py".into(),
                chunk: "def ".into()
            }
        );
        let broken = Envelope::new(CODE_STREAM_CHUNK).with_content(json!({"chunk": 1}));
        assert!(matches!(ServerEvent::from_envelope(&broken), ServerEvent::Other(_)));
    }

    #[test]
    fn file_writing_pending_names_the_file() {
        let env = Envelope::new(FILE_WRITING_PENDING).with_content(json!({"filePath": "src/lib.rs"}));
        assert_eq!(
            ServerEvent::from_envelope(&env),
            ServerEvent::FileWritingPending("src/lib.rs".into())
        );
        let bare = Envelope::new(FILE_WRITING_PENDING).with_content(json!("src/lib.rs"));
        assert!(matches!(ServerEvent::from_envelope(&bare), ServerEvent::Other(_)));
    }

    #[test]
    fn mission_log_carries_tasks() {
        let env = Envelope::new(MISSION_LOG_UPDATED).with_content(json!({
            "tasks": [{"id": 1, "description": "scaffold", "done": true}]
        }));
        match ServerEvent::from_envelope(&env) {
            ServerEvent::MissionLogUpdated(tasks) => assert_eq!(tasks[0].description, "scaffold"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn active_task_accepts_string_id() {
        let env = Envelope::new(ACTIVE_TASK_UPDATED).with_content(json!({"taskId": "12"}));
        assert_eq!(
            ServerEvent::from_envelope(&env),
            ServerEvent::ActiveTaskUpdated(Some(12))
        );
    }
}
