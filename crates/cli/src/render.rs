//! Plain-text rendering of view-model snapshots and socket events.

use lib::api::{AvailableModels, FileNode, ModelAssignment, ProviderKey, Task};
use lib::models::{DisplayMessage, MessageKind, MissionState, TasksSnapshot};
use lib::transport::{AgentStatus, ConnectionStatus, Envelope, ServerEvent};

pub fn message_line(m: &DisplayMessage) -> String {
    let time = m.timestamp.format("%H:%M:%S");
    match m.kind {
        MessageKind::Boot => format!("  {}", m.content),
        MessageKind::User => format!("[{}] you> {}", time, m.content),
        MessageKind::Assistant => format!("[{}] {}> {}", time, m.sender.to_lowercase(), m.content),
        MessageKind::Status => format!("[{}] ... {}", time, m.content),
        MessageKind::System => format!("[{}] * {}", time, m.content),
        MessageKind::Error => format!("[{}] ! {}", time, m.content),
    }
}

pub fn task_line(index: usize, task: &Task, active: bool) -> String {
    let marker = if active { ">" } else { " " };
    let mut line = format!(
        "{}{:>3}. [{:<9}] #{} {}",
        marker,
        index + 1,
        task.status().as_str(),
        task.id,
        task.description
    );
    if let Some(err) = task.last_error.as_deref().filter(|_| !task.done) {
        line.push_str(&format!("\n        error: {}", err));
    }
    line
}

pub fn tasks_block(snap: &TasksSnapshot) -> String {
    if snap.tasks.is_empty() {
        return "(no tasks)".to_string();
    }
    snap.tasks
        .iter()
        .enumerate()
        .map(|(i, t)| task_line(i, t, snap.active_task == Some(t.id)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn mission_label(state: MissionState) -> &'static str {
    match state {
        MissionState::Idle => "idle",
        MissionState::Optimistic => "dispatching",
        MissionState::Running => "running",
    }
}

pub fn tree_lines(nodes: &[FileNode]) -> Vec<String> {
    fn walk(nodes: &[FileNode], depth: usize, out: &mut Vec<String>) {
        for node in nodes {
            let suffix = if node.is_dir() { "/" } else { "" };
            out.push(format!("{}{}{}", "  ".repeat(depth), node.name, suffix));
            if let Some(children) = node.children.as_deref() {
                walk(children, depth + 1, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(nodes, 0, &mut out);
    out
}

pub fn key_line(key: &ProviderKey) -> String {
    format!("{:<16} {}", key.provider_name, key.masked_key)
}

pub fn assignment_line(a: &ModelAssignment) -> String {
    format!("{:<16} {:<32} t={:.2}", a.role_name, a.model_id, a.temperature)
}

pub fn available_lines(models: &AvailableModels) -> Vec<String> {
    models
        .models
        .iter()
        .map(|(provider, ids)| format!("{}: {}", provider, ids.join(", ")))
        .collect()
}

pub fn connection_label(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Disconnected => "disconnected".to_string(),
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Reconnecting { attempt } => format!("reconnecting (attempt {})", attempt),
        ConnectionStatus::Exhausted => "connection lost; reconnect attempts exhausted".to_string(),
    }
}

fn status_word(status: &AgentStatus) -> &str {
    match status {
        AgentStatus::Thinking => "thinking",
        AgentStatus::Executing => "executing",
        AgentStatus::Idle => "idle",
        AgentStatus::Other(s) => s,
    }
}

/// One line for `aura watch`.
pub fn event_line(env: &Envelope) -> String {
    match ServerEvent::from_envelope(env) {
        ServerEvent::Connected(text) => format!("[socket] {}", text),
        ServerEvent::SystemLog(text) => format!("[log] {}", text),
        ServerEvent::AgentStatus(status) => format!("[status] {}", status_word(&status)),
        ServerEvent::AuraResponse(text) => format!("[aura] {}", text),
        ServerEvent::Phase(text) => format!("[phase] {}", text),
        ServerEvent::TasksUpdated => "[tasks] updated".to_string(),
        ServerEvent::MissionLogUpdated(tasks) => format!("[tasks] {} in mission log", tasks.len()),
        ServerEvent::ActiveTaskUpdated(Some(id)) => format!("[tasks] working on #{}", id),
        ServerEvent::ActiveTaskUpdated(None) => "[tasks] no active task".to_string(),
        ServerEvent::MissionCompleted => "[mission] completed".to_string(),
        ServerEvent::MissionSuccess => "[mission] success".to_string(),
        ServerEvent::MissionFailure(reason) => format!("[mission] failed: {}", reason),
        ServerEvent::CodeStreamChunk { file_path, chunk } => {
            format!("[code] {} +{} chars", file_path, chunk.chars().count())
        }
        ServerEvent::FileContentUpdated { file_path, content } => {
            format!("[code] {} replaced ({} chars)", file_path, content.chars().count())
        }
        ServerEvent::FileWritingPending(path) => format!("[files] writing {}", path),
        ServerEvent::FileTreeUpdated(tree) => format!("[files] tree updated ({} entries)", tree.len()),
        ServerEvent::Other(env) => format!("[{}] {}", env.typ, env.content_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib::api::NodeKind;
    use serde_json::json;

    fn task(id: i64, done: bool, err: Option<&str>) -> Task {
        Task {
            id,
            description: format!("task {}", id),
            done,
            tool_call: None,
            last_error: err.map(String::from),
        }
    }

    #[test]
    fn task_lines_show_status_and_errors() {
        assert!(task_line(0, &task(1, true, None), false).contains("[completed]"));
        let failed = task_line(1, &task(2, false, Some("boom")), true);
        assert!(failed.starts_with(">  2."));
        assert!(failed.contains("error: boom"));
    }

    #[test]
    fn tree_is_indented() {
        let tree = vec![FileNode {
            name: "src".into(),
            path: "src".into(),
            kind: NodeKind::Directory,
            children: Some(vec![FileNode {
                name: "main.py".into(),
                path: "src/main.py".into(),
                kind: NodeKind::File,
                children: None,
            }]),
        }];
        assert_eq!(tree_lines(&tree), vec!["src/", "  main.py"]);
    }

    #[test]
    fn events_render_one_line_each() {
        let env = Envelope::new("agent_status").with_status("executing");
        assert_eq!(event_line(&env), "[status] executing");
        let env = Envelope::new("code_stream_chunk")
            .with_content(json!({"filePath": "a.py", "chunk": "abc"}));
        assert_eq!(event_line(&env), "[code] a.py +3 chars");
        let env = Envelope::new("file_writing_pending").with_content(json!({"filePath": "a.py"}));
        assert_eq!(event_line(&env), "[files] writing a.py");
        let env = Envelope::new("custom").with_content(json!("hi"));
        assert_eq!(event_line(&env), "[custom] hi");
    }
}
