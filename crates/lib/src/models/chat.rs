//! Command console transcript: boot sequence, prompts to the agent, live status lines.
//!
//! `messages` is what the console renders; `history` is what the backend sees. Only real
//! user/assistant turns ever enter `history`.

use super::bump;
use crate::api::{ChatApi, ChatMessage};
use crate::transport::protocol::{
    AGENT_STATUS, AURA_RESPONSE, MISSION_FAILURE, MISSION_SUCCESS, PHASE, SYSTEM_LOG,
};
use crate::transport::{AgentStatus, Envelope, EventBus, ServerEvent, Subscription};
use crate::util::lock;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const PROJECT_PROMPT: &str =
    "Create a new project or load an existing one to begin.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Booting,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Boot,
    System,
    Status,
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub id: u64,
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Local>,
}

/// One boot line, shown `at` after the model is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootLine {
    pub at: Duration,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootScript {
    lines: Vec<BootLine>,
}

impl BootScript {
    /// The stock intro played by the console.
    pub fn standard() -> Self {
        let lines = [
            (150, "AURA COMMAND DECK"),
            (450, "Establishing uplink to agent core..."),
            (850, "Loading cognitive modules..."),
            (1300, "Calibrating code synthesis matrix..."),
            (1800, "All systems nominal."),
        ];
        Self {
            lines: lines
                .iter()
                .map(|(ms, text)| BootLine {
                    at: Duration::from_millis(*ms),
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit lines. Offsets are clamped so they never decrease.
    pub fn from_lines(lines: impl IntoIterator<Item = BootLine>) -> Self {
        let mut last = Duration::ZERO;
        let lines = lines
            .into_iter()
            .map(|mut line| {
                line.at = line.at.max(last);
                last = line.at;
                line
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[BootLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.lines.last().map(|l| l.at).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub phase: ChatPhase,
    pub project: Option<String>,
    pub processing: bool,
    pub messages: Vec<DisplayMessage>,
    pub history: Vec<ChatMessage>,
}

struct ChatState {
    phase: ChatPhase,
    project: Option<String>,
    processing: bool,
    messages: Vec<DisplayMessage>,
    history: Vec<ChatMessage>,
    next_id: u64,
    generation: u64,
    subscriptions: Vec<Subscription>,
}

impl ChatState {
    fn push(&mut self, kind: MessageKind, sender: &str, content: impl Into<String>) {
        self.next_id += 1;
        self.messages.push(DisplayMessage {
            id: self.next_id,
            sender: sender.to_string(),
            content: content.into(),
            kind,
            timestamp: Local::now(),
        });
    }

    fn finish_boot(&mut self) {
        self.phase = ChatPhase::Ready;
        self.push(MessageKind::System, SYSTEM, PROJECT_PROMPT);
    }
}

const AURA: &str = "AURA";
const SYSTEM: &str = "SYSTEM";
const USER: &str = "USER";

struct ChatInner {
    api: Arc<dyn ChatApi>,
    bus: EventBus,
    state: Mutex<ChatState>,
    revision: watch::Sender<u64>,
}

impl ChatInner {
    fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let out = f(&mut lock(&self.state));
        bump(&self.revision);
        out
    }

    fn on_event(&self, env: &Envelope) {
        match ServerEvent::from_envelope(env) {
            ServerEvent::SystemLog(text) if !text.trim().is_empty() => {
                self.update(|st| st.push(MessageKind::System, SYSTEM, text));
            }
            ServerEvent::AgentStatus(status) => {
                self.update(|st| st.push(MessageKind::Status, AURA, status_line(&status)));
            }
            ServerEvent::AuraResponse(text) if !text.trim().is_empty() => {
                self.update(|st| st.push(MessageKind::Assistant, AURA, text));
            }
            ServerEvent::Phase(text) if !text.trim().is_empty() => {
                self.update(|st| st.push(MessageKind::Status, AURA, text));
            }
            ServerEvent::MissionSuccess => {
                self.update(|st| st.push(MessageKind::System, SYSTEM, "Mission accomplished."));
            }
            ServerEvent::MissionFailure(reason) => {
                let text = if reason.trim().is_empty() {
                    "Mission failed.".to_string()
                } else {
                    format!("Mission failed: {}", reason)
                };
                self.update(|st| st.push(MessageKind::Error, SYSTEM, text));
            }
            _ => {}
        }
    }
}

/// Console line for an `agent_status` event.
pub fn status_line(status: &AgentStatus) -> String {
    match status {
        AgentStatus::Thinking => "Aura is planning the next steps...".to_string(),
        AgentStatus::Executing => "Aura is executing the mission...".to_string(),
        AgentStatus::Idle => "Mission complete. Aura is standing by.".to_string(),
        AgentStatus::Other(s) => s.clone(),
    }
}

/// Clears `processing` on every exit path of a send, including cancellation.
struct BusyGuard<'a> {
    inner: &'a ChatInner,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.inner.update(|st| st.processing = false);
    }
}

pub struct ChatModel {
    inner: Arc<ChatInner>,
    boot: Option<JoinHandle<()>>,
}

impl ChatModel {
    /// Create the model and start the boot script. Must be called inside a tokio runtime
    /// unless `script` is empty.
    pub fn new(api: Arc<dyn ChatApi>, bus: EventBus, script: BootScript) -> Self {
        let (revision, _) = watch::channel(0);
        let inner = Arc::new(ChatInner {
            api,
            bus,
            state: Mutex::new(ChatState {
                phase: ChatPhase::Booting,
                project: None,
                processing: false,
                messages: Vec::new(),
                history: Vec::new(),
                next_id: 0,
                generation: 0,
                subscriptions: Vec::new(),
            }),
            revision,
        });

        let boot = if script.is_empty() {
            inner.update(ChatState::finish_boot);
            None
        } else {
            Some(tokio::spawn(run_boot(Arc::downgrade(&inner), script)))
        };
        Self { inner, boot }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let st = lock(&self.inner.state);
        ChatSnapshot {
            phase: st.phase,
            project: st.project.clone(),
            processing: st.processing,
            messages: st.messages.clone(),
            history: st.history.clone(),
        }
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn phase(&self) -> ChatPhase {
        lock(&self.inner.state).phase
    }

    /// Scope the console to `project`: resets the conversation history, appends a
    /// confirmation and re-subscribes to live events. Rejected while booting.
    pub fn select_project(&self, project: &str) -> bool {
        let project = project.trim();
        if project.is_empty() {
            return false;
        }
        let old = {
            let mut st = lock(&self.inner.state);
            if st.phase == ChatPhase::Booting {
                return false;
            }
            st.generation += 1;
            st.project = Some(project.to_string());
            st.history.clear();
            st.push(
                MessageKind::System,
                SYSTEM,
                format!("Project '{}' loaded. Aura is ready for your instructions.", project),
            );
            let subs = self.subscribe_live();
            std::mem::replace(&mut st.subscriptions, subs)
        };
        bump(&self.inner.revision);
        for sub in old {
            sub.unsubscribe();
        }
        log::info!("chat scoped to project {}", project);
        true
    }

    fn subscribe_live(&self) -> Vec<Subscription> {
        [
            SYSTEM_LOG,
            AGENT_STATUS,
            AURA_RESPONSE,
            PHASE,
            MISSION_SUCCESS,
            MISSION_FAILURE,
        ]
        .into_iter()
        .map(|typ| {
            let weak: Weak<ChatInner> = Arc::downgrade(&self.inner);
            self.inner.bus.on(typ, move |env| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(env);
                }
            })
        })
        .collect()
    }

    /// Drop the active project and its live subscriptions.
    pub fn clear_project(&self) {
        let old = self.inner.update(|st| {
            st.generation += 1;
            st.project = None;
            st.history.clear();
            st.push(MessageKind::System, SYSTEM, PROJECT_PROMPT);
            std::mem::take(&mut st.subscriptions)
        });
        for sub in old {
            sub.unsubscribe();
        }
    }

    /// Send `text` to the agent. Returns `false` without doing anything when busy, booting,
    /// without a project, or for blank text; `true` once the prompt was attempted.
    pub async fn send_message(&self, text: &str) -> bool {
        let text = text.trim();
        let (project, history, generation, turn) = {
            let mut st = lock(&self.inner.state);
            if st.processing || st.phase == ChatPhase::Booting || text.is_empty() {
                return false;
            }
            let Some(project) = st.project.clone() else {
                return false;
            };
            let turn = ChatMessage::user(text);
            st.push(MessageKind::User, USER, text);
            st.history.push(turn.clone());
            st.processing = true;
            (project, st.history.clone(), st.generation, turn)
        };
        bump(&self.inner.revision);
        let _busy = BusyGuard { inner: &self.inner };

        let result = self.inner.api.send_prompt(&project, text, &history).await;

        let mut st = lock(&self.inner.state);
        if st.generation != generation {
            log::debug!("discarding reply for superseded project {}", project);
            return true;
        }
        match result {
            Ok(ack) => {
                st.push(MessageKind::Assistant, AURA, ack.message.clone());
                st.history.push(ChatMessage::assistant(ack.message));
            }
            Err(e) => {
                log::warn!("prompt for {} failed: {}", project, e);
                if st.history.last() == Some(&turn) {
                    st.history.pop();
                }
                st.push(MessageKind::Error, SYSTEM, format!("Error: {}", e));
            }
        }
        true
    }
}

impl Drop for ChatModel {
    fn drop(&mut self) {
        if let Some(boot) = self.boot.take() {
            boot.abort();
        }
        let subs = std::mem::take(&mut lock(&self.inner.state).subscriptions);
        for sub in subs {
            sub.unsubscribe();
        }
    }
}

async fn run_boot(inner: Weak<ChatInner>, script: BootScript) {
    let start = Instant::now();
    for line in script.lines {
        tokio::time::sleep_until(start + line.at).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.update(|st| st.push(MessageKind::Boot, SYSTEM, line.text));
    }
    if let Some(inner) = inner.upgrade() {
        inner.update(ChatState::finish_boot);
        log::debug!("boot sequence finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Ack, ApiError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeChat {
        calls: StdMutex<Vec<(String, String, Vec<ChatMessage>)>>,
        replies: StdMutex<VecDeque<Result<Ack, ApiError>>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeChat {
        fn replying(replies: Vec<Result<Ack, ApiError>>) -> Self {
            Self {
                replies: StdMutex::new(replies.into()),
                ..Default::default()
            }
        }
    }

    fn ack(message: &str) -> Result<Ack, ApiError> {
        Ok(Ack {
            message: message.to_string(),
        })
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn send_prompt(
            &self,
            project: &str,
            prompt: &str,
            history: &[ChatMessage],
        ) -> Result<Ack, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push((project.to_string(), prompt.to_string(), history.to_vec()));
            match &self.gate {
                Some(gate) => gate.notified().await,
                None => tokio::task::yield_now().await,
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ack("ok"))
        }
    }

    fn ready_chat(api: Arc<FakeChat>) -> (ChatModel, EventBus) {
        let bus = EventBus::new();
        let chat = ChatModel::new(api, bus.clone(), BootScript::empty());
        assert!(chat.select_project("demo"));
        (chat, bus)
    }

    #[tokio::test]
    async fn empty_script_is_ready_with_project_prompt() {
        let chat = ChatModel::new(Arc::new(FakeChat::default()), EventBus::new(), BootScript::empty());
        let snap = chat.snapshot();
        assert_eq!(snap.phase, ChatPhase::Ready);
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].content, PROJECT_PROMPT);
        assert!(!chat.send_message("hello").await, "no project yet");
    }

    #[tokio::test(start_paused = true)]
    async fn boot_plays_in_order_then_accepts_project() {
        let script = BootScript::standard();
        let lines = script.lines().len();
        let total = script.duration();
        let chat = ChatModel::new(Arc::new(FakeChat::default()), EventBus::new(), script);
        assert_eq!(chat.phase(), ChatPhase::Booting);
        assert!(!chat.select_project("demo"));

        let mut rev = chat.watch_revision();
        tokio::time::timeout(total + Duration::from_secs(1), async {
            while chat.phase() != ChatPhase::Ready {
                rev.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        let snap = chat.snapshot();
        assert_eq!(snap.messages.len(), lines + 1);
        assert!(snap.messages[..lines].iter().all(|m| m.kind == MessageKind::Boot));
        assert!(snap.messages.windows(2).all(|w| w[0].id < w[1].id));
        assert!(snap.history.is_empty());
        assert!(chat.select_project("demo"));
    }

    #[tokio::test]
    async fn history_holds_only_successful_turns() {
        let api = Arc::new(FakeChat::replying(vec![ack("hi there"), ack("done")]));
        let (chat, bus) = ready_chat(api.clone());
        bus.emit(&Envelope::new(SYSTEM_LOG).with_content(json!("indexing")));

        assert!(chat.send_message("hello").await);
        assert!(chat.send_message("next").await);

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, vec![ChatMessage::user("hello")]);
        assert_eq!(
            calls[1].2,
            vec![
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi there"),
                ChatMessage::user("next"),
            ]
        );
        let snap = chat.snapshot();
        assert_eq!(snap.history.len(), 4);
        assert!(snap.messages.iter().any(|m| m.content == "indexing"));
        assert!(!snap.processing);
    }

    #[tokio::test]
    async fn rapid_double_send_makes_one_call() {
        let api = Arc::new(FakeChat::default());
        let (chat, _bus) = ready_chat(api.clone());
        let (a, b) = tokio::join!(chat.send_message("one"), chat.send_message("two"));
        assert!(a);
        assert!(!b);
        assert_eq!(api.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let api = Arc::new(FakeChat::default());
        let (chat, _bus) = ready_chat(api.clone());
        assert!(!chat.send_message("   ").await);
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_send_rolls_back_user_turn() {
        let api = Arc::new(FakeChat::replying(vec![Err(ApiError::Api {
            status: 500,
            message: "backend exploded".into(),
        })]));
        let (chat, _bus) = ready_chat(api);
        assert!(chat.send_message("build it").await);
        let snap = chat.snapshot();
        assert!(snap.history.is_empty());
        assert!(!snap.processing);
        let last = snap.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert!(last.content.contains("backend exploded"));
        assert!(snap.messages.iter().any(|m| m.kind == MessageKind::User));
    }

    #[tokio::test]
    async fn reply_for_previous_project_is_discarded() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeChat {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (chat, _bus) = ready_chat(api);
        let chat = Arc::new(chat);
        let sender = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send_message("hello").await })
        };
        while !chat.snapshot().processing {
            tokio::task::yield_now().await;
        }
        assert!(chat.select_project("other"));
        gate.notify_one();
        assert!(sender.await.unwrap());

        let snap = chat.snapshot();
        assert_eq!(snap.project.as_deref(), Some("other"));
        assert!(snap.history.is_empty());
        assert!(snap.messages.iter().all(|m| m.kind != MessageKind::Assistant));
        assert!(!snap.processing);
    }

    #[tokio::test]
    async fn selecting_a_project_keeps_transcript_and_resets_history() {
        let (chat, _bus) = ready_chat(Arc::new(FakeChat::replying(vec![ack("hi")])));
        assert!(chat.send_message("hello").await);
        let before = chat.snapshot();
        assert_eq!(before.history.len(), 2);

        assert!(chat.select_project("b"));
        let after = chat.snapshot();
        assert!(after.history.is_empty());
        assert_eq!(after.messages.len(), before.messages.len() + 1);
        assert_eq!(&after.messages[..before.messages.len()], &before.messages[..]);
        let last = after.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert!(last.content.contains("'b'"));
    }

    #[tokio::test]
    async fn overlapping_selects_leave_one_subscription_set() {
        let (chat, bus) = ready_chat(Arc::new(FakeChat::default()));
        let chat = Arc::new(chat);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let chat = chat.clone();
                tokio::task::spawn_blocking(move || chat.select_project(&format!("p{}", i)))
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(bus.handler_count(SYSTEM_LOG), 1);
        assert_eq!(bus.handler_count(AGENT_STATUS), 1);
    }

    #[tokio::test]
    async fn agent_status_lines_and_resubscription() {
        let (chat, bus) = ready_chat(Arc::new(FakeChat::default()));
        bus.emit(&Envelope::new(AGENT_STATUS).with_status("thinking"));
        bus.emit(&Envelope::new(AGENT_STATUS).with_status("idle"));
        bus.emit(&Envelope::new(AGENT_STATUS).with_status("compiling"));
        let contents: Vec<String> = chat
            .snapshot()
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Status)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(
            contents,
            vec![
                status_line(&AgentStatus::Thinking),
                status_line(&AgentStatus::Idle),
                "compiling".to_string(),
            ]
        );

        assert!(chat.select_project("second"));
        assert_eq!(bus.handler_count(AGENT_STATUS), 1);
        bus.emit(&Envelope::new(AGENT_STATUS).with_status("thinking"));
        let thinking = chat
            .snapshot()
            .messages
            .iter()
            .filter(|m| m.content == status_line(&AgentStatus::Thinking))
            .count();
        assert_eq!(thinking, 2, "one line per event after re-selecting");
        drop(chat);
        assert_eq!(bus.handler_count(AGENT_STATUS), 0);
    }
}
