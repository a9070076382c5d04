//! Workspace file tree and the code viewer.
//!
//! Files the agent writes arrive as `code_stream_chunk` frames and accumulate in per-file
//! live buffers. The viewer follows whichever file is being streamed; its displayed text is
//! driven by a [`StreamingRenderer`]. A `file_writing_pending` frame moves the viewer to the
//! named file and empties its buffer so the stream that follows starts from nothing.

use super::{bump, ModelError};
use crate::api::{FileNode, WorkspaceApi};
use crate::config::ConsoleConfig;
use crate::stream::StreamingRenderer;
use crate::transport::protocol::{
    CODE_STREAM_CHUNK, FILE_CONTENT_UPDATED, FILE_TREE_UPDATED, FILE_WRITING_PENDING,
};
use crate::transport::{Envelope, EventBus, ServerEvent, Subscription};
use crate::util::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct FilesSnapshot {
    pub project: Option<String>,
    pub tree: Vec<FileNode>,
    pub open_path: Option<String>,
    /// Full buffer of the open file.
    pub content: String,
    /// What the viewer currently shows (trails `content` while streaming).
    pub displayed: String,
    pub error: Option<String>,
}

#[derive(Default)]
struct FilesState {
    project: Option<String>,
    tree: Vec<FileNode>,
    open_path: Option<String>,
    buffers: HashMap<String, String>,
    generation: u64,
    error: Option<String>,
}

struct FilesInner {
    state: Mutex<FilesState>,
    revision: watch::Sender<u64>,
    renderer: StreamingRenderer,
}

impl FilesInner {
    fn update<R>(&self, f: impl FnOnce(&mut FilesState) -> R) -> R {
        let out = f(&mut lock(&self.state));
        bump(&self.revision);
        out
    }

    fn on_event(&self, env: &Envelope) {
        match ServerEvent::from_envelope(env) {
            ServerEvent::FileTreeUpdated(tree) => self.update(|st| {
                if st.project.is_some() {
                    st.tree = tree;
                }
            }),
            ServerEvent::CodeStreamChunk { file_path, chunk } => self.update(|st| {
                if st.project.is_none() {
                    return;
                }
                let buffer = st.buffers.entry(file_path.clone()).or_default();
                buffer.push_str(&chunk);
                let text = buffer.clone();
                if st.open_path.as_deref() != Some(file_path.as_str()) {
                    log::debug!("viewer following stream into {}", file_path);
                    st.open_path = Some(file_path);
                }
                self.renderer.set_target(text);
            }),
            ServerEvent::FileContentUpdated { file_path, content } => self.update(|st| {
                if st.project.is_none() {
                    return;
                }
                if st.open_path.as_deref() == Some(file_path.as_str()) {
                    self.renderer.set_target(content.clone());
                }
                st.buffers.insert(file_path, content);
            }),
            ServerEvent::FileWritingPending(file_path) => self.update(|st| {
                if st.project.is_none() {
                    return;
                }
                log::debug!("agent about to write {}", file_path);
                st.buffers.insert(file_path.clone(), String::new());
                st.open_path = Some(file_path);
                self.renderer.show_now(String::new());
            }),
            _ => {}
        }
    }
}

pub struct FilesModel {
    api: Arc<dyn WorkspaceApi>,
    inner: Arc<FilesInner>,
    subscriptions: Vec<Subscription>,
}

impl FilesModel {
    /// Must be called inside a tokio runtime (the renderer spawns its ticker).
    pub fn new(api: Arc<dyn WorkspaceApi>, bus: &EventBus, console: &ConsoleConfig) -> Self {
        let inner = Arc::new(FilesInner {
            state: Mutex::new(FilesState::default()),
            revision: watch::channel(0).0,
            renderer: StreamingRenderer::from_config(console),
        });
        let subscriptions = [
            FILE_TREE_UPDATED,
            CODE_STREAM_CHUNK,
            FILE_CONTENT_UPDATED,
            FILE_WRITING_PENDING,
        ]
        .into_iter()
        .map(|typ| {
            let weak = Arc::downgrade(&inner);
            bus.on(typ, move |env| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(env);
                }
            })
        })
        .collect();
        Self {
            api,
            inner,
            subscriptions,
        }
    }

    pub fn snapshot(&self) -> FilesSnapshot {
        let st = lock(&self.inner.state);
        FilesSnapshot {
            project: st.project.clone(),
            tree: st.tree.clone(),
            open_path: st.open_path.clone(),
            content: st
                .open_path
                .as_ref()
                .and_then(|p| st.buffers.get(p))
                .cloned()
                .unwrap_or_default(),
            displayed: self.inner.renderer.shown(),
            error: st.error.clone(),
        }
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Viewer text as it streams.
    pub fn watch_displayed(&self) -> watch::Receiver<String> {
        self.inner.renderer.watch_shown()
    }

    /// Switch project: drops buffers and the open file, then fetches the new tree.
    pub async fn set_project(&self, project: Option<&str>) -> Result<(), ModelError> {
        let project = project.map(str::trim).filter(|p| !p.is_empty()).map(String::from);
        let generation = self.inner.update(|st| {
            *st = FilesState {
                project: project.clone(),
                generation: st.generation + 1,
                ..FilesState::default()
            };
            st.generation
        });
        self.inner.renderer.show_now(String::new());
        match project {
            Some(project) => self.fetch_tree(&project, generation).await,
            None => Ok(()),
        }
    }

    pub async fn refresh_tree(&self) -> Result<(), ModelError> {
        let (project, generation) = self.current()?;
        self.fetch_tree(&project, generation).await
    }

    /// Fetch a file and show it in full.
    pub async fn open_file(&self, path: &str) -> Result<String, ModelError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ModelError::validation("file path must not be empty"));
        }
        let (project, generation) = self.current()?;
        let content = match self.api.file_content(&project, path).await {
            Ok(content) => content,
            Err(e) => {
                let msg = e.to_string();
                self.inner.update(|st| {
                    if st.generation == generation {
                        st.error = Some(msg);
                    }
                });
                return Err(e.into());
            }
        };
        self.inner.update(|st| {
            if st.generation != generation {
                return;
            }
            st.buffers.insert(path.to_string(), content.clone());
            st.open_path = Some(path.to_string());
            st.error = None;
            self.inner.renderer.show_now(content.clone());
        });
        Ok(content)
    }

    /// Write a file to the workspace, then show the saved text in the viewer.
    pub async fn save_file(&self, path: &str, content: &str) -> Result<(), ModelError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ModelError::validation("file path must not be empty"));
        }
        let (project, generation) = self.current()?;
        if let Err(e) = self.api.write_file(&project, path, content).await {
            log::warn!("saving {} in {} failed: {}", path, project, e);
            let msg = e.to_string();
            self.inner.update(|st| {
                if st.generation == generation {
                    st.error = Some(msg);
                }
            });
            return Err(e.into());
        }
        self.inner.update(|st| {
            if st.generation != generation {
                return;
            }
            st.buffers.insert(path.to_string(), content.to_string());
            st.open_path = Some(path.to_string());
            st.error = None;
            self.inner.renderer.show_now(content.to_string());
        });
        log::info!("saved {} in {}", path, project);
        Ok(())
    }

    fn current(&self) -> Result<(String, u64), ModelError> {
        let st = lock(&self.inner.state);
        st.project
            .clone()
            .map(|p| (p, st.generation))
            .ok_or(ModelError::NoProject)
    }

    async fn fetch_tree(&self, project: &str, generation: u64) -> Result<(), ModelError> {
        match self.api.file_tree(project).await {
            Ok(tree) => {
                self.inner.update(|st| {
                    if st.generation == generation {
                        st.tree = tree;
                        st.error = None;
                    }
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("loading file tree for {} failed: {}", project, e);
                let msg = e.to_string();
                self.inner.update(|st| {
                    if st.generation == generation {
                        st.error = Some(msg);
                    }
                });
                Err(e.into())
            }
        }
    }
}

impl Drop for FilesModel {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, NodeKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeWorkspace {
        writes: std::sync::Mutex<Vec<(String, String, String)>>,
    }

    fn file(path: &str) -> FileNode {
        FileNode {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            kind: NodeKind::File,
            children: None,
        }
    }

    #[async_trait]
    impl WorkspaceApi for FakeWorkspace {
        async fn file_tree(&self, project: &str) -> Result<Vec<FileNode>, ApiError> {
            Ok(vec![file(&format!("{}/main.py", project))])
        }
        async fn file_content(&self, _project: &str, path: &str) -> Result<String, ApiError> {
            if path == "missing.py" {
                return Err(ApiError::Api {
                    status: 404,
                    message: "File not found".into(),
                });
            }
            Ok(format!("# {}\n", path))
        }
        async fn write_file(&self, project: &str, path: &str, content: &str) -> Result<(), ApiError> {
            if path.starts_with("../") {
                return Err(ApiError::Api {
                    status: 400,
                    message: "Path escapes the workspace".into(),
                });
            }
            self.writes
                .lock()
                .unwrap()
                .push((project.into(), path.into(), content.into()));
            Ok(())
        }
    }

    fn console() -> ConsoleConfig {
        ConsoleConfig {
            stream_chunk_size: 4,
            stream_tick_ms: 10,
            skip_boot: true,
        }
    }

    async fn displayed_eventually(model: &FilesModel, expected: &str) {
        let mut shown = model.watch_displayed();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *shown.borrow_and_update() != expected {
                shown.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn set_project_fetches_tree() {
        let model = FilesModel::new(Arc::new(FakeWorkspace::default()), &EventBus::new(), &console());
        assert!(matches!(model.refresh_tree().await, Err(ModelError::NoProject)));
        model.set_project(Some("demo")).await.unwrap();
        let snap = model.snapshot();
        assert_eq!(snap.tree.len(), 1);
        assert_eq!(snap.tree[0].path, "demo/main.py");
    }

    #[tokio::test(start_paused = true)]
    async fn open_file_shows_content_and_reports_errors() {
        let model = FilesModel::new(Arc::new(FakeWorkspace::default()), &EventBus::new(), &console());
        model.set_project(Some("demo")).await.unwrap();
        let content = model.open_file("app.py").await.unwrap();
        assert_eq!(content, "# app.py\n");
        displayed_eventually(&model, "# app.py\n").await;

        let err = model.open_file("missing.py").await.unwrap_err();
        assert!(err.to_string().contains("File not found"));
        let snap = model.snapshot();
        assert_eq!(snap.open_path.as_deref(), Some("app.py"));
        assert!(snap.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_chunks_accumulate_and_drive_viewer() {
        let bus = EventBus::new();
        let model = FilesModel::new(Arc::new(FakeWorkspace::default()), &bus, &console());
        model.set_project(Some("demo")).await.unwrap();

        for chunk in ["def ", "main():\n", "    return 0\n"] {
            bus.emit(&Envelope::new(CODE_STREAM_CHUNK).with_content(
                json!({"filePath": "src/main.py", "chunk": chunk}),
            ));
        }
        let snap = model.snapshot();
        assert_eq!(snap.open_path.as_deref(), Some("src/main.py"));
        assert_eq!(snap.content, "def main():\n    return 0\n");
        displayed_eventually(&model, "def main():\n    return 0\n").await;

        bus.emit(&Envelope::new(FILE_CONTENT_UPDATED).with_content(
            json!({"filePath": "src/main.py", "content": "pass\n"}),
        ));
        assert_eq!(model.snapshot().content, "pass\n");
        displayed_eventually(&model, "pass\n").await;
    }

    #[tokio::test]
    async fn events_without_project_are_ignored() {
        let bus = EventBus::new();
        let model = FilesModel::new(Arc::new(FakeWorkspace::default()), &bus, &console());
        bus.emit(&Envelope::new(FILE_TREE_UPDATED).with_content(json!([
            {"name": "a.py", "path": "a.py", "type": "file"}
        ])));
        bus.emit(&Envelope::new(CODE_STREAM_CHUNK).with_content(
            json!({"filePath": "a.py", "chunk": "x"}),
        ));
        let snap = model.snapshot();
        assert!(snap.tree.is_empty());
        assert!(snap.open_path.is_none());

        model.set_project(Some("demo")).await.unwrap();
        bus.emit(&Envelope::new(FILE_TREE_UPDATED).with_content(json!([
            {"name": "a.py", "path": "a.py", "type": "file"},
            {"name": "src", "path": "src", "type": "directory", "children": []}
        ])));
        assert_eq!(model.snapshot().tree.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn save_file_writes_and_shows_content() {
        let api = Arc::new(FakeWorkspace::default());
        let model = FilesModel::new(api.clone(), &EventBus::new(), &console());
        assert!(matches!(
            model.save_file("a.py", "x").await,
            Err(ModelError::NoProject)
        ));
        model.set_project(Some("demo")).await.unwrap();
        assert!(model.save_file("  ", "x").await.is_err());

        model.save_file("src/app.py", "print(1)\n").await.unwrap();
        assert_eq!(
            api.writes.lock().unwrap().as_slice(),
            &[("demo".to_string(), "src/app.py".to_string(), "print(1)\n".to_string())]
        );
        let snap = model.snapshot();
        assert_eq!(snap.open_path.as_deref(), Some("src/app.py"));
        assert_eq!(snap.content, "print(1)\n");
        displayed_eventually(&model, "print(1)\n").await;

        let err = model.save_file("../etc/passwd", "x").await.unwrap_err();
        assert!(err.to_string().contains("escapes"));
        let snap = model.snapshot();
        assert_eq!(snap.open_path.as_deref(), Some("src/app.py"));
        assert!(snap.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_write_focuses_viewer_and_restarts_buffer() {
        let bus = EventBus::new();
        let model = FilesModel::new(Arc::new(FakeWorkspace::default()), &bus, &console());
        model.set_project(Some("demo")).await.unwrap();
        model.open_file("app.py").await.unwrap();
        displayed_eventually(&model, "# app.py\n").await;

        bus.emit(&Envelope::new(CODE_STREAM_CHUNK).with_content(
            json!({"filePath": "src/util.py", "chunk": "old"}),
        ));
        bus.emit(&Envelope::new(FILE_WRITING_PENDING).with_content(json!({"filePath": "src/util.py"})));
        let snap = model.snapshot();
        assert_eq!(snap.open_path.as_deref(), Some("src/util.py"));
        assert_eq!(snap.content, "");
        displayed_eventually(&model, "").await;

        bus.emit(&Envelope::new(CODE_STREAM_CHUNK).with_content(
            json!({"filePath": "src/util.py", "chunk": "new\n"}),
        ));
        assert_eq!(model.snapshot().content, "new\n");
        displayed_eventually(&model, "new\n").await;
    }
}
