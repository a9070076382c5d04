//! View-models: local state mirrors of server data, driven by REST calls and bus events.
//!
//! Each model exposes a cloneable snapshot plus a `watch` revision counter that renderers
//! await on. State lives behind a `std::sync::Mutex` that is never held across an await.

pub mod auth;
pub mod chat;
pub mod files;
pub mod projects;
pub mod settings;
pub mod tasks;

pub use auth::{validate_registration, AuthService};
pub use chat::{BootLine, BootScript, ChatModel, ChatPhase, ChatSnapshot, DisplayMessage, MessageKind};
pub use files::{FilesModel, FilesSnapshot};
pub use projects::{sanitize_project_name, ProjectsModel, ProjectsSnapshot, MAX_PROJECT_NAME_LEN};
pub use settings::{SettingsModel, SettingsSnapshot};
pub use tasks::{MissionState, TasksModel, TasksSnapshot};

use crate::api::ApiError;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Validation(String),
    #[error("no active project")]
    NoProject,
    #[error("a mission is already running")]
    AlreadyRunning,
    #[error("no tasks to dispatch")]
    NoTasks,
    #[error("project state is still loading")]
    NotReady,
    #[error("session could not be stored: {0}")]
    Session(String),
}

impl ModelError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ModelError::Validation(msg.into())
    }
}

/// Bump a revision counter; works with or without live receivers.
pub(crate) fn bump(revision: &watch::Sender<u64>) {
    revision.send_modify(|r| *r = r.wrapping_add(1));
}
