//! Project list and the single active project.

use super::{bump, ModelError};
use crate::api::{Ack, ProjectApi};
use crate::util::lock;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const MAX_PROJECT_NAME_LEN: usize = 50;

/// Lowercase, replace anything outside `[a-z0-9-]` with `-`, cap at 50 characters.
pub fn sanitize_project_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_PROJECT_NAME_LEN)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ProjectsSnapshot {
    pub projects: Vec<String>,
    pub active: Option<String>,
    pub error: Option<String>,
}

pub struct ProjectsModel {
    api: Arc<dyn ProjectApi>,
    projects: Mutex<(Vec<String>, Option<String>)>,
    active: watch::Sender<Option<String>>,
    revision: watch::Sender<u64>,
}

impl ProjectsModel {
    pub fn new(api: Arc<dyn ProjectApi>) -> Self {
        Self {
            api,
            projects: Mutex::new((Vec::new(), None)),
            active: watch::channel(None).0,
            revision: watch::channel(0).0,
        }
    }

    pub fn snapshot(&self) -> ProjectsSnapshot {
        let g = lock(&self.projects);
        ProjectsSnapshot {
            projects: g.0.clone(),
            active: self.active(),
            error: g.1.clone(),
        }
    }

    pub fn active(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    /// Active-project changes, for fanning a selection out to the other view-models.
    pub fn watch_active(&self) -> watch::Receiver<Option<String>> {
        self.active.subscribe()
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn load_projects(&self) -> Result<Vec<String>, ModelError> {
        match self.api.list_projects().await {
            Ok(projects) => {
                *lock(&self.projects) = (projects.clone(), None);
                bump(&self.revision);
                Ok(projects)
            }
            Err(e) => {
                log::warn!("loading projects failed: {}", e);
                lock(&self.projects).1 = Some(e.to_string());
                bump(&self.revision);
                Err(e.into())
            }
        }
    }

    /// Create from user input, re-load, and make it active. Returns the sanitized name.
    pub async fn create_project(&self, raw: &str) -> Result<String, ModelError> {
        if raw.trim().is_empty() {
            return Err(ModelError::validation("project name must not be empty"));
        }
        let name = sanitize_project_name(raw);
        self.api.create_project(&name).await?;
        log::info!("created project {}", name);
        self.load_projects().await?;
        self.select_project(&name).await?;
        Ok(name)
    }

    /// Delete; clears the active project if it was this one.
    pub async fn delete_project(&self, name: &str) -> Result<(), ModelError> {
        self.api.delete_project(name).await?;
        log::info!("deleted project {}", name);
        self.active.send_if_modified(|active| {
            if active.as_deref() == Some(name) {
                *active = None;
                true
            } else {
                false
            }
        });
        self.load_projects().await?;
        Ok(())
    }

    /// Load the project server-side, then make it active.
    pub async fn select_project(&self, name: &str) -> Result<Ack, ModelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::validation("project name must not be empty"));
        }
        let ack = self.api.load_project(name).await?;
        self.active.send_replace(Some(name.to_string()));
        bump(&self.revision);
        Ok(ack)
    }

    pub fn clear_active(&self) {
        self.active.send_replace(None);
        bump(&self.revision);
    }
}
