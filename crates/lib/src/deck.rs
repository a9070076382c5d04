//! One command deck session: REST client, socket, bus and every view-model, wired together.

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::{
    AuthService, BootScript, ChatModel, ChatPhase, FilesModel, ModelError, ProjectsModel,
    SettingsModel, TasksModel,
};
use crate::session::TokenStore;
use crate::transport::{EventBus, Transport, TransportError};
use std::sync::Arc;

pub struct Deck {
    pub config: Config,
    pub api: Arc<ApiClient>,
    pub bus: EventBus,
    pub transport: Transport,
    pub auth: AuthService,
    pub projects: ProjectsModel,
    pub chat: ChatModel,
    pub tasks: TasksModel,
    pub files: FilesModel,
    pub settings: SettingsModel,
}

impl Deck {
    /// Build the deck. Must be called inside a tokio runtime (boot sequence and the
    /// streaming renderer spawn tasks).
    pub fn new(config: Config, tokens: Arc<dyn TokenStore>) -> Self {
        let script = if config.console.skip_boot {
            BootScript::empty()
        } else {
            BootScript::standard()
        };
        Self::with_script(config, tokens, script)
    }

    pub fn with_script(config: Config, tokens: Arc<dyn TokenStore>, script: BootScript) -> Self {
        let api = Arc::new(ApiClient::from_config(&config, tokens.clone()));
        let bus = EventBus::new();
        let transport = Transport::from_config(&config, tokens.clone(), bus.clone());
        Self {
            auth: AuthService::new(api.clone(), tokens),
            projects: ProjectsModel::new(api.clone()),
            chat: ChatModel::new(api.clone(), bus.clone(), script),
            tasks: TasksModel::new(api.clone(), &bus),
            files: FilesModel::new(api.clone(), &bus, &config.console),
            settings: SettingsModel::new(api.clone()),
            config,
            api,
            bus,
            transport,
        }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    /// Load `name` on the backend and scope chat, tasks and files to it.
    pub async fn select_project(&self, name: &str) -> Result<(), ModelError> {
        if self.chat.phase() == ChatPhase::Booting {
            return Err(ModelError::NotReady);
        }
        self.projects.select_project(name).await?;
        self.fan_out(name.trim()).await
    }

    /// Create from raw input, then select it. Returns the sanitized name.
    pub async fn create_project(&self, raw: &str) -> Result<String, ModelError> {
        if self.chat.phase() == ChatPhase::Booting {
            return Err(ModelError::NotReady);
        }
        let name = self.projects.create_project(raw).await?;
        self.fan_out(&name).await?;
        Ok(name)
    }

    async fn fan_out(&self, name: &str) -> Result<(), ModelError> {
        self.chat.select_project(name);
        self.tasks.set_project(Some(name));
        if let Err(e) = self.files.set_project(Some(name)).await {
            log::warn!("file tree for {} unavailable: {}", name, e);
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.transport.disconnect();
    }
}
