//! Task list and mission state for the active project.
//!
//! Changing project spawns one worker per project generation. The worker first asks the
//! backend whether a mission is running. Frames queued before that answer are stale and
//! dropped (`agent_status` included); the task list is loaded after the check, so it covers
//! the rest. Frames arriving after the check stay queued and are applied, one at a time in
//! arrival order, once the initial load has landed and the readiness gate is open.

use super::{bump, ModelError};
use crate::api::{Ack, ApiError, MissionStatus, Task, TaskApi, TaskId};
use crate::transport::protocol::{
    ACTIVE_TASK_UPDATED, AGENT_STATUS, MISSION_COMPLETED, MISSION_FAILURE, MISSION_LOG_UPDATED,
    MISSION_SUCCESS, TASKS_UPDATED,
};
use crate::transport::{AgentStatus, Envelope, EventBus, ServerEvent, Subscription};
use crate::util::lock;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    Idle,
    /// Dispatch was sent; waiting for the agent to report in.
    Optimistic,
    Running,
}

#[derive(Debug, Clone)]
pub struct TasksSnapshot {
    pub project: Option<String>,
    pub tasks: Vec<Task>,
    pub mission: MissionState,
    pub ready: bool,
    pub active_task: Option<TaskId>,
    pub error: Option<String>,
}

struct TasksState {
    project: Option<String>,
    tasks: Vec<Task>,
    mission: MissionState,
    ready: bool,
    active_task: Option<TaskId>,
    error: Option<String>,
    generation: u64,
    events: Option<mpsc::UnboundedSender<Envelope>>,
}

struct TasksInner {
    api: Arc<dyn TaskApi>,
    state: Mutex<TasksState>,
    revision: watch::Sender<u64>,
}

impl TasksInner {
    fn update<R>(&self, f: impl FnOnce(&mut TasksState) -> R) -> R {
        let out = f(&mut lock(&self.state));
        bump(&self.revision);
        out
    }

    /// Apply `f` only if `generation` is still current.
    fn update_if_current(&self, generation: u64, f: impl FnOnce(&mut TasksState)) -> bool {
        self.update(|st| {
            if st.generation == generation {
                f(st);
                true
            } else {
                false
            }
        })
    }

    fn current(&self) -> Result<(String, u64), ModelError> {
        let st = lock(&self.state);
        st.project
            .clone()
            .map(|p| (p, st.generation))
            .ok_or(ModelError::NoProject)
    }

    fn enqueue(&self, env: &Envelope) {
        if let Some(tx) = lock(&self.state).events.as_ref() {
            let _ = tx.send(env.clone());
        }
    }

    async fn reload(&self, project: &str, generation: u64) -> Result<(), ApiError> {
        let result = self.api.list_tasks(project).await;
        match result {
            Ok(tasks) => {
                if !self.update_if_current(generation, |st| {
                    st.tasks = tasks;
                    st.error = None;
                }) {
                    log::debug!("discarding task list for superseded project {}", project);
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("loading tasks for {} failed: {}", project, e);
                let msg = e.to_string();
                self.update_if_current(generation, |st| st.error = Some(msg));
                Err(e)
            }
        }
    }

    async fn handle_event(&self, project: &str, generation: u64, env: &Envelope) {
        let settle = |st: &mut TasksState| {
            st.mission = MissionState::Idle;
            st.active_task = None;
        };
        match ServerEvent::from_envelope(env) {
            ServerEvent::AgentStatus(status) if status.is_busy() => {
                self.update_if_current(generation, |st| st.mission = MissionState::Running);
            }
            ServerEvent::AgentStatus(AgentStatus::Idle) => {
                self.update_if_current(generation, settle);
                let _ = self.reload(project, generation).await;
            }
            ServerEvent::TasksUpdated => {
                let _ = self.reload(project, generation).await;
            }
            ServerEvent::MissionLogUpdated(tasks) => {
                self.update_if_current(generation, |st| st.tasks = tasks);
            }
            ServerEvent::ActiveTaskUpdated(id) => {
                self.update_if_current(generation, |st| st.active_task = id);
            }
            ServerEvent::MissionCompleted
            | ServerEvent::MissionSuccess
            | ServerEvent::MissionFailure(_) => {
                self.update_if_current(generation, settle);
                let _ = self.reload(project, generation).await;
            }
            _ => {}
        }
    }
}

async fn run_project(
    inner: Weak<TasksInner>,
    project: String,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<Envelope>,
) {
    let Some(api) = inner.upgrade().map(|i| i.api.clone()) else {
        return;
    };
    let status = api.mission_status(&project).await;

    // Frames queued before the check answered are superseded by it.
    let mut stale = 0usize;
    while let Ok(env) = events.try_recv() {
        if env.typ == AGENT_STATUS {
            log::debug!("ignoring pre-check agent_status for {}", project);
        }
        stale += 1;
    }
    if stale > 0 {
        log::debug!("{} pre-check event(s) for {} folded into initial load", stale, project);
    }

    let Some(this) = inner.upgrade() else {
        return;
    };
    let applied = this.update_if_current(generation, |st| match status {
        Ok(MissionStatus { is_running }) => {
            st.mission = if is_running {
                MissionState::Running
            } else {
                MissionState::Idle
            };
        }
        Err(e) => {
            log::warn!("mission status check for {} failed: {}", project, e);
            st.error = Some(e.to_string());
        }
    });
    if !applied {
        log::debug!("status check for superseded project {} discarded", project);
        return;
    }
    drop(this);

    // Anything arriving from here on stays queued and is applied after the load.
    let tasks = api.list_tasks(&project).await;
    let Some(this) = inner.upgrade() else {
        return;
    };
    let applied = this.update_if_current(generation, |st| {
        match tasks {
            Ok(tasks) => st.tasks = tasks,
            Err(e) => {
                log::warn!("initial task load for {} failed: {}", project, e);
                st.error = Some(e.to_string());
            }
        }
        st.ready = true;
    });
    if !applied {
        log::debug!("initial load for superseded project {} discarded", project);
        return;
    }
    log::info!("tasks for {} ready", project);
    drop(this);

    while let Some(env) = events.recv().await {
        let Some(this) = inner.upgrade() else {
            return;
        };
        this.handle_event(&project, generation, &env).await;
    }
}

pub struct TasksModel {
    inner: Arc<TasksInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Vec<Subscription>,
}

impl TasksModel {
    pub fn new(api: Arc<dyn TaskApi>, bus: &EventBus) -> Self {
        let (revision, _) = watch::channel(0);
        let inner = Arc::new(TasksInner {
            api,
            state: Mutex::new(TasksState {
                project: None,
                tasks: Vec::new(),
                mission: MissionState::Idle,
                ready: false,
                active_task: None,
                error: None,
                generation: 0,
                events: None,
            }),
            revision,
        });
        let subscriptions = [
            AGENT_STATUS,
            TASKS_UPDATED,
            MISSION_LOG_UPDATED,
            ACTIVE_TASK_UPDATED,
            MISSION_COMPLETED,
            MISSION_SUCCESS,
            MISSION_FAILURE,
        ]
        .into_iter()
        .map(|typ| {
            let weak = Arc::downgrade(&inner);
            bus.on(typ, move |env| {
                if let Some(inner) = weak.upgrade() {
                    inner.enqueue(env);
                }
            })
        })
        .collect();
        Self {
            inner,
            worker: Mutex::new(None),
            subscriptions,
        }
    }

    pub fn snapshot(&self) -> TasksSnapshot {
        let st = lock(&self.inner.state);
        TasksSnapshot {
            project: st.project.clone(),
            tasks: st.tasks.clone(),
            mission: st.mission,
            ready: st.ready,
            active_task: st.active_task,
            error: st.error.clone(),
        }
    }

    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Switch to `project` (or none). Closes the readiness gate and starts the initial load.
    /// Must be called inside a tokio runtime when `project` is `Some`.
    pub fn set_project(&self, project: Option<&str>) {
        if let Some(old) = lock(&self.worker).take() {
            old.abort();
        }
        let project = project.map(str::trim).filter(|p| !p.is_empty()).map(String::from);
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.inner.update(|st| {
            st.generation += 1;
            st.project = project.clone();
            st.tasks.clear();
            st.mission = MissionState::Idle;
            st.ready = false;
            st.active_task = None;
            st.error = None;
            st.events = project.as_ref().map(|_| tx);
            st.generation
        });
        if let Some(project) = project {
            let worker = tokio::spawn(run_project(
                Arc::downgrade(&self.inner),
                project,
                generation,
                rx,
            ));
            *lock(&self.worker) = Some(worker);
        }
    }

    /// Resolve once the readiness gate for the current project is open.
    pub async fn wait_ready(&self) {
        let mut rev = self.watch_revision();
        loop {
            {
                let st = lock(&self.inner.state);
                if st.ready || st.project.is_none() {
                    return;
                }
            }
            if rev.changed().await.is_err() {
                return;
            }
        }
    }

    /// Replace the list with the server's.
    pub async fn load_tasks(&self) -> Result<(), ModelError> {
        let (project, generation) = self.inner.current()?;
        self.inner.reload(&project, generation).await?;
        Ok(())
    }

    pub async fn add_task(&self, description: &str) -> Result<(), ModelError> {
        let description = non_blank(description)?;
        let (project, _) = self.inner.current()?;
        self.inner.api.add_task(&project, description).await?;
        Ok(())
    }

    pub async fn update_task(&self, id: TaskId, description: &str) -> Result<(), ModelError> {
        let description = non_blank(description)?;
        let (project, _) = self.inner.current()?;
        self.inner.api.update_task(&project, id, description).await?;
        Ok(())
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), ModelError> {
        let (project, _) = self.inner.current()?;
        self.inner.api.delete_task(&project, id).await?;
        Ok(())
    }

    pub async fn reorder_tasks(&self, ordered: &[TaskId]) -> Result<(), ModelError> {
        let (project, _) = self.inner.current()?;
        self.inner.api.reorder_tasks(&project, ordered).await?;
        Ok(())
    }

    /// Start a mission for the active project.
    pub async fn dispatch_mission(&self) -> Result<Ack, ModelError> {
        let (project, generation) = self.inner.update(|st| {
            let project = st.project.clone().ok_or(ModelError::NoProject)?;
            if !st.ready {
                return Err(ModelError::NotReady);
            }
            if st.mission != MissionState::Idle {
                return Err(ModelError::AlreadyRunning);
            }
            if st.tasks.is_empty() {
                return Err(ModelError::NoTasks);
            }
            st.mission = MissionState::Optimistic;
            Ok((project, st.generation))
        })?;
        log::info!("dispatching mission for {}", project);
        match self.inner.api.dispatch_mission(&project).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                log::warn!("dispatch for {} failed: {}", project, e);
                self.inner.update_if_current(generation, |st| {
                    if st.mission == MissionState::Optimistic {
                        st.mission = MissionState::Idle;
                    }
                });
                Err(e.into())
            }
        }
    }

    /// Ask the agent to stop. Mission state follows the resulting status events.
    pub async fn stop_mission(&self) -> Result<Ack, ModelError> {
        let (project, _) = self.inner.current()?;
        Ok(self.inner.api.stop_mission(&project).await?)
    }
}

impl Drop for TasksModel {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

fn non_blank(description: &str) -> Result<&str, ModelError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        Err(ModelError::validation("task description must not be empty"))
    } else {
        Ok(trimmed)
    }
}
