mod console;
mod render;

use clap::{Parser, Subcommand};
use lib::api::{ApiClient, ApiError, SettingsApi, TaskApi, WorkspaceApi};
use lib::config::{self, Config};
use lib::models::{AuthService, FilesModel, ModelError, ProjectsModel, SettingsModel, TasksModel};
use lib::session::FileTokenStore;
use lib::transport::{EventBus, Transport, WILDCARD};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "aura")]
#[command(about = "Aura command deck", long_about = None)]
struct Cli {
    /// Config file path (default: AURA_CONFIG_PATH or ~/.aura/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init,

    /// Log in and store the session token.
    Login {
        #[arg(long, short)]
        email: Option<String>,

        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account (requires a beta key).
    Register {
        #[arg(long, short)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        beta_key: String,
    },

    /// Forget the stored session.
    Logout,

    /// Show the logged-in user.
    Whoami,

    /// List, create or delete projects.
    Projects {
        #[command(subcommand)]
        action: Option<ProjectsAction>,
    },

    /// Manage a project's task list.
    Tasks {
        #[arg(long, short)]
        project: String,

        #[command(subcommand)]
        action: Option<TasksAction>,
    },

    /// Start a mission for a project.
    Dispatch {
        #[arg(long, short)]
        project: String,
    },

    /// Stop a project's running mission.
    Stop {
        #[arg(long, short)]
        project: String,
    },

    /// Manage provider API keys.
    Keys {
        #[command(subcommand)]
        action: Option<KeysAction>,
    },

    /// Show or change model assignments.
    Models {
        #[command(subcommand)]
        action: Option<ModelsAction>,
    },

    /// Browse a project's workspace.
    Files {
        #[arg(long, short)]
        project: String,

        #[command(subcommand)]
        action: Option<FilesAction>,
    },

    /// Print live command deck events until interrupted.
    Watch,

    /// Interactive console: chat, tasks and code viewer.
    Deck {
        /// Project to load on start.
        #[arg(long, short)]
        project: Option<String>,

        /// Skip the boot sequence.
        #[arg(long)]
        no_boot: bool,
    },
}

#[derive(Subcommand)]
enum ProjectsAction {
    List,
    Create { name: String },
    Delete { name: String },
}

#[derive(Subcommand)]
enum TasksAction {
    List,
    Add { description: Vec<String> },
    Edit { id: i64, description: Vec<String> },
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum KeysAction {
    List,
    Set { provider: String, key: String },
    Rm { provider: String },
}

#[derive(Subcommand)]
enum ModelsAction {
    List,
    Available,
    Assign {
        role: String,
        model: String,
        #[arg(long, short, default_value_t = 0.7)]
        temperature: f64,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    Tree,
    Cat { path: String },
    /// Replace a workspace file; content comes from stdin unless --from is given.
    Write {
        path: String,

        #[arg(long, value_name = "LOCAL_PATH")]
        from: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config_path = cli.config;

    let (name, result) = match cli.command {
        Some(Commands::Version) => {
            println!("aura {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Some(Commands::Init) => ("init", run_init(config_path)),
        Some(Commands::Login { email, password }) => {
            ("login", run_login(config_path, email, password).await)
        }
        Some(Commands::Register {
            email,
            password,
            beta_key,
        }) => (
            "register",
            run_register(config_path, email, password, beta_key).await,
        ),
        Some(Commands::Logout) => ("logout", run_logout(config_path)),
        Some(Commands::Whoami) => ("whoami", run_whoami(config_path).await),
        Some(Commands::Projects { action }) => ("projects", run_projects(config_path, action).await),
        Some(Commands::Tasks { project, action }) => {
            ("tasks", run_tasks(config_path, project, action).await)
        }
        Some(Commands::Dispatch { project }) => ("dispatch", run_dispatch(config_path, project).await),
        Some(Commands::Stop { project }) => ("stop", run_stop(config_path, project).await),
        Some(Commands::Keys { action }) => ("keys", run_keys(config_path, action).await),
        Some(Commands::Models { action }) => ("models", run_models(config_path, action).await),
        Some(Commands::Files { project, action }) => {
            ("files", run_files(config_path, project, action).await)
        }
        Some(Commands::Watch) => ("watch", run_watch(config_path).await),
        Some(Commands::Deck { project, no_boot }) => {
            ("deck", run_deck(config_path, project, no_boot).await)
        }
        None => {
            println!("Run with --help for usage");
            return;
        }
    };

    if let Err(e) = result {
        log::error!("{} failed: {}", name, e);
        if is_unauthorized(&e) {
            eprintln!("session expired or missing; run `aura login`");
        } else {
            eprintln!("error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn is_unauthorized(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .map(ApiError::is_unauthorized)
            .or_else(|| match cause.downcast_ref::<ModelError>() {
                Some(ModelError::Api(api)) => Some(api.is_unauthorized()),
                _ => None,
            })
            .unwrap_or(false)
    })
}

/// Loaded config plus the session store and a client built from them.
struct Ctx {
    config: Config,
    tokens: Arc<FileTokenStore>,
    api: Arc<ApiClient>,
}

fn load(config_path: Option<PathBuf>) -> anyhow::Result<Ctx> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let tokens = Arc::new(FileTokenStore::new(config::default_session_path()));
    let api = Arc::new(ApiClient::from_config(&config, tokens.clone()));
    Ok(Ctx {
        config,
        tokens,
        api,
    })
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn prompt_line(label: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_login(
    config_path: Option<PathBuf>,
    email: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let email = match email {
        Some(e) => e,
        None => prompt_line("email: ").await?,
    };
    let password = match password {
        Some(p) => p,
        None => prompt_line("password: ").await?,
    };
    let auth = AuthService::new(ctx.api.clone(), ctx.tokens.clone());
    let user = auth.login(&email, &password).await?;
    println!("logged in as {} (session at {})", user.email, ctx.tokens.path().display());
    Ok(())
}

async fn run_register(
    config_path: Option<PathBuf>,
    email: String,
    password: String,
    beta_key: String,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let auth = AuthService::new(ctx.api.clone(), ctx.tokens.clone());
    let user = auth.register(&email, &password, &password, &beta_key).await?;
    println!("registered {}; run `aura login` to start", user.email);
    Ok(())
}

fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    AuthService::new(ctx.api.clone(), ctx.tokens.clone()).logout();
    println!("logged out");
    Ok(())
}

async fn run_whoami(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let user = AuthService::new(ctx.api.clone(), ctx.tokens.clone())
        .current_user()
        .await?;
    println!("{} (id {}) @ {}", user.email, user.id, ctx.api.base_url());
    Ok(())
}

async fn run_projects(
    config_path: Option<PathBuf>,
    action: Option<ProjectsAction>,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let projects = ProjectsModel::new(ctx.api.clone());
    match action.unwrap_or(ProjectsAction::List) {
        ProjectsAction::List => {
            for name in projects.load_projects().await? {
                println!("{}", name);
            }
        }
        ProjectsAction::Create { name } => {
            let name = projects.create_project(&name).await?;
            println!("created {}", name);
        }
        ProjectsAction::Delete { name } => {
            projects.delete_project(&name).await?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}

async fn run_tasks(
    config_path: Option<PathBuf>,
    project: String,
    action: Option<TasksAction>,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    match action.unwrap_or(TasksAction::List) {
        TasksAction::List => {
            let tasks = ctx.api.list_tasks(&project).await?;
            if tasks.is_empty() {
                println!("(no tasks)");
            }
            for (i, task) in tasks.iter().enumerate() {
                println!("{}", render::task_line(i, task, false));
            }
        }
        TasksAction::Add { description } => {
            let description = non_blank(description.join(" "), "task description")?;
            ctx.api.add_task(&project, &description).await?;
            println!("added");
        }
        TasksAction::Edit { id, description } => {
            let description = non_blank(description.join(" "), "task description")?;
            ctx.api.update_task(&project, id, &description).await?;
            println!("updated #{}", id);
        }
        TasksAction::Rm { id } => {
            ctx.api.delete_task(&project, id).await?;
            println!("deleted #{}", id);
        }
    }
    Ok(())
}

fn non_blank(value: String, what: &str) -> anyhow::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        anyhow::bail!("{} must not be empty", what);
    }
    Ok(trimmed.to_string())
}

async fn run_dispatch(config_path: Option<PathBuf>, project: String) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let tasks = TasksModel::new(ctx.api.clone(), &EventBus::new());
    tasks.set_project(Some(&project));
    tasks.wait_ready().await;
    if let Some(err) = tasks.snapshot().error {
        anyhow::bail!("loading {} failed: {}", project, err);
    }
    let ack = tasks.dispatch_mission().await?;
    println!("{}", if ack.message.is_empty() { "dispatched" } else { ack.message.as_str() });
    Ok(())
}

async fn run_stop(config_path: Option<PathBuf>, project: String) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let ack = ctx.api.stop_mission(&project).await?;
    println!("{}", if ack.message.is_empty() { "stop requested" } else { ack.message.as_str() });
    Ok(())
}

async fn run_keys(config_path: Option<PathBuf>, action: Option<KeysAction>) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let settings = SettingsModel::new(ctx.api.clone());
    match action.unwrap_or(KeysAction::List) {
        KeysAction::List => {}
        KeysAction::Set { provider, key } => {
            settings.save_key(&provider, &key).await?;
        }
        KeysAction::Rm { provider } => settings.delete_key(&provider).await?,
    }
    let keys = settings.load_keys().await?;
    if keys.is_empty() {
        println!("(no keys configured)");
    }
    for key in &keys {
        println!("{}", render::key_line(key));
    }
    Ok(())
}

async fn run_models(
    config_path: Option<PathBuf>,
    action: Option<ModelsAction>,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let settings = SettingsModel::new(ctx.api.clone());
    match action.unwrap_or(ModelsAction::List) {
        ModelsAction::List => {}
        ModelsAction::Available => {
            for line in render::available_lines(&ctx.api.available_models().await?) {
                println!("{}", line);
            }
            return Ok(());
        }
        ModelsAction::Assign {
            role,
            model,
            temperature,
        } => {
            settings.load_assignments().await?;
            settings.assign(&role, &model, temperature).await?;
        }
    }
    for a in settings.load_assignments().await? {
        println!("{}", render::assignment_line(&a));
    }
    Ok(())
}

async fn run_files(
    config_path: Option<PathBuf>,
    project: String,
    action: Option<FilesAction>,
) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    match action.unwrap_or(FilesAction::Tree) {
        FilesAction::Tree => {
            for line in render::tree_lines(&ctx.api.file_tree(&project).await?) {
                println!("{}", line);
            }
        }
        FilesAction::Cat { path } => {
            print!("{}", ctx.api.file_content(&project, &path).await?);
        }
        FilesAction::Write { path, from } => {
            let content = match from {
                Some(local) => tokio::fs::read_to_string(&local).await?,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin().read_to_string(&mut buf).await?;
                    buf
                }
            };
            let files = FilesModel::new(ctx.api.clone(), &EventBus::new(), &ctx.config.console);
            files.set_project(Some(&project)).await?;
            files.save_file(&path, &content).await?;
            println!("wrote {} ({} bytes)", path, content.len());
        }
    }
    Ok(())
}

async fn run_watch(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = load(config_path)?;
    let bus = EventBus::new();
    let _all = bus.on(WILDCARD, |env| println!("{}", render::event_line(env)));
    let transport = Transport::from_config(&ctx.config, ctx.tokens.clone(), bus);
    transport.connect().await?;
    eprintln!("watching {} (ctrl-c to stop)", config::resolve_ws_url(&ctx.config));

    let mut status = transport.watch_status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                eprintln!("[socket {}]", render::connection_label(current));
                if current == lib::transport::ConnectionStatus::Exhausted {
                    anyhow::bail!("lost connection to the command deck");
                }
            }
        }
    }
    transport.disconnect();
    Ok(())
}

async fn run_deck(
    config_path: Option<PathBuf>,
    project: Option<String>,
    no_boot: bool,
) -> anyhow::Result<()> {
    let mut ctx = load(config_path)?;
    if no_boot {
        ctx.config.console.skip_boot = true;
    }
    let deck = lib::deck::Deck::new(ctx.config, ctx.tokens);
    console::run(deck, project).await
}
