//! Interactive command deck: chat transcript, task list and code viewer in one terminal.

use crate::render;
use lib::api::TaskId;
use lib::deck::Deck;
use lib::models::{ChatPhase, MissionState};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  /projects              list projects
  /new <name>            create and load a project
  /load <name>           load an existing project
  /tasks                 show the task list
  /add <description>     add a task
  /edit <id> <text>      change a task's description
  /rm <id>               delete a task
  /dispatch              start a mission
  /stop                  stop the running mission
  /files                 show the workspace tree
  /open <path>           open a file in the viewer
  /code                  print the viewer contents
  /status                connection and mission state
  /quit                  leave the deck
anything else is sent to Aura as a prompt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Projects,
    New(String),
    Load(String),
    Tasks,
    Add(String),
    Edit(TaskId, String),
    Remove(TaskId),
    Dispatch,
    Stop,
    Files,
    Open(String),
    Code,
    Status,
    Quit,
    Prompt(String),
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ConsoleCommand::Prompt(line.to_string());
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (rest, ""),
    };
    let need = |what: &str, build: fn(String) -> ConsoleCommand| {
        if arg.is_empty() {
            ConsoleCommand::Invalid(format!("/{} needs {}", cmd, what))
        } else {
            build(arg.to_string())
        }
    };
    let id = |s: &str| s.parse::<TaskId>().ok();
    match cmd.to_ascii_lowercase().as_str() {
        "help" | "?" => ConsoleCommand::Help,
        "projects" => ConsoleCommand::Projects,
        "new" => need("a project name", ConsoleCommand::New),
        "load" => need("a project name", ConsoleCommand::Load),
        "tasks" => ConsoleCommand::Tasks,
        "add" => need("a description", ConsoleCommand::Add),
        "edit" => {
            let parsed = arg
                .split_once(char::is_whitespace)
                .and_then(|(n, text)| Some((id(n)?, text.trim())));
            match parsed {
                Some((n, text)) if !text.is_empty() => ConsoleCommand::Edit(n, text.to_string()),
                _ => ConsoleCommand::Invalid("usage: /edit <id> <text>".to_string()),
            }
        }
        "rm" => match id(arg) {
            Some(n) => ConsoleCommand::Remove(n),
            None => ConsoleCommand::Invalid("usage: /rm <id>".to_string()),
        },
        "dispatch" => ConsoleCommand::Dispatch,
        "stop" => ConsoleCommand::Stop,
        "files" => ConsoleCommand::Files,
        "open" => need("a file path", ConsoleCommand::Open),
        "code" => ConsoleCommand::Code,
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Invalid(format!("unknown command /{} (try /help)", other)),
    }
}

pub async fn run(deck: Deck, project: Option<String>) -> anyhow::Result<()> {
    let deck = Arc::new(deck);
    if let Err(e) = deck.connect().await {
        log::warn!("live updates unavailable: {}", e);
        eprintln!("! live updates unavailable: {}", e);
    }

    let printers = [
        tokio::spawn(print_chat(deck.clone())),
        tokio::spawn(print_mission(deck.clone())),
        tokio::spawn(print_connection(deck.clone())),
    ];

    wait_for_boot(&deck).await;
    if let Some(project) = project {
        if let Err(e) = deck.select_project(&project).await {
            eprintln!("! could not load {}: {}", project, e);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle(&deck, parse_command(&line)).await {
                    break;
                }
            }
        }
    }

    deck.shutdown();
    for p in printers {
        p.abort();
    }
    Ok(())
}

async fn wait_for_boot(deck: &Deck) {
    let mut rev = deck.chat.watch_revision();
    while deck.chat.phase() == ChatPhase::Booting {
        if rev.changed().await.is_err() {
            return;
        }
    }
}

/// Returns `false` when the user asked to leave.
async fn handle(deck: &Deck, cmd: ConsoleCommand) -> bool {
    if cmd == ConsoleCommand::Quit {
        return false;
    }
    if let Err(e) = execute(deck, cmd).await {
        println!("! {}", e);
    }
    true
}

async fn execute(deck: &Deck, cmd: ConsoleCommand) -> anyhow::Result<()> {
    match cmd {
        ConsoleCommand::Empty | ConsoleCommand::Quit => {}
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Invalid(msg) => println!("! {}", msg),
        ConsoleCommand::Prompt(text) => {
            if !deck.chat.send_message(&text).await {
                let snap = deck.chat.snapshot();
                if snap.project.is_none() {
                    println!("! load a project first (/projects, /new, /load)");
                } else if snap.processing {
                    println!("! Aura is still answering the previous prompt");
                }
            }
        }
        ConsoleCommand::Projects => {
            let active = deck.projects.active();
            for name in deck.projects.load_projects().await? {
                let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        ConsoleCommand::New(raw) => {
            let name = deck.create_project(&raw).await?;
            println!("created {}", name);
        }
        ConsoleCommand::Load(name) => deck.select_project(&name).await?,
        ConsoleCommand::Tasks => println!("{}", render::tasks_block(&deck.tasks.snapshot())),
        ConsoleCommand::Add(text) => deck.tasks.add_task(&text).await?,
        ConsoleCommand::Edit(id, text) => deck.tasks.update_task(id, &text).await?,
        ConsoleCommand::Remove(id) => deck.tasks.delete_task(id).await?,
        ConsoleCommand::Dispatch => {
            let ack = deck.tasks.dispatch_mission().await?;
            if !ack.message.is_empty() {
                println!("{}", ack.message);
            }
        }
        ConsoleCommand::Stop => {
            let ack = deck.tasks.stop_mission().await?;
            if !ack.message.is_empty() {
                println!("{}", ack.message);
            }
        }
        ConsoleCommand::Files => {
            deck.files.refresh_tree().await?;
            for line in render::tree_lines(&deck.files.snapshot().tree) {
                println!("{}", line);
            }
        }
        ConsoleCommand::Open(path) => {
            deck.files.open_file(&path).await?;
            println!("opened {} (/code to view)", path);
        }
        ConsoleCommand::Code => {
            let snap = deck.files.snapshot();
            match snap.open_path {
                Some(path) => {
                    println!("--- {} ---", path);
                    println!("{}", snap.displayed);
                    if snap.displayed.len() < snap.content.len() {
                        println!("(streaming...)");
                    }
                }
                None => println!("(no file open)"),
            }
        }
        ConsoleCommand::Status => {
            let tasks = deck.tasks.snapshot();
            println!(
                "socket: {}\nproject: {}\nmission: {}\ntasks: {}",
                render::connection_label(deck.transport.status()),
                tasks.project.as_deref().unwrap_or("(none)"),
                render::mission_label(tasks.mission),
                tasks.tasks.len()
            );
        }
    }
    Ok(())
}

async fn print_chat(deck: Arc<Deck>) {
    let mut rev = deck.chat.watch_revision();
    let mut last_id = 0;
    loop {
        let since = last_id;
        for m in deck.chat.snapshot().messages.iter().filter(|m| m.id > since) {
            println!("{}", render::message_line(m));
            last_id = m.id;
        }
        if rev.changed().await.is_err() {
            return;
        }
    }
}

async fn print_mission(deck: Arc<Deck>) {
    let mut rev = deck.tasks.watch_revision();
    let mut last = MissionState::Idle;
    loop {
        let mission = deck.tasks.snapshot().mission;
        if mission != last {
            println!("[mission {}]", render::mission_label(mission));
            last = mission;
        }
        if rev.changed().await.is_err() {
            return;
        }
    }
}

async fn print_connection(deck: Arc<Deck>) {
    let mut status = deck.transport.watch_status();
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        println!("[socket {}]", render::connection_label(current));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            parse_command("  build a todo app "),
            ConsoleCommand::Prompt("build a todo app".into())
        );
        assert_eq!(parse_command("   "), ConsoleCommand::Empty);
    }

    #[test]
    fn slash_commands_parse_arguments() {
        assert_eq!(parse_command("/new My Site!"), ConsoleCommand::New("My Site!".into()));
        assert_eq!(parse_command("/edit 4 write tests"), ConsoleCommand::Edit(4, "write tests".into()));
        assert_eq!(parse_command("/rm 12"), ConsoleCommand::Remove(12));
        assert_eq!(parse_command("/QUIT"), ConsoleCommand::Quit);
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert!(matches!(parse_command("/load"), ConsoleCommand::Invalid(_)));
        assert!(matches!(parse_command("/rm x"), ConsoleCommand::Invalid(_)));
        assert!(matches!(parse_command("/edit 3"), ConsoleCommand::Invalid(_)));
        assert!(matches!(parse_command("/frobnicate"), ConsoleCommand::Invalid(_)));
    }
}
