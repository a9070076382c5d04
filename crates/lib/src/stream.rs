//! Typewriter-style reveal of streamed code.
//!
//! The renderer chases a target string `chunk` characters per tick and goes quiet once it has
//! caught up. A target that shrinks to or below what is already shown snaps to it; a target
//! that no longer extends the shown text restarts from their common prefix.

use crate::config::ConsoleConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The frame shown after one tick, given what is `shown` now.
pub fn next_frame(shown: &str, target: &str, chunk: usize) -> String {
    let chunk = chunk.max(1);
    let shown_len = shown.chars().count();
    let target_len = target.chars().count();
    if target_len <= shown_len {
        return target.to_string();
    }
    let common = shown
        .chars()
        .zip(target.chars())
        .take_while(|(a, b)| a == b)
        .count();
    target.chars().take(common + chunk).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Target {
    text: String,
    instant: bool,
}

pub struct StreamingRenderer {
    target: watch::Sender<Target>,
    shown: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl StreamingRenderer {
    /// Spawn the ticker. Must be called inside a tokio runtime.
    pub fn new(chunk: usize, tick: Duration) -> Self {
        let (target_tx, target_rx) = watch::channel(Target::default());
        let (shown_tx, shown_rx) = watch::channel(String::new());
        let task = tokio::spawn(run(target_rx, shown_tx, chunk.max(1), tick));
        Self {
            target: target_tx,
            shown: shown_rx,
            task,
        }
    }

    pub fn from_config(console: &ConsoleConfig) -> Self {
        Self::new(console.stream_chunk_size, console.stream_tick())
    }

    /// Stream towards `target`.
    pub fn set_target(&self, target: impl Into<String>) {
        self.replace(Target {
            text: target.into(),
            instant: false,
        });
    }

    /// Show `text` in full on the next wake-up, without streaming.
    pub fn show_now(&self, text: impl Into<String>) {
        self.replace(Target {
            text: text.into(),
            instant: true,
        });
    }

    fn replace(&self, next: Target) {
        self.target.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn target(&self) -> String {
        self.target.borrow().text.clone()
    }

    pub fn shown(&self) -> String {
        self.shown.borrow().clone()
    }

    pub fn watch_shown(&self) -> watch::Receiver<String> {
        self.shown.clone()
    }

    pub fn is_caught_up(&self) -> bool {
        *self.shown.borrow() == self.target.borrow().text
    }
}

impl Drop for StreamingRenderer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut target: watch::Receiver<Target>,
    shown_tx: watch::Sender<String>,
    chunk: usize,
    tick: Duration,
) {
    let mut shown = String::new();
    let mut pending: Option<Instant> = None;
    loop {
        let current = target.borrow_and_update().clone();
        if current.instant || current.text.chars().count() <= shown.chars().count() {
            pending = None;
            if shown != current.text {
                shown = current.text;
                shown_tx.send_replace(shown.clone());
            }
            if target.changed().await.is_err() {
                return;
            }
            continue;
        }

        let deadline = *pending.get_or_insert_with(|| Instant::now() + tick);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                pending = None;
                let latest = target.borrow().clone();
                shown = if latest.instant {
                    latest.text
                } else {
                    next_frame(&shown, &latest.text, chunk)
                };
                shown_tx.send_replace(shown.clone());
            }
            changed = target.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
