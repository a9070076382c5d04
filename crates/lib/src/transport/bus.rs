//! In-process publish/subscribe keyed by frame type.
//!
//! Handlers for one type run in registration order. Dispatch works on a snapshot of the
//! handler list, so subscribing or unsubscribing from inside a handler is safe and only
//! takes effect for the next frame. A panicking handler is logged and skipped.

use super::protocol::{Envelope, WILDCARD};
use crate::util::lock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Identifies one registration; returned inside [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, typ: &str, id: Option<HandlerId>) -> usize {
        let mut map = lock(&self.handlers);
        let removed = match id {
            None => map.remove(typ).map(|v| v.len()).unwrap_or(0),
            Some(id) => match map.get_mut(typ) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|(h, _)| *h != id);
                    before - list.len()
                }
                None => 0,
            },
        };
        if map.get(typ).is_some_and(|l| l.is_empty()) {
            map.remove(typ);
        }
        removed
    }

    fn snapshot(&self, typ: &str) -> Vec<Handler> {
        lock(&self.handlers)
            .get(typ)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

/// Shared event bus. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for frames of type `typ` (or [`WILDCARD`] for all frames).
    pub fn on<F>(&self, typ: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let typ = typ.into();
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.handlers)
            .entry(typ.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            typ,
            id,
        }
    }

    /// Remove one handler, or every handler for `typ` when `id` is `None`. Returns how many were removed.
    pub fn off(&self, typ: &str, id: Option<HandlerId>) -> usize {
        self.inner.remove(typ, id)
    }

    /// Deliver to exact-type handlers, then wildcard handlers.
    pub fn emit(&self, env: &Envelope) {
        let exact = self.inner.snapshot(&env.typ);
        let wildcard = if env.typ == WILDCARD {
            Vec::new()
        } else {
            self.inner.snapshot(WILDCARD)
        };
        log::debug!(
            "dispatching {} to {} handler(s)",
            env.typ,
            exact.len() + wildcard.len()
        );
        for handler in exact.iter().chain(wildcard.iter()) {
            if catch_unwind(AssertUnwindSafe(|| handler(env))).is_err() {
                log::error!("handler for {} panicked; continuing with remaining handlers", env.typ);
            }
        }
    }

    pub fn handler_count(&self, typ: &str) -> usize {
        lock(&self.inner.handlers)
            .get(typ)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Handle returned by [`EventBus::on`]. Unsubscribing is idempotent; dropping the handle
/// does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Registry>,
    typ: String,
    id: HandlerId,
}

impl Subscription {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.typ
    }

    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.typ, Some(self.id));
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&'static str) -> Box<dyn Fn(&Envelope) + Send + Sync>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |name: &'static str| -> Box<dyn Fn(&Envelope) + Send + Sync> {
            let log = log2.clone();
            Box::new(move |env: &Envelope| log.lock().unwrap().push(format!("{}:{}", name, env.typ)))
        };
        (log, make)
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        bus.on("system_log", move |e| a(e));
        bus.on("system_log", move |e| b(e));
        bus.emit(&Envelope::new("system_log"));
        assert_eq!(*log.lock().unwrap(), vec!["a:system_log", "b:system_log"]);
    }

    #[test]
    fn wildcard_receives_every_type_after_exact_handlers() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let any = make("any");
        let exact = make("exact");
        bus.on(WILDCARD, move |e| any(e));
        bus.on("tasks_updated", move |e| exact(e));
        bus.emit(&Envelope::new("tasks_updated"));
        bus.emit(&Envelope::new("agent_status"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["exact:tasks_updated", "any:tasks_updated", "any:agent_status"]
        );
    }

    #[test]
    fn unsubscribe_removes_only_that_handler_and_is_idempotent() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let sub_a = bus.on("x", move |e| a(e));
        bus.on("x", move |e| b(e));
        sub_a.unsubscribe();
        sub_a.unsubscribe();
        bus.emit(&Envelope::new("x"));
        assert_eq!(*log.lock().unwrap(), vec!["b:x"]);
        assert_eq!(bus.handler_count("x"), 1);
    }

    #[test]
    fn off_without_id_clears_type() {
        let bus = EventBus::new();
        bus.on("x", |_| {});
        bus.on("x", |_| {});
        bus.on("y", |_| {});
        assert_eq!(bus.off("x", None), 2);
        assert_eq!(bus.handler_count("x"), 0);
        assert_eq!(bus.handler_count("y"), 1);
    }

    #[test]
    fn panicking_handler_does_not_block_siblings() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let after = make("after");
        bus.on("x", |_| panic!("handler failure"));
        bus.on("x", move |e| after(e));
        bus.emit(&Envelope::new("x"));
        assert_eq!(*log.lock().unwrap(), vec!["after:x"]);
    }

    #[test]
    fn poisoned_registry_still_registers_and_dispatches() {
        let bus = EventBus::new();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _held = bus.inner.handlers.lock().unwrap();
            panic!("poison the registry");
        }));
        assert!(bus.inner.handlers.is_poisoned());

        let (log, make) = recorder();
        let a = make("a");
        let sub = bus.on("x", move |e| a(e));
        assert_eq!(bus.handler_count("x"), 1);
        bus.emit(&Envelope::new("x"));
        assert_eq!(*log.lock().unwrap(), vec!["a:x"]);
        sub.unsubscribe();
        assert_eq!(bus.handler_count("x"), 0);
    }

    #[test]
    fn unsubscribing_during_dispatch_keeps_current_cycle_intact() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");

        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));
        let slot2 = slot.clone();
        let sub = bus.on("x", move |e| {
            first(e);
            if let Some(s) = slot2.lock().unwrap().as_ref() {
                s.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);
        let second_sub = bus.on("x", move |e| second(e));
        let bus2 = bus.clone();
        let second_id = second_sub.id();
        bus.on("x", move |_| {
            bus2.off("x", Some(second_id));
        });

        bus.emit(&Envelope::new("x"));
        assert_eq!(*log.lock().unwrap(), vec!["first:x", "second:x"]);

        bus.emit(&Envelope::new("x"));
        assert_eq!(*log.lock().unwrap(), vec!["first:x", "second:x"]);
        assert_eq!(bus.handler_count("x"), 1);
    }
}
