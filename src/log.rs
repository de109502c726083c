// Hierarchical event sink. Every logger forwards its events to `tracing`
// once, then hands them to its own listeners and to every ancestor's
// listeners, so a CLI can subscribe at the root and still see which
// component spoke.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        f.write_str(s)
    }
}

/// One emitted message with an optional structured payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

type Listener = Arc<dyn Fn(&str, &Event) + Send + Sync>;

struct Node {
    name: String,
    parent: Option<Logger>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

/// Cheap to clone; clones share listeners.
#[derive(Clone)]
pub struct Logger {
    node: Arc<Node>,
}

/// Handle returned by [`Logger::add_listener`].
pub struct Subscription {
    node: Weak<Node>,
    id: u64,
}

impl Subscription {
    /// Detach the listener. Does nothing if the logger is already gone.
    pub fn remove(self) {
        if let Some(node) = self.node.upgrade() {
            lock(&node.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parent(name.into(), None)
    }

    fn with_parent(name: String, parent: Option<Logger>) -> Self {
        Logger {
            node: Arc::new(Node {
                name,
                parent,
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a logger whose events also reach this one.
    pub fn child(&self, name: impl Into<String>) -> Logger {
        Self::with_parent(name.into(), Some(self.clone()))
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// `Root: Child: Grandchild`
    pub fn full_name(&self) -> String {
        match &self.node.parent {
            Some(parent) => format!("{}: {}", parent.full_name(), self.node.name),
            None => self.node.name.clone(),
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str, &Event) + Send + Sync + 'static,
    {
        let id = self.node.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.node.listeners).push((id, Arc::new(listener)));
        Subscription {
            node: Arc::downgrade(&self.node),
            id,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log_with(Level::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log_with(Level::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log_with(Level::Error, message, None);
    }

    pub fn log_with(
        &self,
        level: Level,
        message: impl Into<String>,
        context: Option<serde_json::Value>,
    ) {
        let event = Event {
            level,
            message: message.into(),
            context,
        };
        let origin = self.full_name();

        match (event.level, &event.context) {
            (Level::Info, None) => tracing::info!(logger = %origin, "{}", event.message),
            (Level::Info, Some(ctx)) => {
                tracing::info!(logger = %origin, context = %ctx, "{}", event.message)
            }
            (Level::Warn, None) => tracing::warn!(logger = %origin, "{}", event.message),
            (Level::Warn, Some(ctx)) => {
                tracing::warn!(logger = %origin, context = %ctx, "{}", event.message)
            }
            (Level::Error, None) => tracing::error!(logger = %origin, "{}", event.message),
            (Level::Error, Some(ctx)) => {
                tracing::error!(logger = %origin, context = %ctx, "{}", event.message)
            }
        }

        let mut current = Some(self);
        while let Some(logger) = current {
            logger.notify(&origin, &event);
            current = logger.node.parent.as_ref();
        }
    }

    fn notify(&self, origin: &str, event: &Event) {
        // Snapshot so a listener may add or remove listeners.
        let listeners: Vec<Listener> = lock(&self.node.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(origin, event);
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.full_name())
            .finish()
    }
}
