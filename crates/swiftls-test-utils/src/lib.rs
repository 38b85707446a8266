//! In-process fake compiler service.
//!
//! Tests script the fake with a responder closure, inspect the recorded
//! request log, and inject daemon notifications. UIDs come from a plain
//! string interner, so response dictionaries are built with the same
//! vocabulary the worker resolves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use swiftls_sourcekitd::{
    CompilerService, Notification, ServiceResult, Uid, Value, Vocabulary,
};

type Responder = Box<dyn FnMut(&Value) -> ServiceResult<Value> + Send>;

/// A scriptable [`CompilerService`] living in-process.
pub struct FakeService {
    vocabulary: Vocabulary,
    interner: Mutex<Interner>,
    responder: Mutex<Option<Responder>>,
    log: Mutex<Vec<Value>>,
    notifications: broadcast::Sender<Notification>,
}

#[derive(Default)]
struct Interner {
    table: HashMap<String, u64>,
    next: u64,
}

impl Interner {
    fn intern(&mut self, s: &str) -> Uid {
        if let Some(&id) = self.table.get(s) {
            return Uid::from_raw(id);
        }
        self.next += 1;
        let id = self.next;
        self.table.insert(s.to_string(), id);
        Uid::from_raw(id)
    }
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        let mut interner = Interner::default();
        let vocabulary = Vocabulary::resolve(|s| interner.intern(s));
        let (notifications, _) = broadcast::channel(64);
        Arc::new(Self {
            vocabulary,
            interner: Mutex::new(interner),
            responder: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            notifications,
        })
    }

    /// Resolve a UID by string, interning it if new. Lets tests build
    /// responses with the exact identities the worker resolved.
    pub fn uid(&self, s: &str) -> Uid {
        self.interner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .intern(s)
    }

    /// The vocabulary as the worker sees it.
    pub fn vocab(&self) -> Vocabulary {
        self.vocabulary
    }

    /// Script the responder. The previous responder is replaced.
    pub fn respond_with(
        &self,
        responder: impl FnMut(&Value) -> ServiceResult<Value> + Send + 'static,
    ) {
        *self.responder.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(responder));
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<Value> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Requests filtered to a specific request UID.
    pub fn requests_named(&self, request: Uid) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.get_uid(self.vocabulary.keys.request) == Some(request))
            .collect()
    }

    /// Drop the recorded request log.
    pub fn clear_requests(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Inject a daemon notification.
    pub fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }

    /// Inject a notification dictionary with the given `key.notification`
    /// kind and optional `key.name`.
    pub fn notify_kind(&self, kind: Uid, name: Option<&str>) {
        let keys = self.vocabulary.keys;
        let mut entries = vec![(keys.notification, Value::Uid(kind))];
        if let Some(name) = name {
            entries.push((keys.name, Value::string(name)));
        }
        self.notify(Notification::Message(Value::dictionary(entries)));
    }
}

#[async_trait]
impl CompilerService for FakeService {
    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    async fn send(&self, request: Value) -> ServiceResult<Value> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let mut responder = self.responder.lock().unwrap_or_else(|e| e.into_inner());
        match responder.as_mut() {
            Some(f) => f(&request),
            None => Ok(Value::dictionary([])),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}
