use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use medichat_core::chat::ChatSession;
use medichat_core::MediChat;
use minijinja::Environment;
use tracing::warn;

use crate::templates;

pub type Sessions = Arc<Mutex<HashMap<String, ChatSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub medichat: MediChat,
    pub sessions: Sessions,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(medichat: MediChat) -> Result<Self, minijinja::Error> {
        Ok(Self {
            medichat,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            templates: Arc::new(templates::environment()?),
        })
    }

    /// Lock the session map, logging a warning if it was poisoned.
    pub fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, ChatSession>> {
        self.sessions.lock().unwrap_or_else(|e| {
            warn!("session mutex was poisoned, recovering");
            e.into_inner()
        })
    }
}
