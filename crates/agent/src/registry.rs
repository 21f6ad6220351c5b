//! Session construction and the session-key → session map.

use apexclaw_core::provider::LlmClient;
use apexclaw_core::tool::ToolRegistry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::session::{AgentSession, SessionSettings};

/// Everything needed to build a new `AgentSession`.
#[derive(Clone)]
pub struct SessionFactory {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    model_id: String,
    settings: SessionSettings,
}

impl SessionFactory {
    pub fn new(
        client: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        model_id: impl Into<String>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            client,
            tools,
            model_id: model_id.into(),
            settings,
        }
    }

    /// A fresh session with a system prompt for the current tool set.
    pub fn create(&self) -> AgentSession {
        AgentSession::new(
            self.client.clone(),
            self.tools.clone(),
            self.model_id.clone(),
            self.settings.clone(),
        )
    }

    /// A fresh session whose secure tools answer only to `owner_id`.
    pub fn create_with_owner(&self, owner_id: &str) -> AgentSession {
        AgentSession::new(
            self.client.clone(),
            self.tools.clone(),
            self.model_id.clone(),
            self.settings.clone().with_owner(owner_id),
        )
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

/// Lazily populated map of session key → session.
///
/// Keys are opaque; the dispatcher uses the sender id.
pub struct SessionRegistry {
    factory: SessionFactory,
    sessions: RwLock<HashMap<String, Arc<AgentSession>>>,
}

impl SessionRegistry {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub fn get(&self, key: &str) -> Option<Arc<AgentSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Return the session for `key`, creating it on first use.
    pub fn get_or_create(&self, key: &str) -> Arc<AgentSession> {
        if let Some(session) = self.get(key) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(session = %key, "Creating session");
                Arc::new(self.factory.create())
            })
            .clone()
    }

    /// Register `session` under `key`, replacing any previous one.
    pub fn insert(&self, key: impl Into<String>, session: Arc<AgentSession>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), session);
    }

    /// Drop the session for `key`. Returns whether one existed.
    pub fn delete(&self, key: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedClient;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionFactory::new(
            Arc::new(ScriptedClient::new(["hi"])),
            Arc::new(ToolRegistry::new()),
            "test-model",
            SessionSettings::default(),
        ))
    }

    #[test]
    fn get_or_create_reuses_session() {
        let sessions = registry();
        assert!(sessions.get("42").is_none());

        let a = sessions.get_or_create("42");
        let b = sessions.get_or_create("42");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sessions.len(), 1);
        assert_eq!(a.model_id(), "test-model");
    }

    #[test]
    fn distinct_keys_get_distinct_sessions() {
        let sessions = registry();
        let a = sessions.get_or_create("42");
        let b = sessions.get_or_create("web_42");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn delete_removes_entry() {
        let sessions = registry();
        let before = sessions.get_or_create("42");
        assert!(sessions.delete("42"));
        assert!(!sessions.delete("42"));
        assert!(sessions.is_empty());

        let after = sessions.get_or_create("42");
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn inserted_session_is_returned_until_deleted() {
        let sessions = registry();
        let session = Arc::new(sessions.factory().create_with_owner("heartbeat:a#1"));
        assert_eq!(session.settings().owner_id, "heartbeat:a#1");

        sessions.insert("heartbeat:a#1", session.clone());
        assert!(Arc::ptr_eq(&sessions.get_or_create("heartbeat:a#1"), &session));
        assert!(sessions.delete("heartbeat:a#1"));
        assert!(sessions.get("heartbeat:a#1").is_none());
    }

    #[test]
    fn new_sessions_start_with_system_prompt() {
        let session = registry().get_or_create("1");
        assert_eq!(session.history_len(), 1);
    }
}
