//! Read-mostly map from session id to [`Session`]; mutated only on
//! create/fork/attach/destroy, per the Concurrency & Resource Model.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::page::{PageController, PageError};
use crate::session::Session;

pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Registers a freshly opened page controller as a new session and
    /// returns its generated id.
    pub fn create(&self, page: Arc<dyn PageController>) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), page));
        self.sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, "session created");
        session
    }

    /// Registers an already-open browser target (one the caller attached
    /// to out of band) as a session under a generated id.
    pub fn attach(&self, page: Arc<dyn PageController>) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), page));
        self.sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, "session attached");
        session
    }

    /// Clones `source`'s page controller (cookies, storage) onto a new
    /// target and registers it as a sibling session with its own, empty
    /// element registry.
    pub async fn fork(&self, source_id: &str) -> Result<Arc<Session>, SessionError> {
        let source = self.get(source_id)?;
        let forked_page = source
            .page()
            .fork()
            .await
            .map_err(|e: PageError| SessionError::UnknownSession(format!("{source_id}: {e}")))?;
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), Arc::from(forked_page)));
        self.sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, forked_from = %source_id, "session forked");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    /// Closes the underlying page controller and drops the session from
    /// the map. Idempotent: destroying an unknown session is a no-op, not
    /// an error, since shutdown may race with per-session cleanup.
    pub async fn destroy(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            if let Err(e) = session.page().close().await {
                debug!(session_id, error = %e, "error closing page controller during destroy");
            }
            info!(session_id, "session destroyed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakePage {
        id: String,
        closed: AtomicBool,
    }

    #[async_trait]
    impl PageController for FakePage {
        fn target_id(&self) -> &str {
            &self.id
        }
        async fn navigate(&self, _url: &str) -> Result<(), PageError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, PageError> {
            Ok(Value::Null)
        }
        async fn fork(&self) -> Result<Box<dyn PageController>, PageError> {
            Ok(Box::new(FakePage {
                id: format!("{}-fork", self.id),
                closed: AtomicBool::new(false),
            }))
        }
        async fn close(&self) -> Result<(), PageError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
            Ok(Vec::new())
        }
    }

    fn fake_page(id: &str) -> Arc<dyn PageController> {
        Arc::new(FakePage {
            id: id.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let manager = SessionManager::new();
        let session = manager.create(fake_page("t1"));
        let fetched = manager.get(&session.id).unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn get_unknown_session_errors() {
        let manager = SessionManager::new();
        assert!(matches!(
            manager.get("missing").unwrap_err(),
            SessionError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn fork_creates_sibling_with_independent_registry() {
        let manager = SessionManager::new();
        let source = manager.create(fake_page("t1"));
        source.registry.replace_all(vec![]);
        let forked = manager.fork(&source.id).await.unwrap();
        assert_ne!(forked.id, source.id);
        assert_eq!(forked.registry.generation(), 0);
    }

    #[tokio::test]
    async fn destroy_removes_session_and_is_idempotent() {
        let manager = SessionManager::new();
        let session = manager.create(fake_page("t1"));
        manager.destroy(&session.id).await;
        assert!(manager.get(&session.id).is_err());
        manager.destroy(&session.id).await;
    }
}
