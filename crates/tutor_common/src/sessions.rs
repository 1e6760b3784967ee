//! Session registry for serving several conversations at once.
//!
//! Each session owns one orchestrator behind its own mutex, so inputs on a
//! session are processed strictly in arrival order while other sessions run
//! independently. Sessions share only the knowledge base and the transport.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::config::TutorConfig;
use crate::knowledge::KnowledgeBase;
use crate::llm::LlmClient;
use crate::orchestrator::{Orchestrator, OrchestratorResult};

pub type SessionId = Uuid;

pub struct SessionManager {
    kb: Arc<KnowledgeBase>,
    llm: Arc<dyn LlmClient>,
    config: TutorConfig,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Mutex<Orchestrator>>>>>,
}

impl SessionManager {
    pub fn new(kb: Arc<KnowledgeBase>, llm: Arc<dyn LlmClient>, config: TutorConfig) -> Self {
        Self {
            kb,
            llm,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self) -> SessionId {
        let id = Uuid::new_v4();
        let orchestrator = Orchestrator::new(self.kb.clone(), self.llm.clone(), &self.config);
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(orchestrator)));
        info!(session = %id, "session created");
        id
    }

    async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Orchestrator>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Run one input on a session. None if the session does not exist.
    pub async fn process(&self, id: &SessionId, input: &str) -> Option<OrchestratorResult> {
        let session = self.get(id).await?;
        let mut orchestrator = session.lock().await;
        Some(orchestrator.process_query(input).await)
    }

    pub async fn reset(&self, id: &SessionId) -> bool {
        match self.get(id).await {
            Some(session) => {
                session.lock().await.reset();
                true
            }
            None => false,
        }
    }

    pub async fn end(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = %id, "session ended");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
