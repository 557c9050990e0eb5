//! Session registry: the single in-process authority over live sessions.
//!
//! The registry is an explicitly constructed value owned by the server (not
//! ambient global state) and takes its authoring-store dependency as a
//! [`QuizLookup`] capability at construction, which is what lets the
//! orchestrator be tested without a live transport or a real catalog.

use crate::session::{Session, SessionError};
use crate::store::StoreError;
use async_trait::async_trait;
use log::{info, warn};
use shared::QuizDefinition;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Read access to the external authoring store, consulted only on a cold
/// session code.
#[async_trait]
pub trait QuizLookup: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<QuizDefinition>, StoreError>;
}

/// Session codes are case-insensitive on the wire; everything internal uses
/// the uppercase form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    store: Arc<dyn QuizLookup>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn QuizLookup>) -> Self {
        Self {
            sessions: HashMap::new(),
            store,
        }
    }

    pub fn get(&mut self, code: &str) -> Option<&mut Session> {
        self.sessions.get_mut(&normalize_code(code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.sessions.contains_key(&normalize_code(code))
    }

    /// Fetches the quiz definition behind a code from the authoring store.
    /// A store miss and a store failure both come back as
    /// [`SessionError::NotFound`]; the player-facing path does not
    /// distinguish them.
    pub async fn load_quiz(&self, code: &str) -> Result<QuizDefinition, SessionError> {
        let code = normalize_code(code);
        match self.store.find_by_code(&code).await {
            Ok(Some(quiz)) => Ok(quiz),
            Ok(None) => {
                info!("No quiz in the catalog for code {}", code);
                Err(SessionError::NotFound)
            }
            Err(e) => {
                warn!("Authoring store lookup for {} failed: {}", code, e);
                Err(SessionError::NotFound)
            }
        }
    }

    /// Resolves a session, lazily creating it from the authoring store on a
    /// cold code (with no admin identity yet).
    ///
    /// The event loop processes one handler at a time, so two joins cannot
    /// interleave the store await; the map is still re-checked after the
    /// await so a duplicate session can never be constructed.
    pub async fn get_or_load(&mut self, code: &str) -> Result<&mut Session, SessionError> {
        let code = normalize_code(code);

        if !self.sessions.contains_key(&code) {
            let quiz = self.load_quiz(&code).await?;
            info!("Creating session {} for quiz '{}'", code, quiz.title);
            self.sessions
                .entry(code.clone())
                .or_insert_with(|| Session::new(code.clone(), quiz, None));
        }

        self.sessions.get_mut(&code).ok_or(SessionError::NotFound)
    }

    /// Creates a session with a known admin identity (the host path).
    /// Replaces nothing: the caller checks for an existing session first.
    pub fn create(
        &mut self,
        quiz: QuizDefinition,
        admin: SocketAddr,
        code: &str,
    ) -> &mut Session {
        let code = normalize_code(code);
        info!("Creating session {} hosted by {}", code, admin);
        self.sessions
            .entry(code.clone())
            .or_insert_with(|| Session::new(code, quiz, Some(admin)))
    }

    pub fn remove(&mut self, code: &str) -> Option<Session> {
        self.sessions.remove(&normalize_code(code))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Codes of every live session, for shutdown logging.
    pub fn codes(&self) -> Vec<&str> {
        self.sessions.keys().map(|c| c.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQuizStore;
    use shared::Question;

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn sample_quiz() -> QuizDefinition {
        QuizDefinition {
            title: "Sample".to_string(),
            description: String::new(),
            questions: vec![Question {
                prompt: "?".to_string(),
                options: [
                    "a".to_string(),
                    "b".to_string(),
                    "c".to_string(),
                    "d".to_string(),
                ],
                correct_option: 0,
                points: 100,
                time_limit_secs: None,
            }],
        }
    }

    fn registry_with(codes: &[&str]) -> SessionRegistry {
        let mut store = MemoryQuizStore::new();
        for code in codes {
            store.insert(*code, sample_quiz());
        }
        SessionRegistry::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_cold_code_loads_from_store() {
        let mut registry = registry_with(&["ABCD1"]);
        assert!(!registry.contains("ABCD1"));

        let session = registry.get_or_load("ABCD1").await.unwrap();
        assert_eq!(session.code, "ABCD1");
        assert!(session.admin().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_codes_are_normalized_at_every_entry_point() {
        let mut registry = registry_with(&["ABCD1"]);
        registry.get_or_load("  abcd1 ").await.unwrap();

        assert!(registry.contains("ABCD1"));
        assert!(registry.contains("abcd1"));
        assert!(registry.get("aBcD1").is_some());
        // Second lookup reuses the same session, no duplicate
        registry.get_or_load("Abcd1").await.unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let mut registry = registry_with(&[]);
        let result = registry.get_or_load("NOPE1").await;
        assert!(matches!(result, Err(SessionError::NotFound)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_surfaces_as_not_found() {
        struct FailingStore;

        #[async_trait]
        impl QuizLookup for FailingStore {
            async fn find_by_code(
                &self,
                _code: &str,
            ) -> Result<Option<QuizDefinition>, StoreError> {
                Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "store offline",
                )))
            }
        }

        let mut registry = SessionRegistry::new(Arc::new(FailingStore));
        let result = registry.get_or_load("ABCD1").await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn test_create_sets_admin() {
        let mut registry = registry_with(&[]);
        let session = registry.create(sample_quiz(), test_addr(9), "wxyz9");
        assert_eq!(session.code, "WXYZ9");
        assert!(session.is_admin(test_addr(9)));
    }

    #[tokio::test]
    async fn test_remove_and_codes() {
        let mut registry = registry_with(&["ABCD1", "WXYZ9"]);
        registry.get_or_load("ABCD1").await.unwrap();
        registry.get_or_load("WXYZ9").await.unwrap();

        let mut codes = registry.codes();
        codes.sort();
        assert_eq!(codes, vec!["ABCD1", "WXYZ9"]);

        assert!(registry.remove("abcd1").is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("ABCD1").is_none());
    }
}
