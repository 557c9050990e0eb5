//! Authoring store backends for the [`QuizLookup`](crate::registry::QuizLookup)
//! capability.
//!
//! The orchestrator only consults the store on a cold session code; a catalog
//! re-read per miss is acceptable at that rate and means edits to the file are
//! picked up without a restart.

use crate::registry::QuizLookup;
use async_trait::async_trait;
use log::debug;
use shared::QuizDefinition;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read quiz catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed quiz catalog: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Quiz catalog stored as a JSON object mapping session codes to quiz
/// definitions.
pub struct FileQuizStore {
    path: PathBuf,
}

impl FileQuizStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuizLookup for FileQuizStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<QuizDefinition>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let catalog: HashMap<String, QuizDefinition> = serde_json::from_str(&raw)?;
        debug!(
            "Catalog {} holds {} quizzes, looking up {}",
            self.path.display(),
            catalog.len(),
            code
        );
        Ok(catalog
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(code))
            .map(|(_, quiz)| quiz))
    }
}

/// In-memory catalog for tests.
#[derive(Default)]
pub struct MemoryQuizStore {
    quizzes: HashMap<String, QuizDefinition>,
}

impl MemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, quiz: QuizDefinition) {
        self.quizzes.insert(code.into().to_ascii_uppercase(), quiz);
    }
}

#[async_trait]
impl QuizLookup for MemoryQuizStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<QuizDefinition>, StoreError> {
        Ok(self.quizzes.get(&code.to_ascii_uppercase()).cloned())
    }
}
