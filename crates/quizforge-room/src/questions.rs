//! Question sources.
//!
//! A room never reads question banks itself; the host's `loadQuestions`
//! asks a [`QuestionSource`] for a validated list and hands it to the
//! room.

use std::path::PathBuf;

use tracing::{info, warn};

use quizforge_protocol::Question;

/// Errors from loading a question bank.
#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("questions file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("questions file {path} is not a JSON array: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Produces a finite, ordered list of validated questions.
///
/// `load` may block (file I/O); callers run it off the async executor.
pub trait QuestionSource: Send + Sync + 'static {
    fn load(&self) -> Result<Vec<Question>, QuestionError>;
}

/// A fixed in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestions {
    questions: Vec<Question>,
}

impl StaticQuestions {
    /// Keeps only the questions that pass validation.
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: keep_valid(questions.into_iter().map(Ok)),
        }
    }
}

impl QuestionSource for StaticQuestions {
    fn load(&self) -> Result<Vec<Question>, QuestionError> {
        Ok(self.questions.clone())
    }
}

/// Reads a JSON array of questions from disk on every load, so the host
/// can edit the bank between games without restarting the server.
///
/// Invalid entries are logged and skipped; the rest load normally.
#[derive(Debug, Clone)]
pub struct JsonFileQuestions {
    path: PathBuf,
}

impl JsonFileQuestions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QuestionSource for JsonFileQuestions {
    fn load(&self) -> Result<Vec<Question>, QuestionError> {
        let bytes = std::fs::read(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                QuestionError::NotFound(self.path.clone())
            } else {
                QuestionError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        let raw: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).map_err(|source| QuestionError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let questions = keep_valid(raw.into_iter().map(serde_json::from_value::<Question>));
        info!(path = %self.path.display(), count = questions.len(), "questions loaded");
        Ok(questions)
    }
}

fn keep_valid<I>(candidates: I) -> Vec<Question>
where
    I: Iterator<Item = Result<Question, serde_json::Error>>,
{
    candidates
        .enumerate()
        .filter_map(|(i, candidate)| {
            let checked = candidate
                .map_err(|e| e.to_string())
                .and_then(|q| q.normalized().map_err(|e| e.to_string()));
            match checked {
                Ok(q) => Some(q),
                Err(reason) => {
                    warn!(index = i, %reason, "skipping invalid question");
                    None
                }
            }
        })
        .collect()
}
