use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::Ticket;

/// Failure to write the decisions mapping back to durable storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode decisions: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification of [`DecisionError`], used by shells to pick a
/// status code or exit message without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Duplicate,
    NotFound,
    EmptySet,
    StaleSuggestion,
    Io,
}

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("problem {problem:?} already exists")]
    DuplicateProblem { problem: String },
    #[error("solution {solution:?} already exists for problem {problem:?}")]
    DuplicateSolution { problem: String, solution: String },
    #[error("problem {problem:?} does not exist")]
    ProblemNotFound { problem: String },
    #[error("solution {solution:?} does not exist for problem {problem:?}")]
    SolutionNotFound { problem: String, solution: String },
    #[error("problem {problem:?} has no solutions to choose from")]
    EmptySet { problem: String },
    #[error("suggestion {ticket} is no longer pending; ask for a new suggestion")]
    StaleSuggestion { ticket: Ticket },
    /// The in-memory change was applied but could not be saved.
    #[error("change kept in memory but not saved: {0}")]
    Store(#[from] StoreError),
}

impl DecisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecisionError::Validation(_) => ErrorKind::Validation,
            DecisionError::DuplicateProblem { .. } | DecisionError::DuplicateSolution { .. } => {
                ErrorKind::Duplicate
            }
            DecisionError::ProblemNotFound { .. } | DecisionError::SolutionNotFound { .. } => {
                ErrorKind::NotFound
            }
            DecisionError::EmptySet { .. } => ErrorKind::EmptySet,
            DecisionError::StaleSuggestion { .. } => ErrorKind::StaleSuggestion,
            DecisionError::Store(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn problem_not_found(problem: &str) -> Self {
        DecisionError::ProblemNotFound {
            problem: problem.to_string(),
        }
    }

    pub(crate) fn solution_not_found(problem: &str, solution: &str) -> Self {
        DecisionError::SolutionNotFound {
            problem: problem.to_string(),
            solution: solution.to_string(),
        }
    }
}
