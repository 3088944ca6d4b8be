//! Error types shared by the catalog, the assignment engine and the answer workflow

use crate::category::Category;
use thiserror::Error;

/// Errors returned by `cri_core` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The student's question map has no entry for this category.
    #[error("unknown category: {0}")]
    UnknownCategory(Category),

    /// Advance was called on a queue that has nothing left in it.
    #[error("empty queue for category {0}")]
    EmptyQueue(Category),

    /// The queue head moved on before this answer was recorded (double submit).
    #[error("stale answer for category {category}: expected head {expected}, found {actual:?}")]
    StaleHead {
        category: Category,
        expected: i64,
        actual: Option<i64>,
    },

    #[error("student not found: {0}")]
    StudentNotFound(i64),

    #[error("question not found: {0}")]
    QuestionNotFound(i64),

    #[error("school not found: {0}")]
    SchoolNotFound(i64),

    #[error("username already registered: {0}")]
    DuplicateUsername(String),

    #[error("import failed: {0}")]
    Import(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` for errors that mean the caller broke the workflow
    /// contract (answering an empty or unknown queue, or answering twice).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::UnknownCategory(_) | Error::EmptyQueue(_) | Error::StaleHead { .. }
        )
    }

    /// Returns `true` when a referenced record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::StudentNotFound(_) | Error::QuestionNotFound(_) | Error::SchoolNotFound(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<Error> for pyo3::PyErr {
    fn from(err: Error) -> Self {
        if err.is_precondition() {
            pyo3::exceptions::PyValueError::new_err(err.to_string())
        } else if err.is_not_found() {
            pyo3::exceptions::PyKeyError::new_err(err.to_string())
        } else {
            pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_precondition_errors() {
        assert!(Error::EmptyQueue(Category::WordProblem).is_precondition());
        assert!(Error::UnknownCategory(Category::Geometry).is_precondition());
        assert!(Error::StaleHead {
            category: Category::WordProblem,
            expected: 1,
            actual: Some(2),
        }
        .is_precondition());
        assert!(!Error::StudentNotFound(3).is_precondition());
        assert!(Error::StudentNotFound(3).is_not_found());
    }

    #[test]
    fn messages_name_the_category_tag() {
        let err = Error::EmptyQueue(Category::WordProblem);
        assert_eq!(err.to_string(), "empty queue for category word_problem");
    }
}
