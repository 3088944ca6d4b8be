//! Progress tracking - attempt log and statistics

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::{params, Connection};

use crate::category::Category;
use crate::db::{question_from_row, Question};
use crate::error::Result;
use crate::student::load_assignment;

/// Attempt statistics for one student or for everyone
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptStats {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub total_attempts: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub correct_count: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub incorrect_count: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub accuracy_percent: f64,
}

#[cfg(feature = "python")]
#[pymethods]
impl AttemptStats {
    fn __repr__(&self) -> String {
        format!(
            "AttemptStats(total={}, correct={}, accuracy={:.1}%)",
            self.total_attempts, self.correct_count, self.accuracy_percent
        )
    }
}

/// How far a student is through one category
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryProgress {
    pub category: Category,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub remaining: usize,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub missed: usize,
}

#[cfg(feature = "python")]
#[pymethods]
impl CategoryProgress {
    #[getter(category)]
    fn py_category(&self) -> String {
        self.category.to_string()
    }
}

pub fn record_attempt(
    conn: &Connection,
    student_id: i64,
    question: &Question,
    user_answer: &str,
    is_correct: bool,
    attempted_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO attempts (student_id, question_id, category, is_correct, user_answer, expected_answer, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            student_id,
            question.id,
            question.category,
            is_correct,
            user_answer,
            question.answer,
            attempted_at
        ],
    )?;
    Ok(())
}

/// Accuracy over all attempts, or over one student's attempts
pub fn get_stats(conn: &Connection, student_id: Option<i64>) -> Result<AttemptStats> {
    let stats = conn.query_row(
        "SELECT COUNT(*), SUM(is_correct) FROM attempts WHERE ?1 IS NULL OR student_id = ?1",
        params![student_id],
        |row| {
            let total: i64 = row.get(0)?;
            let correct: i64 = row.get::<_, Option<i64>>(1)?.unwrap_or(0);
            let accuracy = if total > 0 {
                (correct as f64 / total as f64) * 100.0
            } else {
                0.0
            };

            Ok(AttemptStats {
                total_attempts: total,
                correct_count: correct,
                incorrect_count: total - correct,
                accuracy_percent: accuracy,
            })
        },
    )?;
    Ok(stats)
}

/// Remaining and missed counts per category in the student's map
pub fn get_category_progress(conn: &Connection, student_id: i64) -> Result<Vec<CategoryProgress>> {
    let assignment = load_assignment(conn, student_id)?;

    let mut stmt = conn.prepare(
        "SELECT q.category, COUNT(*)
         FROM missed_questions m
         JOIN questions q ON q.id = m.question_id
         WHERE m.student_id = ?1
         GROUP BY q.category",
    )?;
    let missed = stmt
        .query_map(params![student_id], |row| {
            Ok((row.get::<_, Category>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(assignment
        .current_questions
        .iter()
        .map(|(category, queue)| CategoryProgress {
            category: category.clone(),
            remaining: queue.len(),
            missed: missed
                .iter()
                .find(|(c, _)| c == category)
                .map_or(0, |(_, n)| *n as usize),
        })
        .collect())
}

/// Questions answered incorrectly, most-missed first
pub fn get_most_missed(conn: &Connection, limit: Option<usize>) -> Result<Vec<(Question, i64)>> {
    let limit_clause = limit.map(|l| format!(" LIMIT {}", l)).unwrap_or_default();

    let query = format!(
        "SELECT q.id, q.category, q.prompt, q.choices, q.answer, q.image, COUNT(*) as fail_count
         FROM questions q
         JOIN attempts a ON q.id = a.question_id
         WHERE a.is_correct = 0
         GROUP BY q.id
         ORDER BY fail_count DESC, q.id{}",
        limit_clause
    );

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([], |row| Ok((question_from_row(row)?, row.get::<_, i64>(6)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;
    use crate::db::open_database;

    #[pyfunction]
    #[pyo3(name = "get_stats", signature = (db_path, student_id=None))]
    pub fn py_get_stats(db_path: &str, student_id: Option<i64>) -> PyResult<AttemptStats> {
        let conn = open_database(db_path)?;
        Ok(get_stats(&conn, student_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_category_progress")]
    pub fn py_get_category_progress(db_path: &str, student_id: i64) -> PyResult<Vec<CategoryProgress>> {
        let conn = open_database(db_path)?;
        Ok(get_category_progress(&conn, student_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_most_missed", signature = (db_path, limit=None))]
    pub fn py_get_most_missed(db_path: &str, limit: Option<usize>) -> PyResult<Vec<(Question, i64)>> {
        let conn = open_database(db_path)?;
        Ok(get_most_missed(&conn, limit)?)
    }
}
