//! Student profiles, schools and persisted question queues
//!
//! Queue mutations run inside a `BEGIN IMMEDIATE` transaction so two requests
//! for the same student cannot both pop the same head.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

use crate::assignment::{Assignment, NextQuestion};
use crate::category::Category;
use crate::db::{get_question_by_id, get_questions, Question};
use crate::error::{Error, Result};

/// Registration form data
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub username: String,
    pub name: String,
    pub school_id: Option<i64>,
    pub year: Option<i64>,
    pub past_sat_score: Option<i64>,
}

#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub username: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub name: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub school_id: Option<i64>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub year: Option<i64>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub past_sat_score: Option<i64>,
    /// Unix seconds
    #[cfg_attr(feature = "python", pyo3(get))]
    pub last_login: Option<i64>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub created_at: i64,
}

#[cfg(feature = "python")]
#[pymethods]
impl Student {
    fn __repr__(&self) -> String {
        format!("Student(id={}, username='{}')", self.id, self.username)
    }
}

#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct School {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub name: String,
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn immediate_transaction(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

// ============= Schools =============

/// Add a school, returning the id of the existing row if the name is taken
pub fn add_school(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO schools (name) VALUES (?1)",
        params![name.trim()],
    )?;
    let id = conn.query_row(
        "SELECT id FROM schools WHERE name = ?1",
        params![name.trim()],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_schools(conn: &Connection) -> Result<Vec<School>> {
    let mut stmt = conn.prepare("SELECT id, name FROM schools ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(School {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ============= Profiles =============

const STUDENT_COLUMNS: &str =
    "id, username, name, school_id, year, past_sat_score, last_login, created_at";

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        school_id: row.get(3)?,
        year: row.get(4)?,
        past_sat_score: row.get(5)?,
        last_login: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(crate) fn ensure_student(conn: &Connection, student_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM students WHERE id = ?1)",
        params![student_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::StudentNotFound(student_id))
    }
}

/// Create a student and assign every question currently in the catalog.
///
/// The catalog snapshot is read in the same transaction as the insert, so a
/// concurrent upload is either fully visible to the new student or not at all.
pub fn register_student(conn: &Connection, student: &NewStudent) -> Result<i64> {
    let tx = immediate_transaction(conn)?;

    if let Some(school_id) = student.school_id {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM schools WHERE id = ?1)",
            params![school_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::SchoolNotFound(school_id));
        }
    }

    let inserted = tx.execute(
        "INSERT INTO students (username, name, school_id, year, past_sat_score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            student.username,
            student.name,
            student.school_id,
            student.year,
            student.past_sat_score,
            now_timestamp()
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(Error::DuplicateUsername(student.username.clone()));
        }
        Err(e) => return Err(e.into()),
    }
    let student_id = tx.last_insert_rowid();

    let catalog = get_questions(&tx, None)?;
    let assignment = Assignment::initialize(&catalog);
    for (category, queue) in &assignment.current_questions {
        add_category(&tx, student_id, category)?;
        for &question_id in queue {
            append_to_queue(&tx, student_id, category, question_id)?;
        }
    }

    tx.commit()?;
    log::info!(
        "registered student {} ({}) with {} questions in {} categories",
        student_id,
        student.username,
        catalog.len(),
        assignment.current_questions.len()
    );
    Ok(student_id)
}

pub fn get_student(conn: &Connection, student_id: i64) -> Result<Option<Student>> {
    let student = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS),
            params![student_id],
            student_from_row,
        )
        .optional()?;
    Ok(student)
}

pub fn get_student_by_username(conn: &Connection, username: &str) -> Result<Option<Student>> {
    let student = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE username = ?1", STUDENT_COLUMNS),
            params![username],
            student_from_row,
        )
        .optional()?;
    Ok(student)
}

/// All students, for the user directory
pub fn get_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY name, id",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt.query_map([], student_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Stamp the login time and log an activity session
pub fn record_login(conn: &Connection, student_id: i64, at: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE students SET last_login = ?1 WHERE id = ?2",
        params![at, student_id],
    )?;
    if updated == 0 {
        return Err(Error::StudentNotFound(student_id));
    }
    tx.execute(
        "INSERT INTO sessions (student_id, started_at) VALUES (?1, ?2)",
        params![student_id, at],
    )?;
    tx.commit()?;
    Ok(())
}

/// Delete a student and everything the engine keeps for them
pub fn delete_student(conn: &Connection, student_id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM students WHERE id = ?1", params![student_id])?;
    Ok(deleted > 0)
}

// ============= Queues =============

fn add_category(conn: &Connection, student_id: i64, category: &Category) -> Result<bool> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO student_categories (student_id, category) VALUES (?1, ?2)",
        params![student_id, category],
    )?;
    Ok(added > 0)
}

fn append_to_queue(conn: &Connection, student_id: i64, category: &Category, question_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO student_queue (student_id, category, position, question_id)
         SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0), ?3
         FROM student_queue WHERE student_id = ?1 AND category = ?2",
        params![student_id, category, question_id],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO assigned_questions (student_id, question_id) VALUES (?1, ?2)",
        params![student_id, question_id],
    )?;
    Ok(())
}

fn ensure_category(conn: &Connection, student_id: i64, category: &Category) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM student_categories WHERE student_id = ?1 AND category = ?2)",
        params![student_id, category],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(());
    }
    ensure_student(conn, student_id)?;
    Err(Error::UnknownCategory(category.clone()))
}

fn queue_head(conn: &Connection, student_id: i64, category: &Category) -> Result<Option<(i64, i64)>> {
    let head = conn
        .query_row(
            "SELECT position, question_id FROM student_queue
             WHERE student_id = ?1 AND category = ?2
             ORDER BY position LIMIT 1",
            params![student_id, category],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(head)
}

/// Load a student's queues and missed set
pub fn load_assignment(conn: &Connection, student_id: i64) -> Result<Assignment> {
    ensure_student(conn, student_id)?;
    let mut assignment = Assignment::default();

    let mut stmt = conn.prepare(
        "SELECT category FROM student_categories WHERE student_id = ?1 ORDER BY category",
    )?;
    let categories = stmt.query_map(params![student_id], |row| row.get::<_, Category>(0))?;
    for category in categories {
        assignment.current_questions.entry(category?).or_default();
    }

    let mut stmt = conn.prepare(
        "SELECT category, question_id FROM student_queue
         WHERE student_id = ?1 ORDER BY category, position",
    )?;
    let rows = stmt.query_map(params![student_id], |row| {
        Ok((row.get::<_, Category>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (category, question_id) = row?;
        assignment
            .current_questions
            .entry(category)
            .or_default()
            .push_back(question_id);
    }

    assignment.missed_questions = missed_ids(conn, student_id)?;
    Ok(assignment)
}

fn missed_ids(conn: &Connection, student_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT question_id FROM missed_questions WHERE student_id = ?1 ORDER BY id",
    )?;
    let ids = stmt.query_map(params![student_id], |row| row.get(0))?;
    Ok(ids.collect::<rusqlite::Result<Vec<i64>>>()?)
}

/// Question at the head of the student's queue for `category`, without removing it
pub fn next_question(
    conn: &Connection,
    student_id: i64,
    category: &Category,
) -> Result<NextQuestion<Question>> {
    ensure_category(conn, student_id, category)?;
    match queue_head(conn, student_id, category)? {
        None => Ok(NextQuestion::Complete),
        Some((_, question_id)) => get_question_by_id(conn, question_id)?
            .map(NextQuestion::Question)
            .ok_or(Error::QuestionNotFound(question_id)),
    }
}

/// Pop the queue head inside the caller's transaction.
///
/// With `expected_head` set, the pop only happens while that id is still the
/// head; otherwise the answer is stale and nothing changes.
pub(crate) fn advance_in(
    conn: &Connection,
    student_id: i64,
    category: &Category,
    expected_head: Option<i64>,
    was_correct: bool,
) -> Result<i64> {
    ensure_category(conn, student_id, category)?;
    let (position, head) = queue_head(conn, student_id, category)?
        .ok_or_else(|| Error::EmptyQueue(category.clone()))?;

    if let Some(expected) = expected_head {
        if expected != head {
            log::warn!(
                "student {} answered question {} in {} but the head is {}",
                student_id,
                expected,
                category,
                head
            );
            return Err(Error::StaleHead {
                category: category.clone(),
                expected,
                actual: Some(head),
            });
        }
    }

    conn.execute(
        "DELETE FROM student_queue WHERE student_id = ?1 AND category = ?2 AND position = ?3",
        params![student_id, category, position],
    )?;
    if !was_correct {
        conn.execute(
            "INSERT OR IGNORE INTO missed_questions (student_id, question_id, missed_at)
             VALUES (?1, ?2, ?3)",
            params![student_id, head, now_timestamp()],
        )?;
    }

    log::debug!(
        "student {} advanced {} past question {} (correct: {})",
        student_id,
        category,
        head,
        was_correct
    );
    Ok(head)
}

/// Remove the head of the queue, recording it as missed when `was_correct` is false
pub fn advance(conn: &Connection, student_id: i64, category: &Category, was_correct: bool) -> Result<i64> {
    let tx = immediate_transaction(conn)?;
    let head = advance_in(&tx, student_id, category, None, was_correct)?;
    tx.commit()?;
    Ok(head)
}

/// Compare-and-swap form of [`advance`]: fails with `StaleHead` unless
/// `expected_head` is still at the front of the queue.
pub fn advance_if_head(
    conn: &Connection,
    student_id: i64,
    category: &Category,
    expected_head: i64,
    was_correct: bool,
) -> Result<i64> {
    let tx = immediate_transaction(conn)?;
    let head = advance_in(&tx, student_id, category, Some(expected_head), was_correct)?;
    tx.commit()?;
    Ok(head)
}

/// Missed questions in the order they were first missed.
///
/// Ids whose question has since been deleted are skipped.
pub fn list_missed(conn: &Connection, student_id: i64) -> Result<Vec<Question>> {
    ensure_student(conn, student_id)?;
    let mut questions = Vec::new();
    for question_id in missed_ids(conn, student_id)? {
        match get_question_by_id(conn, question_id)? {
            Some(q) => questions.push(q),
            None => log::debug!(
                "skipping missed question {} for student {}: no longer in catalog",
                question_id,
                student_id
            ),
        }
    }
    Ok(questions)
}

/// Explicitly clear one missed question, or the whole missed set when
/// `question_id` is `None`. Answering correctly during review does not do this.
pub fn clear_missed(conn: &Connection, student_id: i64, question_id: Option<i64>) -> Result<usize> {
    ensure_student(conn, student_id)?;
    let cleared = match question_id {
        Some(id) => conn.execute(
            "DELETE FROM missed_questions WHERE student_id = ?1 AND question_id = ?2",
            params![student_id, id],
        )?,
        None => conn.execute(
            "DELETE FROM missed_questions WHERE student_id = ?1",
            params![student_id],
        )?,
    };
    Ok(cleared)
}

/// Append catalog questions this student has never had queued.
pub fn reseed_student(conn: &Connection, student_id: i64) -> Result<usize> {
    let tx = immediate_transaction(conn)?;
    let added = reseed_in(&tx, student_id)?;
    tx.commit()?;
    Ok(added)
}

fn reseed_in(conn: &Connection, student_id: i64) -> Result<usize> {
    let catalog = get_questions(conn, None)?;
    let mut assignment = load_assignment(conn, student_id)?;

    let mut stmt =
        conn.prepare("SELECT question_id FROM assigned_questions WHERE student_id = ?1")?;
    let assigned = stmt
        .query_map(params![student_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let before: BTreeMap<Category, usize> = assignment
        .current_questions
        .iter()
        .map(|(category, queue)| (category.clone(), queue.len()))
        .collect();

    let added = assignment.reseed(&catalog, &assigned);
    if added == 0 {
        return Ok(0);
    }

    for (category, queue) in &assignment.current_questions {
        let old_len = match before.get(category) {
            Some(&len) => len,
            None => {
                add_category(conn, student_id, category)?;
                0
            }
        };
        for &question_id in queue.iter().skip(old_len) {
            append_to_queue(conn, student_id, category, question_id)?;
        }
    }

    log::info!("reseeded student {} with {} new questions", student_id, added);
    Ok(added)
}

pub(crate) fn student_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM students ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Re-seed every student after new content is uploaded. Returns the total
/// number of queue entries appended.
pub fn reseed_all_students(conn: &Connection) -> Result<usize> {
    let mut total = 0;
    for id in student_ids(conn)? {
        total += reseed_student(conn, id)?;
    }
    Ok(total)
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;
    use crate::db::open_database;

    #[pyfunction]
    #[pyo3(name = "register_student", signature = (db_path, username, name, school_id=None, year=None, past_sat_score=None))]
    pub fn py_register_student(
        db_path: &str,
        username: &str,
        name: &str,
        school_id: Option<i64>,
        year: Option<i64>,
        past_sat_score: Option<i64>,
    ) -> PyResult<i64> {
        let conn = open_database(db_path)?;
        let student = NewStudent {
            username: username.to_string(),
            name: name.to_string(),
            school_id,
            year,
            past_sat_score,
        };
        Ok(register_student(&conn, &student)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_student")]
    pub fn py_get_student(db_path: &str, student_id: i64) -> PyResult<Option<Student>> {
        let conn = open_database(db_path)?;
        Ok(get_student(&conn, student_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_student_by_username")]
    pub fn py_get_student_by_username(db_path: &str, username: &str) -> PyResult<Option<Student>> {
        let conn = open_database(db_path)?;
        Ok(get_student_by_username(&conn, username)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_students")]
    pub fn py_get_students(db_path: &str) -> PyResult<Vec<Student>> {
        let conn = open_database(db_path)?;
        Ok(get_students(&conn)?)
    }

    #[pyfunction]
    #[pyo3(name = "record_login")]
    pub fn py_record_login(db_path: &str, student_id: i64) -> PyResult<()> {
        let conn = open_database(db_path)?;
        Ok(record_login(&conn, student_id, now_timestamp())?)
    }

    #[pyfunction]
    #[pyo3(name = "delete_student")]
    pub fn py_delete_student(db_path: &str, student_id: i64) -> PyResult<bool> {
        let conn = open_database(db_path)?;
        Ok(delete_student(&conn, student_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "add_school")]
    pub fn py_add_school(db_path: &str, name: &str) -> PyResult<i64> {
        let conn = open_database(db_path)?;
        Ok(add_school(&conn, name)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_schools")]
    pub fn py_get_schools(db_path: &str) -> PyResult<Vec<School>> {
        let conn = open_database(db_path)?;
        Ok(get_schools(&conn)?)
    }

    #[pyfunction]
    #[pyo3(name = "clear_missed", signature = (db_path, student_id, question_id=None))]
    pub fn py_clear_missed(db_path: &str, student_id: i64, question_id: Option<i64>) -> PyResult<usize> {
        let conn = open_database(db_path)?;
        Ok(clear_missed(&conn, student_id, question_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "reseed_all_students")]
    pub fn py_reseed_all_students(db_path: &str) -> PyResult<usize> {
        let conn = open_database(db_path)?;
        Ok(reseed_all_students(&conn)?)
    }
}
