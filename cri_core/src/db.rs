//! Database setup and the question catalog

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::category::Category;
use crate::config::Config;
use crate::error::{Error, Result};

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Practice question from the catalog
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    pub category: Category,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub prompt: String,
    /// Multiple-choice options; empty for free-response questions.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub choices: Vec<String>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub answer: String,
    /// Image file shown with the prompt, if any.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub image: Option<String>,
}

impl Question {
    pub fn is_multiple_choice(&self) -> bool {
        !self.choices.is_empty()
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl Question {
    #[getter(category)]
    fn py_category(&self) -> String {
        self.category.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "Question(id={}, category='{}', prompt='{}...')",
            self.id,
            self.category,
            self.prompt.chars().take(40).collect::<String>()
        )
    }
}

/// Category with the number of catalog questions tagged with it
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInfo {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub name: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub question_count: i64,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS schools (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        prompt TEXT NOT NULL,
        choices TEXT NOT NULL DEFAULT '[]',
        answer TEXT NOT NULL,
        image TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        school_id INTEGER REFERENCES schools(id),
        year INTEGER,
        past_sat_score INTEGER,
        last_login INTEGER,
        created_at INTEGER NOT NULL
    );

    -- categories present in a student's question map, so that an empty
    -- queue can be told apart from a category the student never had
    CREATE TABLE IF NOT EXISTS student_categories (
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        PRIMARY KEY (student_id, category)
    );

    CREATE TABLE IF NOT EXISTS student_queue (
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        position INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        PRIMARY KEY (student_id, category, position)
    );

    CREATE TABLE IF NOT EXISTS assigned_questions (
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        question_id INTEGER NOT NULL,
        PRIMARY KEY (student_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS missed_questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        question_id INTEGER NOT NULL,
        missed_at INTEGER NOT NULL,
        UNIQUE (student_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        question_id INTEGER NOT NULL,
        category TEXT NOT NULL,
        is_correct INTEGER NOT NULL,
        user_answer TEXT,
        expected_answer TEXT,
        attempted_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tutors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS admins (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        started_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_questions_category ON questions(category);
    CREATE INDEX IF NOT EXISTS idx_attempts_student ON attempts(student_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
";

/// Open a connection with the pragmas every caller relies on
pub fn open_database(db_path: &str) -> Result<Connection> {
    open_database_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS)
}

pub fn open_database_with_timeout(db_path: &str, busy_timeout_ms: u64) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Open the configured database and make sure the schema exists
pub fn open_with_config(config: &Config) -> Result<Connection> {
    let conn = open_database_with_timeout(config.database_path_str()?, config.busy_timeout_ms)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create all tables if they do not exist yet
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Open the database at `db_path` and make sure the schema exists
pub fn init_database(db_path: &str) -> Result<Connection> {
    let conn = open_database(db_path)?;
    init_schema(&conn)?;
    log::debug!("database ready at {}", db_path);
    Ok(conn)
}

pub(crate) fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    let choices_json: String = row.get(3)?;
    let choices: Vec<String> = serde_json::from_str(&choices_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Question {
        id: row.get(0)?,
        category: row.get(1)?,
        prompt: row.get(2)?,
        choices,
        answer: row.get(4)?,
        image: row.get(5)?,
    })
}

const QUESTION_COLUMNS: &str = "id, category, prompt, choices, answer, image";

/// Add a single question to the catalog, returning its id
pub fn add_question(
    conn: &Connection,
    category: &Category,
    prompt: &str,
    choices: &[String],
    answer: &str,
    image: Option<&str>,
) -> Result<i64> {
    if category.is_empty() {
        return Err(Error::Import(format!("question has an empty category tag: {}", prompt)));
    }
    conn.execute(
        "INSERT INTO questions (category, prompt, choices, answer, image) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![category, prompt, serde_json::to_string(choices)?, answer, image],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a batch of parsed questions in one transaction. Ids on the input are ignored.
pub fn load_questions(conn: &Connection, questions: &[Question]) -> Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(questions.len());
    for q in questions {
        ids.push(add_question(
            &tx,
            &q.category,
            &q.prompt,
            &q.choices,
            &q.answer,
            q.image.as_deref(),
        )?);
    }
    tx.commit()?;
    Ok(ids)
}

/// Catalog snapshot in catalog order, optionally restricted to one category
pub fn get_questions(conn: &Connection, category: Option<&Category>) -> Result<Vec<Question>> {
    let questions = match category {
        Some(cat) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM questions WHERE category = ?1 ORDER BY id",
                QUESTION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![cat], question_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM questions ORDER BY id",
                QUESTION_COLUMNS
            ))?;
            let rows = stmt.query_map([], question_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(questions)
}

/// Get single question by ID
pub fn get_question_by_id(conn: &Connection, question_id: i64) -> Result<Option<Question>> {
    let question = conn
        .query_row(
            &format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS),
            params![question_id],
            question_from_row,
        )
        .optional()?;
    Ok(question)
}

/// Get all categories with question counts
pub fn get_categories(conn: &Connection) -> Result<Vec<CategoryInfo>> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM questions GROUP BY category ORDER BY category",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(CategoryInfo {
            name: row.get(0)?,
            question_count: row.get(1)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete a question from the catalog and from every pending queue.
///
/// Missed-question entries keep pointing at the deleted id; review listings
/// skip ids that no longer resolve.
pub fn delete_question(conn: &Connection, question_id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let dequeued = tx.execute(
        "DELETE FROM student_queue WHERE question_id = ?1",
        params![question_id],
    )?;
    let deleted = tx.execute("DELETE FROM questions WHERE id = ?1", params![question_id])?;
    tx.commit()?;

    if deleted > 0 {
        log::info!(
            "deleted question {} (removed from {} pending queues)",
            question_id,
            dequeued
        );
    }
    Ok(deleted > 0)
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;

    #[pyfunction]
    #[pyo3(name = "init_database")]
    pub fn py_init_database(db_path: &str) -> PyResult<()> {
        init_database(db_path)?;
        Ok(())
    }

    /// Load the config file (or defaults), create the database, and return its path
    #[pyfunction]
    #[pyo3(name = "init_from_config")]
    pub fn py_init_from_config(config_path: &str) -> PyResult<String> {
        let config = Config::from_env_or_file(config_path)?;
        open_with_config(&config)?;
        Ok(config.database_path_str()?.to_string())
    }

    #[pyfunction]
    #[pyo3(name = "get_questions", signature = (db_path, category=None))]
    pub fn py_get_questions(db_path: &str, category: Option<&str>) -> PyResult<Vec<Question>> {
        let conn = open_database(db_path)?;
        let category = category.map(Category::from_tag);
        Ok(get_questions(&conn, category.as_ref())?)
    }

    #[pyfunction]
    #[pyo3(name = "get_question_by_id")]
    pub fn py_get_question_by_id(db_path: &str, question_id: i64) -> PyResult<Option<Question>> {
        let conn = open_database(db_path)?;
        Ok(get_question_by_id(&conn, question_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "add_question", signature = (db_path, category, prompt, answer, choices=None, image=None))]
    pub fn py_add_question(
        db_path: &str,
        category: &str,
        prompt: &str,
        answer: &str,
        choices: Option<Vec<String>>,
        image: Option<&str>,
    ) -> PyResult<i64> {
        let conn = open_database(db_path)?;
        let choices = choices.unwrap_or_default();
        Ok(add_question(
            &conn,
            &Category::from_tag(category),
            prompt,
            &choices,
            answer,
            image,
        )?)
    }

    #[pyfunction]
    #[pyo3(name = "get_categories")]
    pub fn py_get_categories(db_path: &str) -> PyResult<Vec<CategoryInfo>> {
        let conn = open_database(db_path)?;
        Ok(get_categories(&conn)?)
    }

    #[pyfunction]
    #[pyo3(name = "delete_question")]
    pub fn py_delete_question(db_path: &str, question_id: i64) -> PyResult<bool> {
        let conn = open_database(db_path)?;
        Ok(delete_question(&conn, question_id)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory database");
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        init_schema(&conn).expect("schema");
        conn
    }

    pub(crate) fn question(category: Category, prompt: &str, answer: &str) -> Question {
        Question {
            id: 0,
            category,
            prompt: prompt.to_string(),
            choices: Vec::new(),
            answer: answer.to_string(),
            image: None,
        }
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = setup_db();
        init_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn stores_choices_and_image() {
        let conn = setup_db();
        let choices = vec!["2".to_string(), "4".to_string(), "8".to_string()];
        let id = add_question(
            &conn,
            &Category::SolvingEquationExpression,
            "Solve 2x = 8",
            &choices,
            "4",
            Some("eq1.png"),
        )
        .unwrap();

        let q = get_question_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(q.category, Category::SolvingEquationExpression);
        assert_eq!(q.choices, choices);
        assert_eq!(q.image.as_deref(), Some("eq1.png"));
        assert!(q.is_multiple_choice());
    }

    #[test]
    fn open_with_config_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: dir.path().join("practice.db"),
            busy_timeout_ms: 100,
            ..Config::default()
        };
        let conn = open_with_config(&config).unwrap();
        assert!(get_questions(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn missing_question_is_none() {
        let conn = setup_db();
        assert!(get_question_by_id(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn catalog_order_and_category_filter() {
        let conn = setup_db();
        let ids = load_questions(
            &conn,
            &[
                question(Category::WordProblem, "a", "1"),
                question(Category::Geometry, "b", "2"),
                question(Category::WordProblem, "c", "3"),
            ],
        )
        .unwrap();

        let all: Vec<i64> = get_questions(&conn, None).unwrap().iter().map(|q| q.id).collect();
        assert_eq!(all, ids);

        let word: Vec<String> = get_questions(&conn, Some(&Category::WordProblem))
            .unwrap()
            .into_iter()
            .map(|q| q.prompt)
            .collect();
        assert_eq!(word, vec!["a", "c"]);
    }

    #[test]
    fn counts_per_category() {
        let conn = setup_db();
        load_questions(
            &conn,
            &[
                question(Category::WordProblem, "a", "1"),
                question(Category::Geometry, "b", "2"),
                question(Category::WordProblem, "c", "3"),
            ],
        )
        .unwrap();

        let categories = get_categories(&conn).unwrap();
        assert_eq!(
            categories,
            vec![
                CategoryInfo { name: "geometry".to_string(), question_count: 1 },
                CategoryInfo { name: "word_problem".to_string(), question_count: 2 },
            ]
        );
    }

    #[test]
    fn delete_question_reports_whether_it_existed() {
        let conn = setup_db();
        let id = add_question(&conn, &Category::Quadratic, "x^2 = 9", &[], "3", None).unwrap();
        assert!(delete_question(&conn, id).unwrap());
        assert!(!delete_question(&conn, id).unwrap());
        assert!(get_question_by_id(&conn, id).unwrap().is_none());
    }

    #[test]
    fn blank_category_is_rejected() {
        let conn = setup_db();
        let err = add_question(&conn, &Category::from_tag("   "), "No tag", &[], "1", None).unwrap_err();
        assert!(matches!(err, Error::Import(_)));

        let err = load_questions(
            &conn,
            &[
                question(Category::WordProblem, "a", "1"),
                question(Category::from_tag(""), "b", "2"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Import(_)));
        assert!(get_questions(&conn, None).unwrap().is_empty());
    }
}
