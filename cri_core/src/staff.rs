//! Tutor and admin profiles and the user directory

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::{Error, Result};
use crate::student::{get_students, now_timestamp, Student};

#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct Tutor {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub username: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub name: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub created_at: i64,
}

#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct Admin {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub username: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub created_at: i64,
}

/// Everyone listed on the user directory page
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserDirectory {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub students: Vec<Student>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub tutors: Vec<Tutor>,
}

/// Map a UNIQUE violation on `username` to `DuplicateUsername`
fn insert_user(conn: &Connection, sql: &str, username: &str, params: &[&dyn rusqlite::ToSql]) -> Result<i64> {
    match conn.execute(sql, params) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(Error::DuplicateUsername(username.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

// ============= Tutors =============

pub fn register_tutor(conn: &Connection, username: &str, name: &str) -> Result<i64> {
    let id = insert_user(
        conn,
        "INSERT INTO tutors (username, name, created_at) VALUES (?1, ?2, ?3)",
        username,
        params![username, name, now_timestamp()],
    )?;
    log::info!("registered tutor {} ({})", id, username);
    Ok(id)
}

fn tutor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tutor> {
    Ok(Tutor {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn get_tutor(conn: &Connection, tutor_id: i64) -> Result<Option<Tutor>> {
    let tutor = conn
        .query_row(
            "SELECT id, username, name, created_at FROM tutors WHERE id = ?1",
            params![tutor_id],
            tutor_from_row,
        )
        .optional()?;
    Ok(tutor)
}

pub fn get_tutor_by_username(conn: &Connection, username: &str) -> Result<Option<Tutor>> {
    let tutor = conn
        .query_row(
            "SELECT id, username, name, created_at FROM tutors WHERE username = ?1",
            params![username],
            tutor_from_row,
        )
        .optional()?;
    Ok(tutor)
}

pub fn get_tutors(conn: &Connection) -> Result<Vec<Tutor>> {
    let mut stmt = conn.prepare("SELECT id, username, name, created_at FROM tutors ORDER BY name, id")?;
    let rows = stmt.query_map([], tutor_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_tutor(conn: &Connection, tutor_id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM tutors WHERE id = ?1", params![tutor_id])?;
    Ok(deleted > 0)
}

// ============= Admins =============

pub fn register_admin(conn: &Connection, username: &str) -> Result<i64> {
    let id = insert_user(
        conn,
        "INSERT INTO admins (username, created_at) VALUES (?1, ?2)",
        username,
        params![username, now_timestamp()],
    )?;
    log::info!("registered admin {} ({})", id, username);
    Ok(id)
}

fn admin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

pub fn get_admin_by_username(conn: &Connection, username: &str) -> Result<Option<Admin>> {
    let admin = conn
        .query_row(
            "SELECT id, username, created_at FROM admins WHERE username = ?1",
            params![username],
            admin_from_row,
        )
        .optional()?;
    Ok(admin)
}

/// All admins, for the admin dashboard
pub fn get_admins(conn: &Connection) -> Result<Vec<Admin>> {
    let mut stmt = conn.prepare("SELECT id, username, created_at FROM admins ORDER BY username")?;
    let rows = stmt.query_map([], admin_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn remove_admin(conn: &Connection, username: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM admins WHERE username = ?1", params![username])?;
    if deleted > 0 {
        log::info!("removed admin {}", username);
    }
    Ok(deleted > 0)
}

// ============= Directory =============

pub fn get_user_directory(conn: &Connection) -> Result<UserDirectory> {
    Ok(UserDirectory {
        students: get_students(conn)?,
        tutors: get_tutors(conn)?,
    })
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;
    use crate::db::open_database;

    #[pyfunction]
    #[pyo3(name = "register_tutor")]
    pub fn py_register_tutor(db_path: &str, username: &str, name: &str) -> PyResult<i64> {
        let conn = open_database(db_path)?;
        Ok(register_tutor(&conn, username, name)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_tutor")]
    pub fn py_get_tutor(db_path: &str, tutor_id: i64) -> PyResult<Option<Tutor>> {
        let conn = open_database(db_path)?;
        Ok(get_tutor(&conn, tutor_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_tutors")]
    pub fn py_get_tutors(db_path: &str) -> PyResult<Vec<Tutor>> {
        let conn = open_database(db_path)?;
        Ok(get_tutors(&conn)?)
    }

    #[pyfunction]
    #[pyo3(name = "register_admin")]
    pub fn py_register_admin(db_path: &str, username: &str) -> PyResult<i64> {
        let conn = open_database(db_path)?;
        Ok(register_admin(&conn, username)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_admins")]
    pub fn py_get_admins(db_path: &str) -> PyResult<Vec<Admin>> {
        let conn = open_database(db_path)?;
        Ok(get_admins(&conn)?)
    }

    #[pyfunction]
    #[pyo3(name = "remove_admin")]
    pub fn py_remove_admin(db_path: &str, username: &str) -> PyResult<bool> {
        let conn = open_database(db_path)?;
        Ok(remove_admin(&conn, username)?)
    }

    #[pyfunction]
    #[pyo3(name = "get_user_directory")]
    pub fn py_get_user_directory(db_path: &str) -> PyResult<UserDirectory> {
        let conn = open_database(db_path)?;
        Ok(get_user_directory(&conn)?)
    }
}
