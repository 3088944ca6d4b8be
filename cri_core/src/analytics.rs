//! Weekly, monthly and yearly activity counts for the admin analytics page

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::{params, Connection};

use crate::error::Result;

#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityReport {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub weekly_sessions: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub monthly_sessions: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub yearly_sessions: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub weekly_students: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub monthly_students: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub yearly_students: i64,
}

/// Start of each reporting window, as unix seconds at midnight UTC:
/// seven days ago, the same day last month, and the same day last year.
///
/// Month arithmetic clamps to the end of a shorter month (Mar 31 -> Feb 28).
pub fn window_starts(now: DateTime<Utc>) -> (i64, i64, i64) {
    let today = now.date_naive();
    let midnight = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
    };

    let week = today.checked_sub_days(Days::new(7)).unwrap_or(today);
    let month = today.checked_sub_months(Months::new(1)).unwrap_or(today);
    let year = today.checked_sub_months(Months::new(12)).unwrap_or(today);

    (midnight(week), midnight(month), midnight(year))
}

/// Sessions and distinct students with a start strictly inside `(from, to)`
pub fn count_sessions(conn: &Connection, from: i64, to: i64) -> Result<(i64, i64)> {
    let counts = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT student_id) FROM sessions
         WHERE started_at > ?1 AND started_at < ?2",
        params![from, to],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

pub fn activity_report(conn: &Connection, now: DateTime<Utc>) -> Result<ActivityReport> {
    let (week, month, year) = window_starts(now);
    let now = now.timestamp();

    let (weekly_sessions, weekly_students) = count_sessions(conn, week, now)?;
    let (monthly_sessions, monthly_students) = count_sessions(conn, month, now)?;
    let (yearly_sessions, yearly_students) = count_sessions(conn, year, now)?;

    Ok(ActivityReport {
        weekly_sessions,
        monthly_sessions,
        yearly_sessions,
        weekly_students,
        monthly_students,
        yearly_students,
    })
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;
    use crate::db::open_database;

    #[pyfunction]
    #[pyo3(name = "activity_report")]
    pub fn py_activity_report(db_path: &str) -> PyResult<ActivityReport> {
        let conn = open_database(db_path)?;
        Ok(activity_report(&conn, Utc::now())?)
    }
}
