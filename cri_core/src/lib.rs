//! CRI Core - practice question rotation and review for the College Readiness Initiative
//!
//! Keeps, for every student, one ordered queue of unanswered questions per
//! category and the set of questions they got wrong. Backed by SQLite; the
//! web front end calls these functions directly or, with the `python`
//! feature, through the `cri_core` Python module.

pub mod analytics;
pub mod assignment;
pub mod category;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod progress;
pub mod session;
pub mod staff;
pub mod student;

pub use analytics::{activity_report, ActivityReport};
pub use assignment::{Assignment, NextQuestion};
pub use category::{Category, UnrecognizedTag};
pub use config::Config;
pub use db::{
    add_question, delete_question, get_categories, get_question_by_id, get_questions,
    init_database, load_questions, open_database, open_with_config, CategoryInfo, Question,
};
pub use error::{Error, Result};
pub use import::{parse_file, ImportSummary};
pub use progress::{get_category_progress, get_most_missed, get_stats, AttemptStats, CategoryProgress};
pub use session::{
    grade, practice_next, review_answer, review_missed, submit_answer, AnswerOutcome,
    PracticeView, PresentedQuestion,
};
pub use staff::{
    delete_tutor, get_admin_by_username, get_admins, get_tutor, get_tutor_by_username, get_tutors,
    get_user_directory, register_admin, register_tutor, remove_admin, Admin, Tutor, UserDirectory,
};
pub use student::{
    add_school, advance, advance_if_head, clear_missed, delete_student, get_schools, get_student,
    get_student_by_username, get_students, list_missed, load_assignment, next_question,
    record_login, register_student, reseed_all_students, reseed_student, NewStudent, School,
    Student,
};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// CRI Core Python Module
#[cfg(feature = "python")]
#[pymodule]
fn cri_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Catalog
    m.add_function(wrap_pyfunction!(db::py::py_init_database, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_init_from_config, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_get_questions, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_get_question_by_id, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_add_question, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_get_categories, m)?)?;
    m.add_function(wrap_pyfunction!(db::py::py_delete_question, m)?)?;

    // Question upload (CSV and Excel)
    m.add_function(wrap_pyfunction!(import::py::py_upload_questions, m)?)?;

    // Students and schools
    m.add_function(wrap_pyfunction!(student::py::py_register_student, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_get_student, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_get_student_by_username, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_get_students, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_record_login, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_delete_student, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_add_school, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_get_schools, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_clear_missed, m)?)?;
    m.add_function(wrap_pyfunction!(student::py::py_reseed_all_students, m)?)?;

    // Tutors, admins and the user directory
    m.add_function(wrap_pyfunction!(staff::py::py_register_tutor, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_get_tutor, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_get_tutors, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_register_admin, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_get_admins, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_remove_admin, m)?)?;
    m.add_function(wrap_pyfunction!(staff::py::py_get_user_directory, m)?)?;

    // Practice and review
    m.add_function(wrap_pyfunction!(session::py::py_practice_next, m)?)?;
    m.add_function(wrap_pyfunction!(session::py::py_submit_answer, m)?)?;
    m.add_function(wrap_pyfunction!(session::py::py_review_missed, m)?)?;
    m.add_function(wrap_pyfunction!(session::py::py_review_answer, m)?)?;

    // Progress and analytics
    m.add_function(wrap_pyfunction!(progress::py::py_get_stats, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py::py_get_category_progress, m)?)?;
    m.add_function(wrap_pyfunction!(progress::py::py_get_most_missed, m)?)?;
    m.add_function(wrap_pyfunction!(analytics::py::py_activity_report, m)?)?;

    // Register classes
    m.add_class::<db::Question>()?;
    m.add_class::<db::CategoryInfo>()?;
    m.add_class::<student::Student>()?;
    m.add_class::<student::School>()?;
    m.add_class::<staff::Tutor>()?;
    m.add_class::<staff::Admin>()?;
    m.add_class::<staff::UserDirectory>()?;
    m.add_class::<session::PresentedQuestion>()?;
    m.add_class::<session::AnswerOutcome>()?;
    m.add_class::<progress::AttemptStats>()?;
    m.add_class::<progress::CategoryProgress>()?;
    m.add_class::<analytics::ActivityReport>()?;
    m.add_class::<import::ImportSummary>()?;

    Ok(())
}
