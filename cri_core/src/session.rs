//! Practice workflow: show the head of a queue, grade the answer, advance

#[cfg(feature = "python")]
use pyo3::prelude::*;
use rand::seq::SliceRandom;
use rusqlite::Connection;

use crate::assignment::NextQuestion;
use crate::category::Category;
use crate::config::Config;
use crate::db::{get_question_by_id, Question};
use crate::error::{Error, Result};
use crate::progress::record_attempt;
use crate::student::{
    advance_in, ensure_student, immediate_transaction, list_missed, next_question, now_timestamp,
};

/// Question as shown to a student. The canonical answer is not included.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedQuestion {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: i64,
    pub category: Category,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub prompt: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub choices: Vec<String>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub image: Option<String>,
}

#[cfg(feature = "python")]
#[pymethods]
impl PresentedQuestion {
    #[getter(category)]
    fn py_category(&self) -> String {
        self.category.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PracticeView {
    Question(PresentedQuestion),
    /// The student has attempted every question in the category.
    Complete,
    /// The student's map has no queue for the category.
    NoQuestions,
}

impl PracticeView {
    pub fn status(&self) -> &'static str {
        match self {
            PracticeView::Question(_) => "question",
            PracticeView::Complete => "complete",
            PracticeView::NoQuestions => "no_questions",
        }
    }
}

/// Result of grading a submitted answer
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub question_id: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub is_correct: bool,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub user_answer: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub expected_answer: String,
}

#[cfg(feature = "python")]
#[pymethods]
impl AnswerOutcome {
    fn __repr__(&self) -> String {
        format!(
            "AnswerOutcome(question_id={}, is_correct={})",
            self.question_id, self.is_correct
        )
    }
}

/// Exact comparison against the canonical answer. Any trimming or case
/// folding is left to the form layer.
pub fn grade(question: &Question, answer: &str) -> bool {
    answer == question.answer
}

pub fn present(question: Question, shuffle_choices: bool) -> PresentedQuestion {
    let mut choices = question.choices;
    if shuffle_choices {
        choices.shuffle(&mut rand::thread_rng());
    }
    PresentedQuestion {
        id: question.id,
        category: question.category,
        prompt: question.prompt,
        choices,
        image: question.image,
    }
}

/// What to render on the practice page for `category`
pub fn practice_next(
    conn: &Connection,
    config: &Config,
    student_id: i64,
    category: &Category,
) -> Result<PracticeView> {
    match next_question(conn, student_id, category) {
        Ok(NextQuestion::Question(q)) => Ok(PracticeView::Question(present(q, config.shuffle_choices))),
        Ok(NextQuestion::Complete) => Ok(PracticeView::Complete),
        Err(Error::UnknownCategory(_)) => {
            log::warn!(
                "student {} has no queue for category {}",
                student_id,
                category
            );
            Ok(PracticeView::NoQuestions)
        }
        Err(e) => Err(e),
    }
}

/// Grade an answer to the question at the head of the queue and advance.
///
/// Grading, the queue pop, the missed-set insert and the attempt log are
/// committed together; on error nothing has been recorded.
pub fn submit_answer(
    conn: &Connection,
    student_id: i64,
    category: &Category,
    question_id: i64,
    answer: &str,
) -> Result<AnswerOutcome> {
    let tx = immediate_transaction(conn)?;
    let question =
        get_question_by_id(&tx, question_id)?.ok_or(Error::QuestionNotFound(question_id))?;

    let is_correct = grade(&question, answer);
    advance_in(&tx, student_id, category, Some(question_id), is_correct)?;
    record_attempt(&tx, student_id, &question, answer, is_correct, now_timestamp())?;
    tx.commit()?;

    log::info!(
        "student {} answered question {} ({}): {}",
        student_id,
        question_id,
        category,
        if is_correct { "correct" } else { "incorrect" }
    );

    Ok(AnswerOutcome {
        question_id,
        is_correct,
        user_answer: answer.to_string(),
        expected_answer: question.answer,
    })
}

/// Questions to show on the review page
pub fn review_missed(conn: &Connection, student_id: i64) -> Result<Vec<Question>> {
    list_missed(conn, student_id)
}

/// Grade an answer given on the review page.
///
/// The attempt is logged but queues are untouched, and a correct answer does
/// not remove the question from the missed set.
pub fn review_answer(
    conn: &Connection,
    student_id: i64,
    question_id: i64,
    answer: &str,
) -> Result<AnswerOutcome> {
    ensure_student(conn, student_id)?;
    let question =
        get_question_by_id(conn, question_id)?.ok_or(Error::QuestionNotFound(question_id))?;
    let is_correct = grade(&question, answer);
    record_attempt(conn, student_id, &question, answer, is_correct, now_timestamp())?;

    Ok(AnswerOutcome {
        question_id,
        is_correct,
        user_answer: answer.to_string(),
        expected_answer: question.answer,
    })
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;
    use crate::db::open_database;

    /// Returns `(status, question)`; `question` is set only when status is "question".
    #[pyfunction]
    #[pyo3(name = "practice_next", signature = (db_path, student_id, category, shuffle_choices=false))]
    pub fn py_practice_next(
        db_path: &str,
        student_id: i64,
        category: &str,
        shuffle_choices: bool,
    ) -> PyResult<(String, Option<PresentedQuestion>)> {
        let conn = open_database(db_path)?;
        let config = Config {
            database_path: db_path.into(),
            shuffle_choices,
            ..Config::default()
        };
        let view = practice_next(&conn, &config, student_id, &Category::from_tag(category))?;
        let status = view.status().to_string();
        Ok(match view {
            PracticeView::Question(q) => (status, Some(q)),
            _ => (status, None),
        })
    }

    #[pyfunction]
    #[pyo3(name = "submit_answer")]
    pub fn py_submit_answer(
        db_path: &str,
        student_id: i64,
        category: &str,
        question_id: i64,
        answer: &str,
    ) -> PyResult<AnswerOutcome> {
        let conn = open_database(db_path)?;
        Ok(submit_answer(
            &conn,
            student_id,
            &Category::from_tag(category),
            question_id,
            answer,
        )?)
    }

    #[pyfunction]
    #[pyo3(name = "review_missed")]
    pub fn py_review_missed(db_path: &str, student_id: i64) -> PyResult<Vec<Question>> {
        let conn = open_database(db_path)?;
        Ok(review_missed(&conn, student_id)?)
    }

    #[pyfunction]
    #[pyo3(name = "review_answer")]
    pub fn py_review_answer(
        db_path: &str,
        student_id: i64,
        question_id: i64,
        answer: &str,
    ) -> PyResult<AnswerOutcome> {
        let conn = open_database(db_path)?;
        Ok(review_answer(&conn, student_id, question_id, answer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{question, setup_db};
    use crate::db::{add_question, load_questions};
    use crate::student::{load_assignment, register_student, NewStudent};

    fn setup_student(conn: &Connection) -> (i64, Vec<i64>) {
        let ids = load_questions(
            conn,
            &[
                question(Category::WordProblem, "2 + 2", "4"),
                question(Category::WordProblem, "3 * 3", "9"),
            ],
        )
        .unwrap();
        let sid = register_student(
            conn,
            &NewStudent {
                username: "ada".to_string(),
                name: "Ada".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        (sid, ids)
    }

    #[test]
    fn grading_is_exact() {
        let q = question(Category::WordProblem, "2 + 2", "4");
        assert!(grade(&q, "4"));
        assert!(!grade(&q, " 4"));
        assert!(!grade(&q, "four"));
    }

    #[test]
    fn presentation_hides_nothing_but_the_answer() {
        let conn = setup_db();
        let choices: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let id = add_question(&conn, &Category::Geometry, "Pick one", &choices, "C", Some("fig.png")).unwrap();
        let q = get_question_by_id(&conn, id).unwrap().unwrap();

        let shown = present(q.clone(), false);
        assert_eq!(shown.choices, choices);
        assert_eq!(shown.image.as_deref(), Some("fig.png"));

        let mut shuffled = present(q, true).choices;
        shuffled.sort();
        assert_eq!(shuffled, choices);
    }

    #[test]
    fn unknown_category_renders_no_questions() {
        let conn = setup_db();
        let (sid, _) = setup_student(&conn);
        let view = practice_next(&conn, &Config::default(), sid, &Category::Geometry).unwrap();
        assert_eq!(view, PracticeView::NoQuestions);
        assert_eq!(view.status(), "no_questions");
    }

    #[test]
    fn unknown_student_is_an_error() {
        let conn = setup_db();
        let err = practice_next(&conn, &Config::default(), 5, &Category::Geometry).unwrap_err();
        assert!(matches!(err, Error::StudentNotFound(5)));
    }

    #[test]
    fn submit_advances_and_logs_attempt() {
        let conn = setup_db();
        let (sid, ids) = setup_student(&conn);

        let outcome = submit_answer(&conn, sid, &Category::WordProblem, ids[0], "5").unwrap();
        assert!(!outcome.is_correct);
        assert_eq!(outcome.expected_answer, "4");

        let attempts: i64 = conn
            .query_row("SELECT COUNT(*) FROM attempts WHERE student_id = ?1", [sid], |row| row.get(0))
            .unwrap();
        assert_eq!(attempts, 1);

        match practice_next(&conn, &Config::default(), sid, &Category::WordProblem).unwrap() {
            PracticeView::Question(q) => assert_eq!(q.id, ids[1]),
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[test]
    fn double_submit_is_rejected_and_not_logged() {
        let conn = setup_db();
        let (sid, ids) = setup_student(&conn);

        submit_answer(&conn, sid, &Category::WordProblem, ids[0], "4").unwrap();
        let err = submit_answer(&conn, sid, &Category::WordProblem, ids[0], "4").unwrap_err();
        assert!(err.is_precondition());

        let attempts: i64 = conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(load_assignment(&conn, sid).unwrap().remaining(&Category::WordProblem), 1);
    }

    #[test]
    fn review_does_not_prune_missed() {
        let conn = setup_db();
        let (sid, ids) = setup_student(&conn);
        submit_answer(&conn, sid, &Category::WordProblem, ids[0], "5").unwrap();

        let outcome = review_answer(&conn, sid, ids[0], "4").unwrap();
        assert!(outcome.is_correct);

        let missed: Vec<i64> = review_missed(&conn, sid).unwrap().iter().map(|q| q.id).collect();
        assert_eq!(missed, vec![ids[0]]);
    }

    #[test]
    fn review_answer_for_unknown_student() {
        let conn = setup_db();
        let (_, ids) = setup_student(&conn);

        let err = review_answer(&conn, 99, ids[0], "4").unwrap_err();
        assert!(matches!(err, Error::StudentNotFound(99)));
        assert!(err.is_not_found());

        let attempts: i64 = conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(attempts, 0);
    }
}
