//! Per-student question rotation.
//!
//! An [`Assignment`] holds one ordered queue of question ids per category and
//! the set of ids the student has answered incorrectly. It is built from a
//! catalog snapshot at registration and only ever shrinks afterwards: the head
//! of a queue is removed once it has been attempted, and a wrong answer also
//! records the id as missed.
//!
//! This module is storage-free. `crate::student` applies the same rules to
//! the persisted rows inside a single transaction per answer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::category::Category;
use crate::db::Question;
use crate::error::{Error, Result};

/// What a student should see next in a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestion<T> {
    Question(T),
    /// Every question in the category has been attempted.
    Complete,
}

impl<T> NextQuestion<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, NextQuestion::Complete)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NextQuestion<U> {
        match self {
            NextQuestion::Question(q) => NextQuestion::Question(f(q)),
            NextQuestion::Complete => NextQuestion::Complete,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub current_questions: BTreeMap<Category, VecDeque<i64>>,
    /// Ids answered incorrectly at least once, in first-miss order, no duplicates.
    pub missed_questions: Vec<i64>,
}

impl Assignment {
    /// Build the queues for a new student from a catalog snapshot.
    ///
    /// One queue per distinct category in the snapshot, ids in catalog order.
    pub fn initialize(catalog: &[Question]) -> Self {
        let mut current_questions: BTreeMap<Category, VecDeque<i64>> = BTreeMap::new();
        for question in catalog {
            current_questions
                .entry(question.category.clone())
                .or_default()
                .push_back(question.id);
        }

        Self {
            current_questions,
            missed_questions: Vec::new(),
        }
    }

    fn queue(&self, category: &Category) -> Result<&VecDeque<i64>> {
        self.current_questions
            .get(category)
            .ok_or_else(|| Error::UnknownCategory(category.clone()))
    }

    /// Head of the category queue, without removing it.
    pub fn next_question(&self, category: &Category) -> Result<NextQuestion<i64>> {
        Ok(match self.queue(category)?.front() {
            Some(&id) => NextQuestion::Question(id),
            None => NextQuestion::Complete,
        })
    }

    /// Remove the head of the category queue, recording it as missed when the
    /// answer was wrong. Returns the removed id.
    pub fn advance(&mut self, category: &Category, was_correct: bool) -> Result<i64> {
        let queue = self
            .current_questions
            .get_mut(category)
            .ok_or_else(|| Error::UnknownCategory(category.clone()))?;
        let head = queue
            .pop_front()
            .ok_or_else(|| Error::EmptyQueue(category.clone()))?;

        if !was_correct {
            self.record_missed(head);
        }
        Ok(head)
    }

    /// Like [`Assignment::advance`], but only when `expected_head` is still at
    /// the front of the queue. Nothing changes otherwise.
    pub fn advance_if_head(
        &mut self,
        category: &Category,
        expected_head: i64,
        was_correct: bool,
    ) -> Result<i64> {
        let actual = self.queue(category)?.front().copied();
        match actual {
            None => Err(Error::EmptyQueue(category.clone())),
            Some(head) if head != expected_head => Err(Error::StaleHead {
                category: category.clone(),
                expected: expected_head,
                actual,
            }),
            Some(_) => self.advance(category, was_correct),
        }
    }

    /// Insert into the missed set. Returns `false` if the id was already there.
    pub fn record_missed(&mut self, question_id: i64) -> bool {
        if self.missed_questions.contains(&question_id) {
            return false;
        }
        self.missed_questions.push(question_id);
        true
    }

    /// Resolve missed ids against the catalog, skipping ids that no longer exist.
    pub fn list_missed<'a>(&self, catalog: &'a [Question]) -> Vec<&'a Question> {
        self.missed_questions
            .iter()
            .filter_map(|id| catalog.iter().find(|q| q.id == *id))
            .collect()
    }

    /// Append catalog questions that were never queued for this student.
    ///
    /// `already_assigned` is every id this student has ever had queued.
    /// Returns the number of ids appended.
    pub fn reseed(&mut self, catalog: &[Question], already_assigned: &[i64]) -> usize {
        let mut added = 0;
        for question in catalog {
            if already_assigned.contains(&question.id) {
                continue;
            }
            let queue = self
                .current_questions
                .entry(question.category.clone())
                .or_default();
            if !queue.contains(&question.id) {
                queue.push_back(question.id);
                added += 1;
            }
        }
        added
    }

    pub fn remaining(&self, category: &Category) -> usize {
        self.current_questions.get(category).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn q(id: i64, category: Category, answer: &str) -> Question {
        Question {
            id,
            category,
            prompt: format!("question {}", id),
            choices: Vec::new(),
            answer: answer.to_string(),
            image: None,
        }
    }

    fn mixed_catalog() -> Vec<Question> {
        vec![
            q(1, Category::WordProblem, "4"),
            q(2, Category::Geometry, "90"),
            q(3, Category::WordProblem, "9"),
            q(4, Category::from_tag("trigonometry"), "1"),
            q(5, Category::Geometry, "180"),
        ]
    }

    #[test]
    fn initialize_partitions_by_category_in_catalog_order() {
        let a = Assignment::initialize(&mixed_catalog());

        assert_eq!(a.current_questions.len(), 3);
        assert_eq!(a.current_questions[&Category::WordProblem], VecDeque::from(vec![1, 3]));
        assert_eq!(a.current_questions[&Category::Geometry], VecDeque::from(vec![2, 5]));
        assert_eq!(
            a.current_questions[&Category::from_tag("trigonometry")],
            VecDeque::from(vec![4])
        );
        assert!(a.missed_questions.is_empty());

        let mut seen = HashSet::new();
        for ids in a.current_questions.values() {
            for id in ids {
                assert!(seen.insert(*id), "id {} queued twice", id);
            }
        }
    }

    #[test]
    fn empty_catalog_gives_empty_map() {
        let a = Assignment::initialize(&[]);
        assert!(a.current_questions.is_empty());
        assert!(matches!(
            a.next_question(&Category::WordProblem),
            Err(Error::UnknownCategory(_))
        ));
    }

    #[test]
    fn next_question_does_not_consume() {
        let a = Assignment::initialize(&mixed_catalog());
        assert_eq!(a.next_question(&Category::Geometry).unwrap(), NextQuestion::Question(2));
        assert_eq!(a.next_question(&Category::Geometry).unwrap(), NextQuestion::Question(2));
    }

    #[test]
    fn queue_only_shrinks_and_never_repeats() {
        let mut a = Assignment::initialize(&mixed_catalog());
        let mut removed = Vec::new();
        let mut last_len = a.remaining(&Category::Geometry);

        while let NextQuestion::Question(id) = a.next_question(&Category::Geometry).unwrap() {
            assert!(!removed.contains(&id));
            removed.push(a.advance(&Category::Geometry, removed.len() % 2 == 0).unwrap());
            let len = a.remaining(&Category::Geometry);
            assert!(len < last_len);
            last_len = len;
        }

        assert_eq!(removed, vec![2, 5]);
    }

    #[test]
    fn complete_is_terminal() {
        let mut a = Assignment::initialize(&[q(7, Category::Quadratic, "3")]);
        a.advance(&Category::Quadratic, true).unwrap();
        for _ in 0..3 {
            assert!(a.next_question(&Category::Quadratic).unwrap().is_complete());
        }
    }

    #[test]
    fn advance_on_empty_queue_fails_without_changes() {
        let mut a = Assignment::initialize(&[q(7, Category::Quadratic, "3")]);
        a.advance(&Category::Quadratic, false).unwrap();
        let before = a.clone();

        let err = a.advance(&Category::Quadratic, false).unwrap_err();
        assert!(matches!(err, Error::EmptyQueue(Category::Quadratic)));
        assert_eq!(a, before);
    }

    #[test]
    fn advance_unknown_category_fails() {
        let mut a = Assignment::initialize(&mixed_catalog());
        let err = a.advance(&Category::Inequality, true).unwrap_err();
        assert!(matches!(err, Error::UnknownCategory(Category::Inequality)));
    }

    #[test]
    fn missed_set_has_no_duplicates() {
        let mut a = Assignment::initialize(&mixed_catalog());
        a.advance(&Category::WordProblem, false).unwrap();
        assert!(!a.record_missed(1));
        a.advance(&Category::WordProblem, false).unwrap();
        assert!(!a.record_missed(3));
        assert_eq!(a.missed_questions, vec![1, 3]);
    }

    #[test]
    fn correct_answers_are_not_missed() {
        let mut a = Assignment::initialize(&mixed_catalog());
        a.advance(&Category::WordProblem, true).unwrap();
        assert!(a.missed_questions.is_empty());
    }

    #[test]
    fn advance_if_head_rejects_stale_answers() {
        let mut a = Assignment::initialize(&mixed_catalog());
        a.advance_if_head(&Category::WordProblem, 1, false).unwrap();
        let before = a.clone();

        let err = a.advance_if_head(&Category::WordProblem, 1, false).unwrap_err();
        assert!(matches!(
            err,
            Error::StaleHead { expected: 1, actual: Some(3), .. }
        ));
        assert_eq!(a, before);
    }

    #[test]
    fn list_missed_skips_deleted_questions() {
        let catalog = mixed_catalog();
        let mut a = Assignment::initialize(&catalog);
        a.advance(&Category::WordProblem, false).unwrap();
        a.advance(&Category::Geometry, false).unwrap();

        let remaining: Vec<Question> = catalog.into_iter().filter(|q| q.id != 1).collect();
        let missed: Vec<i64> = a.list_missed(&remaining).iter().map(|q| q.id).collect();
        assert_eq!(missed, vec![2]);
    }

    #[test]
    fn reseed_appends_only_new_questions() {
        let mut catalog = vec![q(1, Category::WordProblem, "4"), q(2, Category::WordProblem, "9")];
        let mut a = Assignment::initialize(&catalog);
        a.advance(&Category::WordProblem, true).unwrap();

        catalog.push(q(3, Category::WordProblem, "1"));
        catalog.push(q(4, Category::DataAnalysis, "12"));
        let added = a.reseed(&catalog, &[1, 2]);

        assert_eq!(added, 2);
        assert_eq!(a.current_questions[&Category::WordProblem], VecDeque::from(vec![2, 3]));
        assert_eq!(a.current_questions[&Category::DataAnalysis], VecDeque::from(vec![4]));
        assert_eq!(a.reseed(&catalog, &[1, 2, 3, 4]), 0);
    }

    #[test]
    fn walkthrough_two_word_problems() {
        let catalog = vec![q(1, Category::WordProblem, "4"), q(2, Category::WordProblem, "9")];
        let mut a = Assignment::initialize(&catalog);
        let cat = Category::WordProblem;

        assert_eq!(a.current_questions[&cat], VecDeque::from(vec![1, 2]));
        assert_eq!(a.next_question(&cat).unwrap(), NextQuestion::Question(1));

        a.advance(&cat, "5" == catalog[0].answer).unwrap();
        assert_eq!(a.current_questions[&cat], VecDeque::from(vec![2]));
        assert_eq!(a.missed_questions, vec![1]);
        assert_eq!(a.next_question(&cat).unwrap(), NextQuestion::Question(2));

        a.advance(&cat, "9" == catalog[1].answer).unwrap();
        assert!(a.current_questions[&cat].is_empty());
        assert_eq!(a.missed_questions, vec![1]);
        assert!(a.next_question(&cat).unwrap().is_complete());

        let missed: Vec<i64> = a.list_missed(&catalog).iter().map(|q| q.id).collect();
        assert_eq!(missed, vec![1]);
    }
}
