// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grading engine: holds one exam session's master key and scores student
// answer vectors against it.

use std::sync::Arc;

use bubblescan_core::error::{Result, ScanError};
use bubblescan_core::types::{
    checked_max_score, AnswerVector, GradingResult, MasterKey, WrongAnswer,
};
use chrono::Utc;
use tracing::{debug, info, instrument};

/// One exam session's grading state.
///
/// Created at setup and dropped at session end. Mutation needs `&mut self`
/// and grading only `&self`, so a session shared between tasks can sit
/// behind a `RwLock`. Each grade works from an `Arc` snapshot of the key, so
/// replacing the key never alters a result already produced.
#[derive(Debug, Clone, Default)]
pub struct GradingEngine {
    master_key: Option<Arc<MasterKey>>,
}

impl GradingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Master key -----------------------------------------------------------

    /// Store a key worth one point per question, replacing any previous key.
    pub fn set_master_key(&mut self, answers: AnswerVector) -> Result<Arc<MasterKey>> {
        Ok(self.install(MasterKey::new(answers)?))
    }

    /// Store a key with a custom point value per question. A rejected key
    /// leaves the previous one in place.
    pub fn set_master_key_with_points(
        &mut self,
        answers: AnswerVector,
        points_per_question: u32,
    ) -> Result<Arc<MasterKey>> {
        Ok(self.install(MasterKey::with_points(answers, points_per_question)?))
    }

    fn install(&mut self, key: MasterKey) -> Arc<MasterKey> {
        info!(
            questions = key.total_questions(),
            points_per_question = key.points_per_question,
            "Master key set"
        );
        let key = Arc::new(key);
        self.master_key = Some(Arc::clone(&key));
        key
    }

    pub fn master_key(&self) -> Option<Arc<MasterKey>> {
        self.master_key.clone()
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn clear_master_key(&mut self) {
        if self.master_key.take().is_some() {
            info!("Master key cleared");
        }
    }

    /// `"Set (N questions)"` or `"Not set"`.
    pub fn status_text(&self) -> String {
        match &self.master_key {
            Some(key) => format!("Set ({} questions)", key.total_questions()),
            None => "Not set".to_string(),
        }
    }

    // -- Grading --------------------------------------------------------------

    /// Score `student` against the current key.
    ///
    /// Fails with [`ScanError::MasterKeyNotSet`] when no key is stored and
    /// [`ScanError::AnswerCountMismatch`] when the lengths differ. Neither is
    /// retried.
    #[instrument(skip(self, student), fields(questions = student.len()))]
    pub fn grade(&self, student: &AnswerVector) -> Result<GradingResult> {
        let key = self.master_key.as_ref().ok_or(ScanError::MasterKeyNotSet)?;
        compare(key, student)
    }
}

/// Compare a student vector with a key.
///
/// A question scores when both answers are the same marked option. Any
/// difference, including a blank against a keyed answer or a mark against a
/// blank key entry, is listed as wrong. Matching blanks score nothing and are
/// not wrong.
pub fn compare(key: &MasterKey, student: &AnswerVector) -> Result<GradingResult> {
    if student.len() != key.total_questions() {
        return Err(ScanError::AnswerCountMismatch {
            student: student.len(),
            master: key.total_questions(),
        });
    }

    let max_score = checked_max_score(key.total_questions(), key.points_per_question)?;

    let mut correct = 0u32;
    let mut wrong_answers = Vec::new();
    for (index, (given, expected)) in student.iter().zip(key.answers.iter()).enumerate() {
        if given == expected {
            if given.is_answered() {
                correct += 1;
            }
        } else {
            wrong_answers.push(WrongAnswer {
                question_number: index + 1,
                student_label: given.label(),
                master_label: expected.label(),
            });
        }
    }

    // correct <= total_questions, so this stays within max_score.
    let score = correct * key.points_per_question;
    let result = GradingResult {
        score,
        total_questions: key.total_questions(),
        points_per_question: key.points_per_question,
        valid_answer_count: student.answered_count(),
        wrong_answers,
        graded_at: Utc::now(),
    };
    debug!(
        score = result.score,
        max = max_score,
        wrong = result.wrong_answers.len(),
        "Sheet graded"
    );
    Ok(result)
}

// -- Tests --------------------------------------------------------------------
