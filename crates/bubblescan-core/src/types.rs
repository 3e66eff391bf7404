// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bubblescan answer-sheet reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Label used for a question the student left blank.
pub const UNANSWERED_LABEL: &str = "-";

/// A single question's recognised answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Answer {
    /// Option index in `[0, options_per_question)`. 0 = A, 1 = B, ...
    Answered(usize),
    /// No option was dark enough to count as a mark.
    Unanswered,
}

impl Answer {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    /// Option index, if the question was answered.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Answered(index) => Some(*index),
            Self::Unanswered => None,
        }
    }

    /// Letter label for display: `A`, `B`, `C`, ... or `-` when unanswered.
    ///
    /// Indices past `Z` render as `#27`, `#28`, ... (1-based).
    pub fn label(&self) -> String {
        match self {
            Self::Answered(index) if *index < 26 => {
                char::from(b'A' + *index as u8).to_string()
            }
            Self::Answered(index) => format!("#{}", index + 1),
            Self::Unanswered => UNANSWERED_LABEL.to_string(),
        }
    }

    /// Parse a single-letter label (case-insensitive). `-`, `_` and `.` mean
    /// unanswered.
    pub fn from_label(label: char) -> Result<Self> {
        match label {
            '-' | '_' | '.' => Ok(Self::Unanswered),
            c if c.is_ascii_alphabetic() => {
                Ok(Self::Answered((c.to_ascii_uppercase() as u8 - b'A') as usize))
            }
            other => Err(ScanError::InvalidAnswerLabel(other.to_string())),
        }
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Ordered answers, one per question. Never reordered after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerVector(Vec<Answer>);

impl AnswerVector {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self(answers)
    }

    /// Build a vector from a label string such as `"ABCD-"`. Whitespace is
    /// ignored.
    pub fn from_labels(labels: &str) -> Result<Self> {
        labels
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(Answer::from_label)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Render as a compact label string, e.g. `"ABCD-"`.
    pub fn to_labels(&self) -> String {
        self.0.iter().map(Answer::label).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Answer> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Answer> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Answer] {
        &self.0
    }

    /// Number of questions carrying a mark.
    pub fn answered_count(&self) -> usize {
        self.0.iter().filter(|a| a.is_answered()).count()
    }
}

impl From<Vec<Answer>> for AnswerVector {
    fn from(answers: Vec<Answer>) -> Self {
        Self(answers)
    }
}

impl FromIterator<Answer> for AnswerVector {
    fn from_iter<I: IntoIterator<Item = Answer>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AnswerVector {
    type Item = &'a Answer;
    type IntoIter = std::slice::Iter<'a, Answer>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Physical arrangement of questions on the sheet. Supplied by the caller,
/// never inferred from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Vertical answer columns on the sheet.
    pub num_blocks: usize,
    /// Questions per block.
    pub rows_per_block: usize,
    /// Choices per question.
    pub options_per_question: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            num_blocks: 2,
            rows_per_block: 20,
            options_per_question: 4,
        }
    }
}

impl Layout {
    pub fn new(num_blocks: usize, rows_per_block: usize, options_per_question: usize) -> Self {
        Self {
            num_blocks,
            rows_per_block,
            options_per_question,
        }
    }

    pub fn total_questions(&self) -> usize {
        self.num_blocks * self.rows_per_block
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 {
            return Err(ScanError::InvalidLayout("num_blocks must be at least 1".into()));
        }
        if self.rows_per_block == 0 {
            return Err(ScanError::InvalidLayout(
                "rows_per_block must be at least 1".into(),
            ));
        }
        if self.options_per_question < 2 {
            return Err(ScanError::InvalidLayout(
                "options_per_question must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Check that a key fits this layout: one answer per question, and every
    /// marked option is one the sheet actually prints.
    pub fn validate_answers(&self, answers: &AnswerVector) -> Result<()> {
        self.validate_question_count(answers.len())?;
        let out_of_range = answers
            .iter()
            .enumerate()
            .find(|(_, answer)| answer.index().is_some_and(|o| o >= self.options_per_question));
        if let Some((index, answer)) = out_of_range {
            return Err(ScanError::InvalidAnswerLabel(format!(
                "{} at question {}; the sheet has {} choices",
                answer.label(),
                index + 1,
                self.options_per_question
            )));
        }
        Ok(())
    }

    /// Check that a key or answer vector fits this layout.
    pub fn validate_question_count(&self, total_questions: usize) -> Result<()> {
        if self.total_questions() != total_questions {
            return Err(ScanError::InvalidLayout(format!(
                "{} blocks x {} rows = {} questions, expected {}",
                self.num_blocks,
                self.rows_per_block,
                self.total_questions(),
                total_questions
            )));
        }
        Ok(())
    }
}

/// A point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// The four sheet corners in canonical order:
/// `[top_left, top_right, bottom_right, bottom_left]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners(pub [Point; 4]);

impl Corners {
    pub fn top_left(&self) -> Point {
        self.0[0]
    }

    pub fn top_right(&self) -> Point {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.0[3]
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn as_tuples(&self) -> [(f32, f32); 4] {
        self.0.map(|p| (p.x, p.y))
    }

    /// Largest distance any corner moved between `self` and `other`.
    pub fn max_displacement(&self, other: &Corners) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.distance(b))
            .fold(0.0, f32::max)
    }
}

/// The reference answers an exam is graded against.
///
/// Immutable once built; replacing the key in the engine never touches
/// results that were already produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterKey {
    pub answers: AnswerVector,
    pub points_per_question: u32,
    pub created_at: DateTime<Utc>,
}

impl MasterKey {
    /// Key worth one point per question.
    pub fn new(answers: AnswerVector) -> Result<Self> {
        Self::with_points(answers, 1)
    }

    /// Fails with [`ScanError::ScoreOverflow`] when the maximum score would
    /// not fit in a `u32`.
    pub fn with_points(answers: AnswerVector, points_per_question: u32) -> Result<Self> {
        checked_max_score(answers.len(), points_per_question)?;
        Ok(Self {
            answers,
            points_per_question,
            created_at: Utc::now(),
        })
    }

    pub fn total_questions(&self) -> usize {
        self.answers.len()
    }

    /// Saturates for a key that was deserialized with out-of-range points.
    pub fn max_score(&self) -> u32 {
        checked_max_score(self.total_questions(), self.points_per_question).unwrap_or(u32::MAX)
    }
}

/// `questions * points_per_question` as a score, or
/// [`ScanError::ScoreOverflow`] when it does not fit.
pub fn checked_max_score(questions: usize, points_per_question: u32) -> Result<u32> {
    u32::try_from(questions)
        .ok()
        .and_then(|q| q.checked_mul(points_per_question))
        .ok_or(ScanError::ScoreOverflow {
            questions,
            points_per_question,
        })
}

/// A question the student got wrong (or left blank against a keyed answer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrongAnswer {
    /// 1-based question number.
    pub question_number: usize,
    pub student_label: String,
    pub master_label: String,
}

impl WrongAnswer {
    pub fn display_text(&self) -> String {
        format!(
            "Q{} (student: {}, key: {})",
            self.question_number, self.student_label, self.master_label
        )
    }
}

/// Snapshot of one graded sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    /// Points earned from matched, non-blank answers.
    pub score: u32,
    pub total_questions: usize,
    pub points_per_question: u32,
    /// Questions the student marked at all.
    pub valid_answer_count: usize,
    pub wrong_answers: Vec<WrongAnswer>,
    pub graded_at: DateTime<Utc>,
}

impl GradingResult {
    pub fn max_score(&self) -> u32 {
        checked_max_score(self.total_questions, self.points_per_question).unwrap_or(u32::MAX)
    }

    /// `"score / max"`, e.g. `"3 / 5"`.
    pub fn score_display(&self) -> String {
        format!("{} / {}", self.score, self.max_score())
    }

    /// Score as a percentage of the maximum. Zero for an empty key.
    pub fn accuracy(&self) -> f32 {
        let max = self.max_score();
        if max == 0 {
            0.0
        } else {
            self.score as f32 / max as f32 * 100.0
        }
    }

    /// 1-based numbers of the questions in `wrong_answers`.
    pub fn wrong_question_numbers(&self) -> Vec<usize> {
        self.wrong_answers.iter().map(|w| w.question_number).collect()
    }
}
