// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for whoever is running a scanning session.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how the surrounding UI presents it.

use crate::error::ScanError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Try again (rescan, reopen the camera).
    Transient,
    /// The user must do something first (capture a key, fix the layout).
    ActionRequired,
    /// Retrying the same input will not help.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether rescanning may succeed without other changes.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanError` into something the person scanning can act on.
pub fn humanize_error(err: &ScanError) -> HumanError {
    match err {
        ScanError::MasterKeyNotSet => HumanError {
            message: "No answer key yet.".into(),
            suggestion: "Scan the answer key sheet first, then scan student sheets.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::AnswerCountMismatch { student, master } => HumanError {
            message: "This sheet doesn't match the answer key.".into(),
            suggestion: format!(
                "The sheet has {student} questions but the key has {master}. Check the exam layout settings, or rescan the key."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::InvalidLayout(detail) => HumanError {
            message: "The exam layout settings aren't valid.".into(),
            suggestion: format!("Check the number of columns, questions and choices. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::InvalidImage(_) | ScanError::ImageDecode(_) => HumanError {
            message: "The photo couldn't be read.".into(),
            suggestion: "Take the photo again, or save it as a JPEG or PNG first.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::InsufficientRows { .. } => HumanError {
            message: "Not all answer rows could be found on this sheet.".into(),
            suggestion: "Hold the camera straight above the sheet with the whole page in view, then scan again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::InvalidAnswerLabel(label) => HumanError {
            message: "The answer key contains an unknown choice.".into(),
            suggestion: format!("Use letters A, B, C, ... and '-' for blank. (Found: {label})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::ScoreOverflow { .. } => HumanError {
            message: "The points per question are too high for this exam.".into(),
            suggestion: "Choose a smaller number of points per question.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Config(detail) => HumanError {
            message: "A scanner setting is out of range.".into(),
            suggestion: format!("Reset the scanner settings to their defaults. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => HumanError {
            message: "The file couldn't be found.".into(),
            suggestion: "It may have been moved or deleted. Try choosing the file again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Io(_) => HumanError {
            message: "There was a problem reading or writing a file.".into(),
            suggestion: "Try again. If this keeps happening, your device's storage may be full.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::Serialization(_) => HumanError {
            message: "The settings file couldn't be understood.".into(),
            suggestion: "Check the file is valid JSON, or remove it to use the defaults.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Channel(_) => HumanError {
            message: "The live camera scanner stopped.".into(),
            suggestion: "Close the camera view and open it again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_action_required() {
        let human = humanize_error(&ScanError::MasterKeyNotSet);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn mismatch_mentions_both_counts() {
        let human = humanize_error(&ScanError::AnswerCountMismatch {
            student: 38,
            master: 40,
        });
        assert!(human.suggestion.contains("38"));
        assert!(human.suggestion.contains("40"));
    }

    #[test]
    fn unreadable_photo_is_transient() {
        let human = humanize_error(&ScanError::ImageDecode("bad header".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = ScanError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }
}
