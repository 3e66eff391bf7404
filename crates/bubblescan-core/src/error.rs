// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bubblescan.
//
// Detection shortfalls (too few row peaks, no paper corners) are not errors:
// the pipeline substitutes a uniform grid or reports "no detection" instead.

use thiserror::Error;

/// Top-level error type for all Bubblescan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Grading preconditions --
    #[error("no master key has been set")]
    MasterKeyNotSet,

    #[error("student answer count ({student}) doesn't match master key count ({master})")]
    AnswerCountMismatch { student: usize, master: usize },

    // -- Input validation --
    #[error("invalid sheet layout: {0}")]
    InvalidLayout(String),

    #[error("invalid raster: {0}")]
    InvalidImage(String),

    #[error("image decoding failed: {0}")]
    ImageDecode(String),

    #[error("found {found} row centers, need at least {expected}")]
    InsufficientRows { found: usize, expected: usize },

    #[error("invalid answer label: {0:?}")]
    InvalidAnswerLabel(String),

    #[error("{questions} questions at {points_per_question} points each exceeds the score range")]
    ScoreOverflow {
        questions: usize,
        points_per_question: u32,
    },

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Live mode --
    #[error("live scanner channel closed: {0}")]
    Channel(String),
}

impl ScanError {
    /// Whether this error is a grading precondition failure. These are
    /// surfaced to the caller immediately and never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MasterKeyNotSet | Self::AnswerCountMismatch { .. }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
