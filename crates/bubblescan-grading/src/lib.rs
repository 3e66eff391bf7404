// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bubblescan-grading: master-key management and answer comparison.

pub mod engine;

pub use engine::{GradingEngine, compare};
