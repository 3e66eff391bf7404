// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bubblescan-live: continuous camera capture. Frames flow through a single
// latest-value slot into one analysis task, which detects the sheet, waits
// for the outline to hold still, and then reads (and optionally grades) it.

pub mod scanner;
pub mod stability;

pub use scanner::{LiveEvent, LiveScanner};
pub use stability::StabilityGate;
