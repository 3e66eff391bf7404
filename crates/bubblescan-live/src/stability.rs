// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Temporal gate over per-frame corner detections.

use bubblescan_core::config::StabilityConfig;
use bubblescan_core::types::Corners;
use tracing::{debug, trace};

/// Signals "ready to capture" once the sheet outline has held still for
/// `frame_count` consecutive frames.
///
/// The first detection counts as frame one. A frame whose corners moved by
/// `threshold_px` or more restarts the count at zero; a frame with no
/// detection forgets the outline entirely. The stored outline is always the
/// latest one seen.
#[derive(Debug, Clone, Default)]
pub struct StabilityGate {
    config: StabilityConfig,
    previous: Option<Corners>,
    stable_frames: u32,
}

impl StabilityGate {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            previous: None,
            stable_frames: 0,
        }
    }

    /// Feed one frame's detection; returns whether the outline is stable.
    pub fn update(&mut self, detection: Option<Corners>) -> bool {
        let Some(current) = detection else {
            if self.previous.is_some() {
                debug!(stable_frames = self.stable_frames, "Outline lost; gate reset");
            }
            self.reset();
            return false;
        };

        match self.previous.replace(current) {
            None => {
                self.stable_frames = 1;
                false
            }
            Some(previous) => {
                let moved = previous.max_displacement(&current);
                if moved < self.config.threshold_px {
                    self.stable_frames = self.stable_frames.saturating_add(1);
                } else {
                    trace!(moved, "Outline jumped");
                    self.stable_frames = 0;
                }
                self.stable_frames >= self.config.frame_count
            }
        }
    }

    /// Consecutive stable frames so far.
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }

    pub fn is_tracking(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.stable_frames = 0;
    }
}
