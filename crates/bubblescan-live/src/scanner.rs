// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Live scanning task.
//
// The camera side calls `submit` for every frame. Frames land in a
// `tokio::sync::watch` slot that holds only the newest one, so frames arriving
// while a frame is being analyzed overwrite each other instead of queueing.
// A single task owns the detector, the stability gate and the reader; it runs
// each analysis on the blocking pool and reports progress over an mpsc
// channel.

use std::sync::{Arc, RwLock};

use bubblescan_core::config::ScanConfig;
use bubblescan_core::error::{Result, ScanError};
use bubblescan_core::types::{AnswerVector, Corners, GradingResult};
use bubblescan_grading::GradingEngine;
use bubblescan_vision::{PaperCornerDetector, RawImage, SheetReader, SheetReading};
use image::DynamicImage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::stability::StabilityGate;

/// Capacity of the event channel.
const EVENT_BUFFER: usize = 32;

/// Progress of the live scan, one per analyzed frame.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// No sheet outline in the frame.
    Searching,
    /// Outline found but not yet still for long enough.
    Tracking { corners: Corners, stable_frames: u32 },
    /// Outline held still; the sheet was rectified and read. `grade` is
    /// present when the session has a key that fits the reading.
    Captured {
        corners: Corners,
        reading: SheetReading,
        grade: Option<GradingResult>,
    },
}

/// Handle to a running live scan.
///
/// Dropping the handle closes the frame slot and the task ends after the
/// frame it is working on. [`LiveScanner::shutdown`] does the same and waits.
pub struct LiveScanner {
    frames: watch::Sender<Option<Arc<DynamicImage>>>,
    task: Option<JoinHandle<()>>,
}

impl LiveScanner {
    /// Start the analysis task. Must be called inside a Tokio runtime.
    ///
    /// `engine` is read (never written) when a sheet is captured.
    pub fn spawn(
        config: ScanConfig,
        engine: Option<Arc<RwLock<GradingEngine>>>,
    ) -> Result<(Self, mpsc::Receiver<LiveEvent>)> {
        let analyzer = FrameAnalyzer::new(config, engine)?;
        let (frame_tx, frame_rx) = watch::channel(None);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(async move {
            analysis_loop(analyzer, frame_rx, event_tx).await;
        });

        info!("Live scanner started");
        Ok((
            Self {
                frames: frame_tx,
                task: Some(task),
            },
            event_rx,
        ))
    }

    /// Offer a frame. Never blocks; replaces any frame still waiting.
    pub fn submit(&self, frame: DynamicImage) -> Result<()> {
        if self.frames.is_closed() {
            return Err(ScanError::Channel("analysis task has stopped".into()));
        }
        self.frames.send_replace(Some(Arc::new(frame)));
        Ok(())
    }

    /// Offer a raw camera buffer.
    pub fn submit_raw(&self, raw: RawImage) -> Result<()> {
        self.submit(raw.into_dynamic()?)
    }

    /// Stop accepting frames and wait for the task to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        let task = self.task.take();
        // Closing the slot is what ends the loop.
        drop(self);
        if let Some(task) = task {
            task.await
                .map_err(|e| ScanError::Channel(format!("task join: {e}")))?;
        }
        info!("Live scanner stopped");
        Ok(())
    }
}

async fn analysis_loop(
    mut analyzer: FrameAnalyzer,
    mut frames: watch::Receiver<Option<Arc<DynamicImage>>>,
    events: mpsc::Sender<LiveEvent>,
) {
    while frames.changed().await.is_ok() {
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };

        let joined = tokio::task::spawn_blocking(move || {
            let event = analyzer.analyze(&frame);
            (analyzer, event)
        })
        .await;

        let (returned, event) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Frame analysis panicked; live scanner stopping");
                return;
            }
        };
        analyzer = returned;

        if events.send(event).await.is_err() {
            debug!("Event receiver dropped; live scanner stopping");
            return;
        }
    }
    debug!("Frame slot closed");
}

/// Per-session detection state. Owned by exactly one task at a time.
struct FrameAnalyzer {
    detector: PaperCornerDetector,
    gate: StabilityGate,
    reader: SheetReader,
    engine: Option<Arc<RwLock<GradingEngine>>>,
}

impl FrameAnalyzer {
    fn new(config: ScanConfig, engine: Option<Arc<RwLock<GradingEngine>>>) -> Result<Self> {
        Ok(Self {
            detector: PaperCornerDetector::new(config.detect.clone()),
            gate: StabilityGate::new(config.stability.clone()),
            reader: SheetReader::new(config)?,
            engine,
        })
    }

    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    fn analyze(&mut self, frame: &DynamicImage) -> LiveEvent {
        let detection = self.detector.detect(frame);
        let stable = self.gate.update(detection);

        let Some(corners) = detection else {
            return LiveEvent::Searching;
        };
        let tracking = LiveEvent::Tracking {
            corners,
            stable_frames: self.gate.stable_frames(),
        };
        if !stable {
            return tracking;
        }

        let Some(reading) = self.reader.read_frame(frame, &corners) else {
            return tracking;
        };
        // One capture per sheet: the outline has to settle again.
        self.gate.reset();
        let grade = self.grade(&reading.answers);
        info!(
            answered = reading.answers.answered_count(),
            graded = grade.is_some(),
            "Sheet captured"
        );
        LiveEvent::Captured {
            corners,
            reading,
            grade,
        }
    }

    /// Grade against the session key. Failures only cost the grade; live
    /// mode keeps scanning.
    fn grade(&self, answers: &AnswerVector) -> Option<GradingResult> {
        let engine = self.engine.as_ref()?;
        let engine = match engine.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match engine.grade(answers) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(error = %err, "Captured sheet not graded");
                None
            }
        }
    }
}
