// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command execution: file decoding, config loading and the session wiring
// between the reader, the grading engine and the live scanner.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bubblescan_core::error::{Result, ScanError};
use bubblescan_core::types::{AnswerVector, GradingResult};
use bubblescan_core::ScanConfig;
use bubblescan_grading::GradingEngine;
use bubblescan_live::{LiveEvent, LiveScanner};
use bubblescan_vision::overlay::draw_row_markers;
use bubblescan_vision::{SheetReader, SheetReading};
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cli::{Commands, CommonArgs, GradeArgs, KeyArgs, KeySource};

/// Load and validate a JSON config, or the defaults when no path is given.
#[instrument]
pub fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    let Some(path) = path else {
        return Ok(ScanConfig::default());
    };
    let json = std::fs::read_to_string(path)?;
    let config = ScanConfig::from_json(&json)?;
    info!(path = %path.display(), "Scan config loaded");
    Ok(config)
}

/// Decode an image file. Unreadable files are the caller's problem, so the
/// failure is reported rather than passed into the pipeline.
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path).map_err(|e| {
        ScanError::ImageDecode(format!("{}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), width = image.width(), height = image.height(), "Image decoded");
    Ok(image)
}

/// One session: configuration, reader and grading engine.
pub struct Session {
    config: ScanConfig,
    reader: SheetReader,
    engine: Arc<RwLock<GradingEngine>>,
}

impl Session {
    pub fn new(config: ScanConfig) -> Result<Self> {
        Ok(Self {
            reader: SheetReader::new(config.clone())?,
            config,
            engine: Arc::new(RwLock::new(GradingEngine::new())),
        })
    }

    /// Read one sheet photo, writing the row overlay if asked.
    #[instrument(skip(self))]
    pub fn read_sheet(&self, path: &Path, overlay: Option<&Path>) -> Result<SheetReading> {
        let image = decode_image(path)?;
        let reading = self.reader.read_dynamic(&image);
        if let Some(out) = overlay {
            write_overlay(&image, &reading, self.config.enhance.upscale_factor, out)?;
        }
        Ok(reading)
    }

    /// Install a key typed as labels. It must have one answer per question,
    /// and only choices the sheet prints.
    pub fn set_key_labels(&self, labels: &str, points: u32) -> Result<AnswerVector> {
        let answers = AnswerVector::from_labels(labels)?;
        self.config.layout.validate_answers(&answers)?;
        self.install_key(answers.clone(), points)?;
        Ok(answers)
    }

    pub fn install_key(&self, answers: AnswerVector, points: u32) -> Result<()> {
        let mut engine = match self.engine.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        engine.set_master_key_with_points(answers, points)?;
        info!(status = %engine.status_text(), "Answer key installed");
        Ok(())
    }

    pub fn grade(&self, answers: &AnswerVector) -> Result<GradingResult> {
        let engine = match self.engine.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        engine.grade(answers)
    }

    /// Push frames through the live scanner one at a time and collect every
    /// capture. Waiting for each event means no frame is dropped.
    pub async fn scan_frames(&self, frames: &[PathBuf], grade: bool) -> Result<Vec<LiveCapture>> {
        let engine = grade.then(|| Arc::clone(&self.engine));
        let (scanner, mut events) = LiveScanner::spawn(self.config.clone(), engine)?;
        let mut captures = Vec::new();

        for path in frames {
            scanner.submit(decode_image(path)?)?;
            let event = events
                .recv()
                .await
                .ok_or_else(|| ScanError::Channel("live scanner stopped early".into()))?;
            match event {
                LiveEvent::Searching => debug!(frame = %path.display(), "No sheet in frame"),
                LiveEvent::Tracking { stable_frames, .. } => {
                    debug!(frame = %path.display(), stable_frames, "Tracking sheet")
                }
                LiveEvent::Captured { reading, grade, .. } => {
                    info!(frame = %path.display(), "Sheet captured");
                    captures.push(LiveCapture {
                        frame: path.clone(),
                        reading,
                        grade,
                    });
                }
            }
        }

        scanner.shutdown().await?;
        Ok(captures)
    }
}

/// A sheet captured from a frame sequence.
#[derive(Debug, Serialize)]
pub struct LiveCapture {
    pub frame: PathBuf,
    pub reading: SheetReading,
    pub grade: Option<GradingResult>,
}

fn write_overlay(image: &DynamicImage, reading: &SheetReading, upscale: f32, out: &Path) -> Result<()> {
    draw_row_markers(image, &reading.row_centers, upscale)
        .save(out)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => ScanError::Io(io),
            other => ScanError::Io(std::io::Error::other(format!(
                "write {}: {other}",
                out.display()
            ))),
        })?;
    info!(path = %out.display(), "Overlay written");
    Ok(())
}

// -- Commands -----------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SheetReport<'a> {
    sheet: &'a Path,
    answers: String,
    used_grid_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    grade: Option<&'a GradingResult>,
}

pub async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Key(args) => run_key(&args).await,
        Commands::Grade(args) => run_grade(&args).await,
    }
}

async fn run_key(args: &KeyArgs) -> Result<()> {
    let options = &args.common;
    let session = Session::new(load_config(options.config.as_deref())?)?;

    let answers = if options.live {
        let captures = session.scan_frames(&args.images, false).await?;
        let Some(first) = captures.into_iter().next() else {
            warn!(frames = args.images.len(), "No stable sheet in the frame sequence");
            println!("No answer key captured; hold the sheet still for longer.");
            return Ok(());
        };
        first.reading.answers
    } else {
        let [image] = args.images.as_slice() else {
            return Err(ScanError::Config(format!(
                "key reads one photo, got {}",
                args.images.len()
            )));
        };
        session.read_sheet(image, options.overlay.as_deref())?.answers
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&answers)?);
    } else {
        println!("{}", answers.to_labels());
    }
    Ok(())
}

async fn run_grade(args: &GradeArgs) -> Result<()> {
    let options: &CommonArgs = &args.common;
    let sheets = &args.sheets;
    let session = Session::new(load_config(options.config.as_deref())?)?;

    match &args.key {
        KeySource::Labels(labels) => {
            session.set_key_labels(labels, args.points)?;
        }
        KeySource::Image(path) => {
            let reading = session.read_sheet(path, None)?;
            session.install_key(reading.answers, args.points)?;
        }
    }

    if options.live {
        for capture in session.scan_frames(sheets, true).await? {
            print_report(
                &SheetReport {
                    sheet: &capture.frame,
                    answers: capture.reading.answers.to_labels(),
                    used_grid_fallback: capture.reading.used_grid_fallback,
                    grade: capture.grade.as_ref(),
                },
                options.json,
            )?;
        }
        return Ok(());
    }

    for (index, sheet) in sheets.iter().enumerate() {
        let overlay = if index == 0 { options.overlay.as_deref() } else { None };
        let reading = session.read_sheet(sheet, overlay)?;
        let grade = session.grade(&reading.answers)?;
        print_report(
            &SheetReport {
                sheet,
                answers: reading.answers.to_labels(),
                used_grid_fallback: reading.used_grid_fallback,
                grade: Some(&grade),
            },
            options.json,
        )?;
    }
    Ok(())
}

fn print_report(report: &SheetReport<'_>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!("{}", report.sheet.display());
    println!("  answers: {}", report.answers);
    if report.used_grid_fallback {
        println!("  (rows not found, read from a uniform grid)");
    }
    if let Some(grade) = report.grade {
        println!("  score:   {} ({:.1}%)", grade.score_display(), grade.accuracy());
        for wrong in &grade.wrong_answers {
            println!("  wrong:   {}", wrong.display_text());
        }
    }
    Ok(())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bubblescan_core::types::Layout;
    use image::{GrayImage, Luma};
    use std::io::Write;

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).expect("defaults"), ScanConfig::default());
    }

    #[test]
    fn config_file_overrides_layout() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "layout": {{ "num_blocks": 1, "rows_per_block": 5, "options_per_question": 5 }} }}"#
        )
        .expect("write");

        let config = load_config(Some(file.path())).expect("valid config");
        assert_eq!(config.layout, Layout::new(1, 5, 5));
        assert_eq!(config.extract, ScanConfig::default().extract);
    }

    #[test]
    fn bad_config_files_are_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope.json");
        assert!(matches!(load_config(Some(&missing)), Err(ScanError::Io(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").expect("write");
        assert!(matches!(load_config(Some(&broken)), Err(ScanError::Serialization(_))));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, r#"{ "layout": { "num_blocks": 0, "rows_per_block": 5, "options_per_question": 4 } }"#).expect("write");
        assert!(matches!(load_config(Some(&invalid)), Err(ScanError::InvalidLayout(_))));
    }

    #[test]
    fn undecodable_file_is_an_image_decode_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sheet.png");
        std::fs::write(&path, b"definitely not a png").expect("write");
        assert!(matches!(decode_image(&path), Err(ScanError::ImageDecode(_))));
    }

    #[test]
    fn typed_key_must_fit_the_layout() {
        let session = Session::new(ScanConfig::with_layout(Layout::new(1, 4, 4))).expect("session");
        assert!(matches!(session.set_key_labels("ABC", 1), Err(ScanError::InvalidLayout(_))));
        assert!(matches!(
            session.set_key_labels("ABCZ", 1),
            Err(ScanError::InvalidAnswerLabel(_))
        ));
        assert!(matches!(
            session.set_key_labels("ABCE", 1),
            Err(ScanError::InvalidAnswerLabel(_))
        ));
        assert!(matches!(
            session.set_key_labels("ABCD", 3_000_000_000),
            Err(ScanError::ScoreOverflow { .. })
        ));
        session.set_key_labels("ABCD", 1).expect("fits");

        let result = session
            .grade(&AnswerVector::from_labels("ABCA").expect("labels"))
            .expect("graded");
        assert_eq!(result.score, 3);
    }

    #[test]
    fn sheet_photo_is_read_and_overlay_written() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sheet = dir.path().join("sheet.png");
        GrayImage::from_pixel(200, 300, Luma([240]))
            .save(&sheet)
            .expect("save sheet");
        let overlay = dir.path().join("overlay.png");

        let session = Session::new(ScanConfig::default()).expect("session");
        let reading = session.read_sheet(&sheet, Some(&overlay)).expect("read");

        assert_eq!(reading.answers.len(), 40);
        let written = image::open(&overlay).expect("overlay decodes");
        assert_eq!((written.width(), written.height()), (200, 300));
    }

    #[test]
    fn unwritable_overlay_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sheet = dir.path().join("sheet.png");
        GrayImage::from_pixel(200, 300, Luma([240]))
            .save(&sheet)
            .expect("save sheet");
        let overlay = dir.path().join("missing").join("overlay.png");

        let session = Session::new(ScanConfig::default()).expect("session");
        let err = session.read_sheet(&sheet, Some(&overlay)).unwrap_err();
        assert!(matches!(err, ScanError::Io(_)), "got {err:?}");
    }

    #[test]
    fn key_source_prefers_existing_files() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let arg = file.path().to_string_lossy().to_string();
        assert_eq!(KeySource::from_arg(&arg), KeySource::Image(file.path().to_path_buf()));
        assert_eq!(KeySource::from_arg("ABCD"), KeySource::Labels("ABCD".into()));
    }

    #[tokio::test]
    async fn live_frames_without_a_sheet_capture_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let frame = dir.path().join("frame.png");
        GrayImage::from_pixel(160, 120, Luma([80]))
            .save(&frame)
            .expect("save frame");

        let session = Session::new(ScanConfig::default()).expect("session");
        let captures = session
            .scan_frames(&[frame.clone(), frame], false)
            .await
            .expect("scan");
        assert!(captures.is_empty());
    }
}
