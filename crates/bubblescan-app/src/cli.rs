// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line interface.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bubblescan")]
#[command(about = "Read photographed bubble sheets and grade them against an answer key")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read the answer key from a photographed key sheet.
    Key(KeyArgs),

    /// Grade student sheets against an answer key.
    Grade(GradeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct KeyArgs {
    /// Key sheet photo. With --live, the camera frames in capture order.
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
pub struct GradeArgs {
    /// Answer key: labels such as ABCD- (dash for blank), or a key sheet photo.
    #[arg(long, value_parser = parse_key_source)]
    pub key: KeySource,

    /// Points per question.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub points: u32,

    /// Student sheet photos. With --live, the camera frames in capture order.
    #[arg(required = true)]
    pub sheets: Vec<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Scan configuration file (JSON): layout, thresholds.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the row-marker overlay of the first sheet to this image file.
    #[arg(long)]
    pub overlay: Option<PathBuf>,

    /// Treat the images as consecutive camera frames.
    #[arg(long)]
    pub live: bool,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Where the answer key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Typed on the command line, e.g. `ABCD-`.
    Labels(String),
    /// Read from a photographed key sheet.
    Image(PathBuf),
}

impl KeySource {
    /// A path that exists on disk is an image; anything else is labels.
    pub fn from_arg(arg: &str) -> Self {
        let path = PathBuf::from(arg);
        if path.exists() {
            Self::Image(path)
        } else {
            Self::Labels(arg.to_string())
        }
    }
}

fn parse_key_source(arg: &str) -> Result<KeySource, String> {
    if arg.is_empty() {
        return Err("the key can't be empty".into());
    }
    Ok(KeySource::from_arg(arg))
}

impl Cli {
    /// Parse `args` (program name first), then apply the checks that depend
    /// on more than one argument.
    pub fn try_parse_checked<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Self::try_parse_from(args)?;
        if let Commands::Key(key) = &cli.command {
            if !key.common.live && key.images.len() > 1 {
                return Err(Self::command().error(
                    ErrorKind::TooManyValues,
                    "`key` reads a single photo; pass --live to feed a frame sequence",
                ));
            }
        }
        Ok(cli)
    }
}
