use std::io::Read;
use std::time::Duration;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use crate::input::InputReader;
use command::Cli;

pub mod command;
pub mod info;
pub mod report;
pub mod streams;

/// `--strict` turns every malformed or truncated structure into an error.
pub(crate) fn fail_level(cli: &Cli) -> Level {
    if cli.strict { Level::Warn } else { Level::Error }
}

pub(crate) fn spinner(multi: Option<&MultiProgress>, name: &str) -> Result<Option<ProgressBar>> {
    let Some(multi) = multi else {
        return Ok(None);
    };

    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg} {bytes}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Reading {name}..."));

    Ok(Some(pb))
}

/// Counts bytes into the spinner while the parser reads.
pub(crate) fn tracked(input: InputReader, pb: Option<&ProgressBar>) -> Box<dyn Read> {
    match pb {
        Some(pb) => Box::new(pb.wrap_read(input)),
        None => Box::new(input),
    }
}

/// Prints an aligned `label value` row.
pub(crate) fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<26}{value}");
}
