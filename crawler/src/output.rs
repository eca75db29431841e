//! Writing crawl results.

use crate::aggregator::CrawlResult;
use crate::error::OutputError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where a result is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File(PathBuf),
}

impl Output {
    /// `-` means stdout, anything else is a file path.
    pub fn parse(arg: &str) -> Output {
        if arg == "-" {
            Output::Stdout
        } else {
            Output::File(PathBuf::from(arg))
        }
    }

    /// Write `result` as pretty JSON.
    ///
    /// The result is serialized completely before anything is written. A file
    /// is written next to its destination and renamed into place, so it
    /// either holds the whole result or is left untouched.
    pub fn write(&self, result: &CrawlResult) -> Result<(), OutputError> {
        let mut json = serde_json::to_string_pretty(result)?;
        json.push('\n');
        match self {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(json.as_bytes())?;
                stdout.flush()?;
                Ok(())
            }
            Output::File(path) => write_atomic(path, json.as_bytes()),
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crawl".to_string());
    let temp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));

    let written = fs::File::create(&temp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    match written.and_then(|()| fs::rename(&temp, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e.into())
        }
    }
}
